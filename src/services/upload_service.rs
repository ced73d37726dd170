//! Upload ingestion.
//!
//! An upload is staged to a scratch file (hashing as it goes), pushed to the
//! store under its effective name, and then has its thumbnail generated
//! from the same scratch file.

use crate::services::{
    media,
    object_store::{ByteStream, ObjectStore},
    storage_service::StorageError,
    thumbnail_service::{PrimeOutcome, ThumbnailResolver},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{io, path::PathBuf, sync::Arc};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file in upload")]
    MissingFile,
    #[error("cannot derive an object name from the upload")]
    InvalidName,
    #[error("reading upload body failed: {0}")]
    Body(String),
    #[error("upload too large: {0}")]
    TooLarge(String),
    #[error("staging upload failed: {0}")]
    Scratch(#[from] io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An upload sitting in a scratch file, removed on drop.
pub struct StagedUpload {
    file: NamedTempFile,
    pub size: u64,
    /// Hex MD5 of the staged bytes. Logged only.
    pub digest: String,
}

#[derive(Debug)]
pub struct UploadReport {
    pub size: u64,
    pub thumbnail: PrimeOutcome,
}

/// `folder/custom_name`, falling back to the client filename. Blank inputs
/// count as absent.
pub fn object_name(
    folder: Option<&str>,
    custom_name: Option<&str>,
    filename: Option<&str>,
) -> Result<String, UploadError> {
    fn non_blank(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    let file = non_blank(custom_name)
        .or_else(|| non_blank(filename))
        .ok_or(UploadError::InvalidName)?;

    let name = media::join_object_path(non_blank(folder).into_iter().chain([file]));
    if name.is_empty() || name.split('/').any(|segment| segment == "..") {
        return Err(UploadError::InvalidName);
    }
    Ok(name)
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    thumbnails: ThumbnailResolver,
    scratch_dir: Option<PathBuf>,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        thumbnails: ThumbnailResolver,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            thumbnails,
            scratch_dir,
        }
    }

    /// Drain `body` into a scratch file, computing size and MD5.
    pub async fn stage<S, E>(&self, body: S) -> Result<StagedUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<UploadError>,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-");
        let scratch = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let mut file = tokio::fs::File::from_std(scratch.reopen()?);

        let mut size = 0u64;
        let mut digest = Context::new();
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::into)?;
            size += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(StagedUpload {
            file: scratch,
            size,
            digest: format!("{:x}", digest.compute()),
        })
    }

    /// Store the staged bytes under `name`, then prime its thumbnail.
    ///
    /// Only the primary write can fail the upload.
    #[tracing::instrument(skip(self, staged), fields(size_bytes = staged.size))]
    pub async fn commit(
        &self,
        name: &str,
        staged: StagedUpload,
    ) -> Result<UploadReport, UploadError> {
        info!(digest = %staged.digest, "upload staged");

        let reader = tokio::fs::File::from_std(staged.file.reopen()?);
        let body: ByteStream = Box::pin(ReaderStream::new(reader));
        let object = self
            .store
            .put(name, Some(media::detect_content_type(name)), body)
            .await?;
        info!(content_type = ?object.content_type, etag = ?object.etag, "object stored");

        let thumbnail = self.thumbnails.prime(name, staged.file.path()).await;
        match &thumbnail {
            PrimeOutcome::Stored { key } => info!(key = %key, "thumbnail primed"),
            PrimeOutcome::Skipped { reason } => info!("thumbnail not primed: {}", reason),
            PrimeOutcome::Failed(err) => warn!("thumbnail priming failed: {}", err),
        }

        Ok(UploadReport {
            size: staged.size,
            thumbnail,
        })
    }
}
