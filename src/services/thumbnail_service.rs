//! Thumbnail cache resolver.
//!
//! A thumbnail for object `X` lives in the same bucket at
//! `thumb/<X without extension>.jpg`. The stored object is the cache: if it
//! exists it is served as-is, forever; if not, it is generated from the
//! original on the request path and written back best-effort.
//!
//! Generation pulls the original into a scoped temporary file, then either
//! decodes it directly (images) or has the transcoder pull a still frame at
//! one second (videos), resizes to a fixed width and encodes JPEG.

use crate::services::{
    image_codec::{ImageCodec, ImageCodecError},
    media::{self, MediaKind},
    object_store::ObjectStore,
    storage_service::StorageError,
    transcoder::{FRAME_OFFSET, FrameExtractor, TranscodeError},
};
use bytes::Bytes;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, task::JoinError};
use tracing::{debug, info, warn};

pub const THUMBNAIL_WIDTH: u32 = 300;
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";
/// One week; thumbnails never change once named.
pub const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=604800";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("`{0}` has no thumbnail mapping")]
    Unmappable(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("scratch file error: {0}")]
    Scratch(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] ImageCodecError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("image worker failed: {0}")]
    Worker(#[from] JoinError),
}

impl ThumbnailError {
    fn from_storage(name: &str, err: StorageError) -> Self {
        if err.is_not_found() {
            ThumbnailError::NotFound(name.to_string())
        } else {
            ThumbnailError::Storage(err)
        }
    }
}

/// Result of the best-effort write-back of a generated thumbnail.
#[derive(Debug)]
pub enum CacheWrite {
    /// Served from cache, or nothing worth caching.
    NotAttempted,
    Stored,
    /// The bytes are still served; the caller decides whether to log.
    Failed(StorageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbnailOrigin {
    Cached,
    Generated,
    /// Image could not be decoded; these are the original bytes.
    Original,
}

#[derive(Debug)]
pub struct ThumbnailBody {
    pub bytes: Bytes,
    pub origin: ThumbnailOrigin,
    pub cache: CacheWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// Neither image nor video.
    NotMedia,
    /// The transcoder could not produce a frame.
    FrameExtractionFailed,
    /// The image is too narrow for its height to thumbnail safely.
    UnsupportedDimensions,
}

#[derive(Debug)]
pub enum Resolution {
    Thumbnail(ThumbnailBody),
    Placeholder(PlaceholderReason),
}

/// What eager generation after an upload did.
#[derive(Debug)]
pub enum PrimeOutcome {
    Stored { key: String },
    Skipped { reason: &'static str },
    Failed(ThumbnailError),
}

/// Output of a single generation attempt.
enum Generated {
    /// Fresh JPEG, fit for the cache.
    Jpeg(Bytes),
    /// Original image bytes that would not decode. Served, never cached.
    Undecodable(Bytes),
}

#[derive(Clone, Debug)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub frame_offset: Duration,
    /// Directory for scratch files; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            width: THUMBNAIL_WIDTH,
            frame_offset: FRAME_OFFSET,
            scratch_dir: None,
        }
    }
}

#[derive(Clone)]
pub struct ThumbnailResolver {
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn ImageCodec>,
    transcoder: Arc<dyn FrameExtractor>,
    settings: ThumbnailSettings,
}

impl ThumbnailResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn ImageCodec>,
        transcoder: Arc<dyn FrameExtractor>,
        settings: ThumbnailSettings,
    ) -> Self {
        Self {
            store,
            codec,
            transcoder,
            settings,
        }
    }

    /// Serve the cached thumbnail for `name`, generating and caching it on a
    /// miss.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<Resolution, ThumbnailError> {
        let key = media::thumbnail_key(name)
            .ok_or_else(|| ThumbnailError::Unmappable(name.to_string()))?;

        match self.store.attrs(&key).await {
            Ok(_) => {
                let bytes = self
                    .store
                    .get_bytes(&key)
                    .await
                    .map_err(|err| ThumbnailError::from_storage(&key, err))?;
                return Ok(Resolution::Thumbnail(ThumbnailBody {
                    bytes,
                    origin: ThumbnailOrigin::Cached,
                    cache: CacheWrite::NotAttempted,
                }));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(key = %key, "thumbnail lookup failed, regenerating: {}", err),
        }

        let kind = MediaKind::classify(name);
        if !kind.has_thumbnail() {
            return Ok(Resolution::Placeholder(PlaceholderReason::NotMedia));
        }

        info!(name, key = %key, "generating missing thumbnail");
        let original = self.download_to_scratch(name).await?;

        match self.generate(kind, original.path()).await {
            Ok(Generated::Jpeg(bytes)) => {
                let cache = self.store_thumbnail(&key, bytes.clone()).await;
                Ok(Resolution::Thumbnail(ThumbnailBody {
                    bytes,
                    origin: ThumbnailOrigin::Generated,
                    cache,
                }))
            }
            Ok(Generated::Undecodable(bytes)) => Ok(Resolution::Thumbnail(ThumbnailBody {
                bytes,
                origin: ThumbnailOrigin::Original,
                cache: CacheWrite::NotAttempted,
            })),
            Err(ThumbnailError::Transcode(err)) => {
                warn!(name, "video thumbnail failed: {}", err);
                Ok(Resolution::Placeholder(PlaceholderReason::FrameExtractionFailed))
            }
            Err(ThumbnailError::Codec(err @ ImageCodecError::TooTall { .. })) => {
                warn!(name, "not thumbnailing: {}", err);
                Ok(Resolution::Placeholder(PlaceholderReason::UnsupportedDimensions))
            }
            Err(err) => Err(err),
        }
    }

    /// Generate and store the thumbnail for a freshly uploaded object from a
    /// local copy of its bytes. Nothing here fails the upload.
    #[tracing::instrument(skip(self, local_copy))]
    pub async fn prime(&self, name: &str, local_copy: &Path) -> PrimeOutcome {
        let kind = MediaKind::classify(name);
        if !kind.has_thumbnail() {
            return PrimeOutcome::Skipped { reason: "not media" };
        }
        let Some(key) = media::thumbnail_key(name) else {
            return PrimeOutcome::Skipped {
                reason: "no thumbnail mapping",
            };
        };

        match self.generate(kind, local_copy).await {
            Ok(Generated::Jpeg(bytes)) => match self.store_thumbnail(&key, bytes).await {
                CacheWrite::Failed(err) => PrimeOutcome::Failed(ThumbnailError::Storage(err)),
                _ => PrimeOutcome::Stored { key },
            },
            Ok(Generated::Undecodable(_)) => PrimeOutcome::Skipped {
                reason: "image did not decode",
            },
            Err(err) => PrimeOutcome::Failed(err),
        }
    }

    /// Copy the original into a temp file that is removed when dropped.
    async fn download_to_scratch(&self, name: &str) -> Result<NamedTempFile, ThumbnailError> {
        let mut body = self
            .store
            .get(name)
            .await
            .map_err(|err| ThumbnailError::from_storage(name, err))?;

        let scratch = self.scratch_file("orig-", media::extension(name))?;
        let mut file = tokio::fs::File::from_std(scratch.reopen()?);
        let copied = tokio::io::copy(&mut body.reader, &mut file).await?;
        file.flush().await?;
        debug!(name, size_bytes = copied, path = %scratch.path().display(), "original staged");
        Ok(scratch)
    }

    fn scratch_file(&self, prefix: &str, suffix: &str) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);
        match &self.settings.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    async fn generate(&self, kind: MediaKind, source: &Path) -> Result<Generated, ThumbnailError> {
        match kind {
            MediaKind::Video => {
                let frame = self.scratch_file("vid-thumb-", ".jpg")?;
                self.transcoder
                    .extract_frame(source, frame.path(), self.settings.frame_offset)
                    .await?;
                let data = Bytes::from(tokio::fs::read(frame.path()).await?);
                // an undecodable frame is still a usable JPEG from ffmpeg
                match self.resize(data.clone()).await? {
                    Generated::Undecodable(_) => Ok(Generated::Jpeg(data)),
                    jpeg => Ok(jpeg),
                }
            }
            MediaKind::Image => {
                let data = Bytes::from(tokio::fs::read(source).await?);
                self.resize(data).await
            }
            MediaKind::Other => Err(ThumbnailError::Unmappable(source.display().to_string())),
        }
    }

    /// Decode and shrink on the blocking pool.
    async fn resize(&self, data: Bytes) -> Result<Generated, ThumbnailError> {
        let codec = Arc::clone(&self.codec);
        let width = self.settings.width;
        tokio::task::spawn_blocking(move || -> Result<Generated, ThumbnailError> {
            let image = match codec.decode(&data) {
                Ok(image) => image,
                Err(err) => {
                    debug!("decode failed, keeping source bytes: {}", err);
                    return Ok(Generated::Undecodable(data));
                }
            };
            let jpeg = codec.encode_thumbnail(&image, width)?;
            Ok(Generated::Jpeg(Bytes::from(jpeg)))
        })
        .await?
    }

    async fn store_thumbnail(&self, key: &str, bytes: Bytes) -> CacheWrite {
        let size_bytes = bytes.len();
        match self
            .store
            .put_bytes(key, Some(THUMBNAIL_CONTENT_TYPE.to_string()), bytes)
            .await
        {
            Ok(_) => {
                info!(key, size_bytes, "thumbnail stored");
                CacheWrite::Stored
            }
            Err(err) => CacheWrite::Failed(err),
        }
    }
}
