//! src/services/storage_service.rs
//!
//! StorageService: the bucket backend behind the browser. Object metadata
//! lives in SQLite and payloads on local disk, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. One service instance is bound
//! to exactly one bucket for the lifetime of the process.

use crate::models::{bucket::Bucket, object::Object};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
pub const MAX_LIST_KEYS: usize = 1000;

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub start_after: Option<String>,
    pub max_keys: usize,
}

#[derive(Debug)]
pub struct ListObjectsResult {
    pub objects: Vec<Object>,
    pub is_truncated: bool,
    /// Key to pass as `start_after` to fetch the next page.
    pub next_start_after: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// True when the error means "nothing stored under that name".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectNotFound { .. } | StorageError::BucketNotFound(_)
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Apply the embedded schema. Every statement is idempotent, so this runs on
/// each startup as well as under `--migrate`.
pub async fn apply_schema(db: &SqlitePool) -> StorageResult<usize> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(statements.len())
}

/// SQLite + disk object storage for a single bucket.
///
/// Supports streamed uploads with overwrite semantics, streamed reads,
/// attribute lookups and paged listing in key order.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: String,
}

impl StorageService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    /// Reject keys that could escape the bucket directory or that no
    /// forward-slash path could produce.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN || key.starts_with('/') {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| matches!(segment, "" | "." | ".."))
        {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key)
    /// as lowercase hex. Keeps the file count per directory bounded.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Validate the configured bucket name and make sure its row and
    /// directory exist.
    pub async fn ensure_bucket(&self) -> StorageResult<Bucket> {
        validate_bucket_name(&self.bucket)?;
        fs::create_dir_all(self.bucket_root()).await?;

        sqlx::query(
            "INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&self.bucket)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        self.fetch_bucket().await
    }

    async fn fetch_bucket(&self) -> StorageResult<Bucket> {
        sqlx::query_as::<Sqlite, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(&self.bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::BucketNotFound(self.bucket.clone()),
                other => StorageError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, key, content_type, size_bytes, etag, uploaded_at
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream-upload an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temporary sibling file first while size and MD5 are
    /// computed, then the file is fsynced and renamed over the final path.
    /// The temporary file is removed on every error path.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket().await?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let written = match chunk_res {
                Ok(chunk) => {
                    size_bytes += chunk.len() as i64;
                    digest.consume(&chunk);
                    file.write_all(&chunk).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        let synced = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(err) => Err(err),
        };
        if let Err(err) = synced {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let etag = format!("{:x}", digest.compute());

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            RETURNING id, key, content_type, size_bytes, etag, uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!(key, id = %object.id, size_bytes, etag = %etag, "stored object payload");
        Ok(object)
    }

    /// Metadata plus an open file handle ready for streaming out.
    ///
    /// A metadata row whose payload file is gone reads as not found.
    pub async fn get_object_reader(&self, key: &str) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket().await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    pub async fn get_object_metadata(&self, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket().await?;
        self.fetch_object(&bucket_rec, key).await
    }

    /// One page of objects in lexicographic key order.
    pub async fn list_objects(
        &self,
        params: ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        let bucket_rec = self.fetch_bucket().await?;
        let max_keys = params.max_keys.clamp(1, MAX_LIST_KEYS);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, key, content_type, size_bytes, etag, uploaded_at \
             FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(bucket_rec.id);

        if let Some(start_after) = &params.start_after {
            builder.push(" AND key > ");
            builder.push_bind(start_after.clone());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut objects: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;

        let is_truncated = objects.len() == fetch_limit;
        if is_truncated {
            objects.pop();
        }
        let next_start_after = if is_truncated {
            objects.last().map(|obj| obj.key.clone())
        } else {
            None
        };

        Ok(ListObjectsResult {
            objects,
            is_truncated,
            next_start_after,
        })
    }

    /// Cheap end-to-end check: `SELECT 1` against SQLite plus a
    /// write/read/delete round trip under the bucket directory.
    pub async fn ping(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;

        let check_file = self.bucket_root().join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&check_file, b"readyz").await?;
        let read_back = fs::read(&check_file).await;
        let _ = fs::remove_file(&check_file).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "readiness file content mismatch",
            )));
        }
        Ok(())
    }
}

/// S3-style bucket naming rules:
/// - 3-63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - starts and ends with a letter or digit
/// - no consecutive dots or dot-hyphen pairs
/// - not shaped like an IPv4 address
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return reject("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return reject("must start and end with a lowercase letter or digit");
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return reject("cannot contain consecutive dots or dot-hyphen combinations");
    }
    if is_ipv4_like(name) {
        return reject("must not be formatted like an IP address");
    }
    Ok(())
}

fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn service() -> (StorageService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let service = StorageService::new(Arc::new(pool), dir.path(), "media-files");
        service.ensure_bucket().await.unwrap();
        (service, dir)
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(vec![
            Ok(Bytes::from_static(&data[..data.len() / 2])),
            Ok(Bytes::from_static(&data[data.len() / 2..])),
        ])
    }

    #[tokio::test]
    async fn upload_then_read_back() {
        let (service, _dir) = service().await;
        let stored = service
            .upload_object_stream("photos/a.png", Some("image/png".into()), body(b"hello world"))
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 11);
        assert_eq!(stored.etag.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));

        let (meta, mut file) = service.get_object_reader("photos/a.png").await.unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello world");
        assert_eq!(meta.key, "photos/a.png");
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn overwrite_replaces_payload_and_metadata() {
        let (service, _dir) = service().await;
        service
            .upload_object_stream("a.txt", None, body(b"first"))
            .await
            .unwrap();
        let second = service
            .upload_object_stream("a.txt", None, body(b"second!"))
            .await
            .unwrap();
        assert_eq!(second.size_bytes, 7);

        let meta = service.get_object_metadata("a.txt").await.unwrap();
        assert_eq!(meta.size_bytes, 7);
        let page = service
            .list_objects(ListObjectsParams {
                max_keys: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (service, _dir) = service().await;
        let err = service.get_object_metadata("nope.jpg").await.unwrap_err();
        assert!(err.is_not_found());
        let err = service.get_object_reader("nope.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_behind() {
        let (service, _dir) = service().await;
        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = service
            .upload_object_stream("broken.bin", None, broken)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(service.get_object_metadata("broken.bin").await.unwrap_err().is_not_found());

        let parent = service.object_path("broken.bin");
        let mut entries = fs::read_dir(parent.parent().unwrap()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unsafe_keys() {
        let (service, _dir) = service().await;
        for key in ["", "/abs.txt", "a/../b.txt", "a//b.txt", "./a.txt", "a\\b.txt"] {
            let err = service.get_object_metadata(key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey(_)), "{key}");
        }
        assert!(service.ensure_key_safe("notes/v1..2.txt").is_ok());
    }

    #[tokio::test]
    async fn lists_in_pages() {
        let (service, _dir) = service().await;
        for key in ["a.jpg", "b_1.mp4", "b%2.mp4", "c/d.png", "thumb/a.jpg"] {
            service
                .upload_object_stream(key, None, body(b"xy"))
                .await
                .unwrap();
        }

        let first = service
            .list_objects(ListObjectsParams {
                max_keys: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a.jpg", "b%2.mp4"]);
        assert!(first.is_truncated);

        let second = service
            .list_objects(ListObjectsParams {
                start_after: first.next_start_after.clone(),
                max_keys: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["b_1.mp4", "c/d.png", "thumb/a.jpg"]);
        assert!(!second.is_truncated);
        assert!(second.next_start_after.is_none());
    }

    #[tokio::test]
    async fn store_listing_carries_attributes() {
        use crate::services::object_store::ObjectStore;

        let (service, _dir) = service().await;
        service
            .upload_object_stream("b.mp4", Some("video/mp4".into()), body(b"movie"))
            .await
            .unwrap();
        service
            .upload_object_stream("a.jpg", None, body(b"jpeg bytes"))
            .await
            .unwrap();

        let listed = ObjectStore::list(&service).await.unwrap();
        let rows: Vec<_> = listed
            .iter()
            .map(|entry| {
                let object = entry.attrs.as_ref().unwrap();
                (entry.name.as_str(), object.size_bytes, object.key.as_str())
            })
            .collect();
        assert_eq!(rows, [("a.jpg", 10, "a.jpg"), ("b.mp4", 5, "b.mp4")]);
    }

    #[tokio::test]
    async fn store_reader_seeks() {
        use crate::services::object_store::ObjectStore;
        use tokio::io::AsyncSeekExt;

        let (service, _dir) = service().await;
        service
            .upload_object_stream("clip.webm", None, body(b"0123456789"))
            .await
            .unwrap();

        let mut object = ObjectStore::get(&service, "clip.webm").await.unwrap();
        object.reader.seek(io::SeekFrom::Start(4)).await.unwrap();
        let mut rest = String::new();
        object.reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "456789");
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let (service, _dir) = service().await;
        let again = service.ensure_bucket().await.unwrap();
        assert_eq!(again.name, "media-files");
        service.ping().await.unwrap();
    }

    #[test]
    fn bucket_name_rules() {
        assert!(validate_bucket_name("my-files.2024").is_ok());
        for bad in ["ab", "Upper", "-edge", "edge.", "a..b", "a.-b", "192.168.0.1", "with space"] {
            assert!(validate_bucket_name(bad).is_err(), "{bad}");
        }
    }
}
