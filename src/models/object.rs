//! Represents an object (file) stored in the bucket.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Attributes of a single object within the bucket.
///
/// Carries metadata only; payload bytes are read through the store.
#[derive(Clone, FromRow, Debug, PartialEq)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object name (forward-slash separated path within the bucket).
    pub key: String,

    /// Content type supplied at upload time, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: Option<String>,

    /// When the current payload was written.
    pub uploaded_at: DateTime<Utc>,
}

impl Object {
    /// Size clamped to an unsigned byte count.
    pub fn size(&self) -> u64 {
        self.size_bytes.max(0) as u64
    }
}
