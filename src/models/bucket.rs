//! Represents the bucket this process serves.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// The single storage bucket the browser is bound to.
#[derive(Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Bucket name (must conform to DNS naming rules).
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
