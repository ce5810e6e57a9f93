//! Represents an uploaded object (image file) in the storage bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata of a single stored object.
///
/// The payload bytes live on disk; this row records where they belong and
/// how to serve them back.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket the object was uploaded into.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Last path segment of the key.
    pub filename: String,

    /// Content type (MIME type) declared by the uploader.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}
