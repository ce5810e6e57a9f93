//! Image object storage.
//!
//! Payloads live on local disk under `base_path/{bucket}/{aa}/{bb}/{key}`,
//! where `aa`/`bb` are the first two bytes of MD5(`bucket/key`); metadata
//! lives in the `objects` table. Writing an existing key replaces it.

use crate::models::object::Object;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use sqlx::SqlitePool;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

const OBJECT_COLUMNS: &str =
    "id, bucket, key, filename, content_type, size_bytes, etag, last_modified";

const MAX_KEY_LEN: usize = 1024;

/// Stores uploaded images for the single configured bucket.
#[derive(Clone)]
pub struct StorageService {
    pub db: Arc<SqlitePool>,
    /// Root directory for payload files.
    pub base_path: PathBuf,
    pub bucket: String,
}

/// A partially written payload; removed on drop unless persisted.
struct PendingFile {
    path: PathBuf,
    file: File,
    persisted: bool,
}

impl PendingFile {
    async fn create(dir: &Path) -> io::Result<Self> {
        let path = dir.join(format!(".upload-{}", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file,
            persisted: false,
        })
    }

    /// Flush to disk and move into place, replacing any previous payload.
    async fn persist(mut self, target: &Path) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        fs::rename(&self.path, target).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl StorageService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        ensure_bucket_name_safe(&bucket)?;
        Ok(Self {
            db,
            base_path: base_path.into(),
            bucket,
        })
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        self.base_path
            .join(&self.bucket)
            .join(format!("{:02x}", digest[0]))
            .join(format!("{:02x}", digest[1]))
            .join(key)
    }

    async fn find(&self, key: &str) -> StorageResult<Object> {
        let sql = format!(
            "SELECT {} FROM objects WHERE bucket = ? AND key = ?",
            OBJECT_COLUMNS
        );
        sqlx::query_as::<_, Object>(&sql)
            .bind(&self.bucket)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    /// Write `stream` under `key` and record its metadata.
    ///
    /// The etag is the hex MD5 of the payload. Nothing is left on disk when
    /// the stream fails part way.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        validate_key(key)?;

        let target = self.payload_path(key);
        let dir = target
            .parent()
            .ok_or(StorageError::InvalidObjectKey)?
            .to_path_buf();
        fs::create_dir_all(&dir).await?;

        let mut pending = PendingFile::create(&dir).await?;
        let mut size_bytes = 0i64;
        let mut digest = md5::Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            pending.file.write_all(&chunk).await?;
        }
        pending.persist(&target).await?;

        let filename = key.rsplit('/').next().unwrap_or(key);
        let etag = format!("{:x}", digest.compute());
        let sql = format!(
            "INSERT INTO objects ({cols}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(bucket, key) DO UPDATE SET
                 filename = excluded.filename,
                 content_type = excluded.content_type,
                 size_bytes = excluded.size_bytes,
                 etag = excluded.etag,
                 last_modified = excluded.last_modified
             RETURNING {cols}",
            cols = OBJECT_COLUMNS
        );
        let object = sqlx::query_as::<_, Object>(&sql)
            .bind(Uuid::new_v4())
            .bind(&self.bucket)
            .bind(key)
            .bind(filename)
            .bind(content_type)
            .bind(size_bytes)
            .bind(&etag)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await;

        match object {
            Ok(object) => {
                tracing::debug!(key, size_bytes, "stored image");
                Ok(object)
            }
            Err(err) => {
                let _ = fs::remove_file(&target).await;
                Err(err.into())
            }
        }
    }

    /// Metadata plus an open handle on the payload.
    pub async fn get_object_reader(&self, key: &str) -> StorageResult<(Object, File)> {
        validate_key(key)?;
        let object = self.find(key).await?;
        match File::open(self.payload_path(key)).await {
            Ok(file) => Ok((object, file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(key, "metadata present but payload missing");
                Err(StorageError::ObjectNotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_object_metadata(&self, key: &str) -> StorageResult<Object> {
        validate_key(key)?;
        self.find(key).await
    }
}

/// Keys are relative slash-separated paths with no traversal segments.
fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || key.chars().any(|c| c.is_control() || c == '\\');
    if bad {
        Err(StorageError::InvalidObjectKey)
    } else {
        Ok(())
    }
}

/// Bucket names: 3 to 63 of `[a-z0-9.-]`, alphanumeric at both ends, no
/// empty dot-separated labels.
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let reason = if !(3..=63).contains(&name.len()) {
        Some("must be between 3 and 63 characters")
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        Some("only lowercase letters, digits, dots and hyphens are allowed")
    } else if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        Some("must start and end with a letter or digit")
    } else if name
        .split('.')
        .any(|label| label.is_empty() || label.starts_with('-') || label.ends_with('-'))
    {
        Some("dot-separated labels must be non-empty and not edged by hyphens")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}
