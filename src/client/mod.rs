//! Client-side controllers of the gallery front end.
//!
//! The controllers talk to the server only through the traits defined here,
//! so they can be driven by the reqwest-backed [`api::GalleryApi`] and
//! [`api::HttpObjectTransport`] in production and by in-memory fakes in
//! tests.

use crate::{
    models::item::{Item, ItemPayload},
    services::item_service::SortOrder,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub mod api;
pub mod filter;
pub mod form;
pub mod gallery;
pub mod token_cache;
pub mod uploader;

pub const CREDENTIAL_FAILED: &str = "failed to obtain upload credential";
pub const UPLOAD_FAILED: &str = "image upload failed, please retry";
pub const SAVE_FAILED: &str = "failed to save item";
pub const LOAD_FAILED: &str = "failed to load items";

/// Every client failure resolves to one human-readable message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Credential(String),
    #[error("{0}")]
    Transfer(String),
    #[error("{0}")]
    Persistence(String),
    #[error("{0}")]
    Fetch(String),
    #[error("unsupported or corrupt image: {0}")]
    Image(String),
    #[error("a submission is already in progress")]
    Busy,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Receives an integer upload percent in `0..=100`.
pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Time source, injectable so expiry logic can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A file picked by the user, held in memory until it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Extension of the original name including the dot, or empty.
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < self.name.len() => &self.name[idx..],
            _ => "",
        }
    }
}

/// Credential as returned by `GET /upload-token`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UploadTokenGrant {
    pub token: String,
    pub domain: String,
    pub bucket: String,
    /// Validity window in seconds.
    pub expires: i64,
}

/// One server page request. Category is deliberately absent: filtering by
/// category happens over the accumulated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub limit: usize,
    pub skip: usize,
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPage {
    pub data: Vec<Item>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_page(&self, query: PageQuery) -> ClientResult<ItemPage>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn create_item(&self, payload: &ItemPayload) -> ClientResult<Item>;
    async fn update_item(&self, id: &str, payload: &ItemPayload) -> ClientResult<Item>;
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(&self) -> ClientResult<UploadTokenGrant>;
}

/// Moves one file into object storage and returns the stored key.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    async fn put_object(
        &self,
        file: &LocalFile,
        key: &str,
        credential: &str,
        progress: &ProgressFn<'_>,
    ) -> ClientResult<String>;
}
