//! reqwest-backed implementations of the client traits.
//!
//! Error bodies from the server look like `{"error": "...", "status": n}`;
//! the `error` string is surfaced verbatim when present. Network failures
//! and unreadable bodies are reported with an empty message so the calling
//! controller substitutes its own generic text.

use super::{
    ClientError, ClientResult, ItemPage, ItemSource, ItemStore, LOAD_FAILED, LocalFile,
    ObjectTransport, PageQuery, ProgressFn, TokenIssuer, UploadTokenGrant,
};
use crate::{
    auth::SessionResponse,
    handlers::{item_handlers::DataResponse, upload_handlers::UploadResponse},
    models::item::{Item, ItemPayload},
};
use async_trait::async_trait;
use reqwest::{
    Body, Client, RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::{sync::RwLock, time::Duration};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Attempts made by [`HttpObjectTransport`] before giving up.
pub const UPLOAD_ATTEMPTS: usize = 3;

/// Size of the body chunks an upload is streamed in; progress is reported
/// once per chunk.
const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Category as served by `GET /categories`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogBody {
    data: Vec<RemoteCategory>,
}

fn build_client(timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Fetch(format!("failed to create HTTP client: {}", e)))
}

/// Read the `error` field of a failed response, or an empty string.
async fn remote_message(response: Response) -> String {
    let status = response.status();
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_default();
    tracing::debug!(status = status.as_u16(), message = %message, "request rejected");
    message
}

/// Send `request`, returning the decoded body or the server's message.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, String> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(error = %e, "request failed");
        String::new()
    })?;

    if !response.status().is_success() {
        return Err(remote_message(response).await);
    }
    response.json::<T>().await.map_err(|e| {
        tracing::warn!(error = %e, "failed to parse response");
        String::new()
    })
}

/// Client for the item, catalog, session and credential endpoints.
pub struct GalleryApi {
    client: Client,
    base_url: String,
    admin_token: RwLock<Option<String>>,
}

impl GalleryApi {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Ok(Self {
            client: build_client(REQUEST_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn set_admin_token(&self, token: Option<String>) {
        *self.admin_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn is_admin(&self) -> bool {
        self.admin_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .admin_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Exchange the admin password for a session token and keep it for
    /// subsequent mutating requests.
    pub async fn login(&self, password: &str) -> ClientResult<SessionResponse> {
        let request = self
            .client
            .post(self.url("/admin/session"))
            .json(&json!({ "password": password }));
        let session: SessionResponse = send_json(request).await.map_err(|msg| {
            ClientError::Credential(if msg.is_empty() {
                "login failed".into()
            } else {
                msg
            })
        })?;
        self.set_admin_token(Some(session.token.clone()));
        tracing::info!(expires_at = %session.expires_at, "admin session started");
        Ok(session)
    }

    pub fn logout(&self) {
        self.set_admin_token(None);
    }

    pub async fn get_item(&self, id: &str) -> ClientResult<Item> {
        let request = self.client.get(self.url(&format!("/items/{}", id)));
        send_json::<DataResponse<Item>>(request)
            .await
            .map(|body| body.data)
            .map_err(|msg| ClientError::Fetch(or_default(msg, LOAD_FAILED)))
    }

    pub async fn delete_item(&self, id: &str) -> ClientResult<()> {
        let request = self
            .authorized(self.client.delete(self.url(&format!("/items/{}", id))));
        send_json::<serde_json::Value>(request)
            .await
            .map(|_| ())
            .map_err(|msg| ClientError::Persistence(or_default(msg, "failed to delete item")))
    }

    /// Add `increment` likes (may be negative) and return the updated item.
    pub async fn like_item(&self, id: &str, increment: i64) -> ClientResult<Item> {
        let request = self
            .client
            .patch(self.url(&format!("/items/{}", id)))
            .json(&json!({ "likesIncrement": increment }));
        send_json::<DataResponse<Item>>(request)
            .await
            .map(|body| body.data)
            .map_err(|msg| ClientError::Persistence(or_default(msg, "failed to update likes")))
    }

    pub async fn categories(&self) -> ClientResult<Vec<RemoteCategory>> {
        let request = self.client.get(self.url("/categories"));
        send_json::<CatalogBody>(request)
            .await
            .map(|body| body.data)
            .map_err(|msg| ClientError::Fetch(or_default(msg, "failed to load categories")))
    }
}

fn or_default(msg: String, fallback: &str) -> String {
    if msg.is_empty() { fallback.to_string() } else { msg }
}

#[async_trait]
impl ItemSource for GalleryApi {
    async fn fetch_page(&self, query: PageQuery) -> ClientResult<ItemPage> {
        let request = self.client.get(self.url("/items")).query(&[
            ("limit", query.limit.to_string()),
            ("skip", query.skip.to_string()),
            ("sort", query.sort.to_string()),
        ]);
        send_json(request)
            .await
            .map_err(|msg| ClientError::Fetch(or_default(msg, LOAD_FAILED)))
    }
}

#[async_trait]
impl ItemStore for GalleryApi {
    async fn create_item(&self, payload: &ItemPayload) -> ClientResult<Item> {
        let request = self.authorized(self.client.post(self.url("/items")).json(payload));
        send_json::<DataResponse<Item>>(request)
            .await
            .map(|body| body.data)
            .map_err(ClientError::Persistence)
    }

    async fn update_item(&self, id: &str, payload: &ItemPayload) -> ClientResult<Item> {
        let request = self.authorized(
            self.client
                .put(self.url(&format!("/items/{}", id)))
                .json(payload),
        );
        send_json::<DataResponse<Item>>(request)
            .await
            .map(|body| body.data)
            .map_err(ClientError::Persistence)
    }
}

#[async_trait]
impl TokenIssuer for GalleryApi {
    async fn issue_token(&self) -> ClientResult<UploadTokenGrant> {
        let request = self.authorized(self.client.get(self.url("/upload-token")));
        send_json(request).await.map_err(ClientError::Credential)
    }
}

/// Uploads objects to `POST /upload` as a multipart form.
pub struct HttpObjectTransport {
    client: Client,
    upload_url: String,
}

impl HttpObjectTransport {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self {
            client: build_client(UPLOAD_TIMEOUT)?,
            upload_url: format!("{}/upload", base_url.trim_end_matches('/')),
        })
    }

    /// One upload attempt. `Err((retryable, message))` on failure.
    async fn attempt(
        &self,
        file: &LocalFile,
        key: &str,
        credential: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<String, (bool, String)> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<usize>();
        let chunks: Vec<_> = (0..file.bytes.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| {
                file.bytes
                    .slice(start..(start + UPLOAD_CHUNK).min(file.bytes.len()))
            })
            .collect();
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            let _ = tx.send(chunk.len());
            Ok::<_, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(Body::wrap_stream(stream), file.size())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| (false, format!("invalid content type: {}", e)))?;
        let form = Form::new()
            .text("token", credential.to_string())
            .text("key", key.to_string())
            .part("file", part);

        let total = file.size().max(1);
        let mut sent = 0u64;
        let send = self.client.post(&self.upload_url).multipart(form).send();
        tokio::pin!(send);
        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                Some(n) = rx.recv() => {
                    sent += n as u64;
                    // 100 is reported by the caller once the server confirms
                    progress(((sent * 100) / total).min(99) as u8);
                }
            }
        };

        let response = result.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "upload request failed");
            (true, String::new())
        })?;
        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err((retryable, remote_message(response).await));
        }

        response
            .json::<UploadResponse>()
            .await
            .map(|body| body.key)
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "unreadable upload response");
                (false, String::new())
            })
    }
}

#[async_trait]
impl ObjectTransport for HttpObjectTransport {
    async fn put_object(
        &self,
        file: &LocalFile,
        key: &str,
        credential: &str,
        progress: &ProgressFn<'_>,
    ) -> ClientResult<String> {
        let mut last_message = String::new();
        for attempt in 1..=UPLOAD_ATTEMPTS {
            match self.attempt(file, key, credential, progress).await {
                Ok(stored) => return Ok(stored),
                Err((retryable, message)) => {
                    last_message = message;
                    if !retryable || attempt == UPLOAD_ATTEMPTS {
                        break;
                    }
                    tracing::debug!(key = %key, attempt, "retrying upload");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
        Err(ClientError::Transfer(last_message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = GalleryApi::new("http://localhost:3000/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.url("/items"), "http://localhost:3000/items");

        let transport = HttpObjectTransport::new("http://localhost:3000/").unwrap();
        assert_eq!(transport.upload_url, "http://localhost:3000/upload");
    }

    #[test]
    fn admin_token_toggles() {
        let api = GalleryApi::new("http://localhost:3000").unwrap();
        assert!(!api.is_admin());
        api.set_admin_token(Some("t".into()));
        assert!(api.is_admin());
        api.logout();
        assert!(!api.is_admin());
    }

    #[test]
    fn empty_message_falls_back() {
        assert_eq!(or_default(String::new(), LOAD_FAILED), LOAD_FAILED);
        assert_eq!(or_default("item not found".into(), LOAD_FAILED), "item not found");
    }
}
