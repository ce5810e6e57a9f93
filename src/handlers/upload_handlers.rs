//! Upload credential, object upload and object delivery handlers.
//!
//! Uploads are multipart forms with fields `token`, `key` and `file`, in that
//! order; the file part is streamed to disk without buffering.

use crate::{
    AppState,
    auth::AdminSession,
    errors::AppError,
    models::object::Object,
    services::token_service::UploadTokenResponse,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

/// Body returned after a successful upload.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub key: String,
    pub hash: String,
    pub size: i64,
    pub mime_type: String,
}

/// `GET /upload-token`
pub async fn upload_token(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> Result<Json<UploadTokenResponse>, AppError> {
    let grant = state.tokens.issue(Utc::now())?;
    tracing::debug!(bucket = %grant.bucket, "issued upload token");
    Ok(Json(grant))
}

/// `POST /upload`
pub async fn upload_object(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut token: Option<String> = None;
    let mut key: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        match field.name() {
            Some("token") => token = Some(field_text(field).await?),
            Some("key") => key = Some(field_text(field).await?),
            Some("file") => {
                let token = token
                    .as_deref()
                    .ok_or_else(|| AppError::bad_request("token field must precede file"))?;
                state.tokens.verify(token, Utc::now())?;

                let key = match key.take() {
                    Some(key) => key,
                    None => field
                        .file_name()
                        .map(str::to_string)
                        .ok_or_else(|| AppError::bad_request("missing object key"))?,
                };
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let stream = field.map_err(io::Error::other);
                let object = state
                    .storage
                    .upload_object_stream(&key, Some(mime_type.clone()), stream)
                    .await?;
                tracing::info!(key = %object.key, size = object.size_bytes, "object uploaded");

                return Ok(Json(UploadResponse {
                    key: object.key,
                    hash: object.etag.unwrap_or_default(),
                    size: object.size_bytes,
                    mime_type,
                }));
            }
            _ => {}
        }
    }

    Err(AppError::bad_request("missing file field"))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map(|v| v.trim().to_string())
        .map_err(|e| AppError::bad_request(e.body_text()))
}

/// `GET /files/{*key}`: stream an uploaded object back.
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `HEAD /files/{*key}`: same headers as GET but no body.
pub async fn head_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let meta = state.storage.get_object_metadata(&key).await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref()
        && let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag))
    {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
}
