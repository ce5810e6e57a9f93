use crate::services::{
    item_service::ItemError, storage_service::StorageError, token_service::TokenError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP failure: a status code and a message that is returned to the
/// caller as `{"error": message, "status": code}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Missing, malformed or expired credentials.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    /// Valid credentials without the required capability.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), "{}", self.message);
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<ItemError> for AppError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::NotFound(_) => AppError::not_found(err.to_string()),
            ItemError::Invalid(msg) => AppError::bad_request(msg),
            ItemError::Sqlx(e) => AppError::internal(format!("database error: {}", e)),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(_) => AppError::not_found(err.to_string()),
            StorageError::InvalidObjectKey | StorageError::InvalidBucketName { .. } => {
                AppError::bad_request(err.to_string())
            }
            StorageError::Sqlx(_) | StorageError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotConfigured => AppError::internal(err.to_string()),
            _ => AppError::unauthorized(err.to_string()),
        }
    }
}
