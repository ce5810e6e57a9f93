//! Issues and verifies short-lived upload credentials.
//!
//! A credential is `access_key:signature:policy`, where `policy` is the
//! URL-safe base64 of `{"scope": bucket, "deadline": unix_secs}` and
//! `signature` is the URL-safe base64 HMAC-SHA256 of the encoded policy
//! under the server's secret key. The secret never leaves the server.

use crate::config::UploadConfig;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub scope: String,
    pub deadline: i64,
}

/// Response body of `GET /upload-token`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UploadTokenResponse {
    pub token: String,
    pub domain: String,
    pub bucket: String,
    /// Validity window in seconds.
    pub expires: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("upload storage is not configured")]
    NotConfigured,
    #[error("malformed upload token")]
    Malformed,
    #[error("upload token signature mismatch")]
    BadSignature,
    #[error("upload token is not valid for bucket `{0}`")]
    WrongScope(String),
    #[error("upload token expired")]
    Expired,
}

#[derive(Clone)]
pub struct TokenService {
    bucket: String,
    domain: String,
    access_key: String,
    secret_key: Option<String>,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(upload: &UploadConfig, domain: impl Into<String>) -> Self {
        Self {
            bucket: upload.bucket.clone(),
            domain: domain.into(),
            access_key: upload.access_key.clone(),
            secret_key: upload.secret_key.clone(),
            ttl_secs: upload.token_ttl_secs,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        let secret = self.secret_key.as_deref().ok_or(TokenError::NotConfigured)?;
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::NotConfigured)
    }

    /// Sign a policy for the configured bucket valid until `now + ttl`.
    pub fn issue(&self, now: DateTime<Utc>) -> Result<UploadTokenResponse, TokenError> {
        let policy = UploadPolicy {
            scope: self.bucket.clone(),
            deadline: now.timestamp() + self.ttl_secs,
        };
        let policy_json = serde_json::to_vec(&policy).map_err(|_| TokenError::Malformed)?;
        let encoded_policy = URL_SAFE_NO_PAD.encode(policy_json);

        let mut mac = self.mac()?;
        mac.update(encoded_policy.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(UploadTokenResponse {
            token: format!("{}:{}:{}", self.access_key, signature, encoded_policy),
            domain: self.domain.clone(),
            bucket: self.bucket.clone(),
            expires: self.ttl_secs,
        })
    }

    /// Check a credential presented with an upload.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UploadPolicy, TokenError> {
        let mut parts = token.splitn(3, ':');
        let (Some(access_key), Some(signature), Some(encoded_policy)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        if access_key != self.access_key {
            return Err(TokenError::BadSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(encoded_policy.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let policy_json = URL_SAFE_NO_PAD
            .decode(encoded_policy)
            .map_err(|_| TokenError::Malformed)?;
        let policy: UploadPolicy =
            serde_json::from_slice(&policy_json).map_err(|_| TokenError::Malformed)?;

        if policy.scope != self.bucket {
            return Err(TokenError::WrongScope(self.bucket.clone()));
        }
        if policy.deadline <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(policy)
    }
}
