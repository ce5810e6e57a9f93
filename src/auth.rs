//! Admin capability check.
//!
//! An admin exchanges the configured password for a signed session token
//! carrying a role claim and an expiry. Mutating endpoints require that
//! token as a bearer credential; the server verifies it on every request.

use crate::{AppState, config::AdminConfig, errors::AppError};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    response::Json,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub role: String,
    pub exp: i64,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminAuth {
    config: AdminConfig,
}

impl AdminAuth {
    pub fn new(config: AdminConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.password.is_some()
    }

    fn sign(&self, payload: &str) -> Result<String, AppError> {
        let mut mac = HmacSha256::new_from_slice(self.config.session_secret.as_bytes())
            .map_err(|_| AppError::internal("invalid session secret"))?;
        mac.update(payload.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Exchange the admin password for a session token.
    pub fn login(&self, password: &str, now: DateTime<Utc>) -> Result<SessionResponse, AppError> {
        let expected = self
            .config
            .password
            .as_deref()
            .ok_or_else(|| AppError::forbidden("admin access is not configured"))?;
        if !password_matches(password, expected) {
            tracing::warn!("admin login rejected");
            return Err(AppError::unauthorized("invalid password"));
        }

        let exp = now.timestamp() + self.config.session_ttl_secs;
        let claims = SessionClaims {
            role: ADMIN_ROLE.into(),
            exp,
        };
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&claims).map_err(|e| AppError::internal(e.to_string()))?,
        );
        let signature = self.sign(&payload)?;

        Ok(SessionResponse {
            token: format!("{}.{}", payload, signature),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(now),
        })
    }

    /// Verify a session token and its admin role claim.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AppError> {
        if !self.is_enabled() {
            return Err(AppError::forbidden("admin access is not configured"));
        }
        let unauthorized = || AppError::unauthorized("invalid admin session");

        let (payload, signature) = token.split_once('.').ok_or_else(unauthorized)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| unauthorized())?;
        let mut mac = HmacSha256::new_from_slice(self.config.session_secret.as_bytes())
            .map_err(|_| AppError::internal("invalid session secret"))?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| unauthorized())?;

        let claims: SessionClaims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(unauthorized)?;

        if claims.role != ADMIN_ROLE {
            return Err(AppError::forbidden("admin role required"));
        }
        if claims.exp <= now.timestamp() {
            return Err(AppError::unauthorized("admin session expired"));
        }
        Ok(claims)
    }
}

/// Compares digests so neither content nor length of the expected
/// password leaks through timing.
fn password_matches(candidate: &str, expected: &str) -> bool {
    Sha256::digest(candidate.as_bytes())
        .ct_eq(&Sha256::digest(expected.as_bytes()))
        .into()
}

/// Extractor proving the request carries a valid admin session.
pub struct AdminSession(pub SessionClaims);

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("admin session required"))?;

        state.admin.verify(token.trim(), Utc::now()).map(AdminSession)
    }
}

/// `POST /admin/session`
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.admin.login(&req.password, Utc::now())?;
    tracing::info!("admin session issued");
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::Duration;

    fn auth(password: Option<&str>) -> AdminAuth {
        AdminAuth::new(AdminConfig {
            password: password.map(String::from),
            session_secret: "session-secret".into(),
            session_ttl_secs: 60,
        })
    }

    #[test]
    fn session_round_trip_and_expiry() {
        let auth = auth(Some("walnut"));
        let now = Utc::now();
        let session = auth.login("walnut", now).unwrap();

        let claims = auth.verify(&session.token, now).unwrap();
        assert_eq!(claims.role, ADMIN_ROLE);

        let err = auth
            .verify(&session.token, now + Duration::seconds(61))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn wrong_password_and_forged_token_fail() {
        let auth = auth(Some("walnut"));
        let now = Utc::now();
        assert_eq!(
            auth.login("pecan", now).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );

        let session = auth.login("walnut", now).unwrap();
        let (payload, _) = session.token.split_once('.').unwrap();
        let forged = format!("{}.AAAA", payload);
        assert_eq!(
            auth.verify(&forged, now).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn password_prefixes_and_extensions_are_rejected() {
        let auth = auth(Some("walnut"));
        let now = Utc::now();
        for candidate in ["", "wal", "walnut ", "walnuts", "WALNUT"] {
            assert_eq!(
                auth.login(candidate, now).unwrap_err().status,
                StatusCode::UNAUTHORIZED
            );
        }
        assert!(password_matches("walnut", "walnut"));
    }

    #[test]
    fn disabled_without_password() {
        let auth = auth(None);
        assert_eq!(
            auth.login("", Utc::now()).unwrap_err().status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            auth.verify("x.y", Utc::now()).unwrap_err().status,
            StatusCode::FORBIDDEN
        );
    }
}
