//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> item database + image storage directory checks

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    bucket: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when the database answers and the storage directory accepts a
/// write/read/delete round trip, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", check_sqlite(&state.items.db).await);
    checks.insert("storage", check_storage_dir(&state.storage.base_path).await);

    let ready = checks.values().all(|c| c.ok);
    if !ready {
        tracing::warn!("readiness check failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            bucket: state.storage.bucket.clone(),
            checks,
        }),
    )
}

async fn check_sqlite(db: &SqlitePool) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::fail(format!("error: {}", e)),
    }
}

async fn check_storage_dir(base: &Path) -> CheckStatus {
    let scratch = base.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&scratch, b"readyz").await {
        return CheckStatus::fail(format!("could not write scratch file: {}", e));
    }

    let status = match fs::read(&scratch).await {
        Ok(bytes) if bytes == b"readyz" => CheckStatus::pass(),
        Ok(_) => CheckStatus::fail("scratch file content mismatch"),
        Err(e) => CheckStatus::fail(format!("could not read scratch file: {}", e)),
    };
    // leftover scratch files are harmless
    let _ = fs::remove_file(&scratch).await;
    status
}
