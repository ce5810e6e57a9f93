//! Shared setup for the integration tests: an in-memory database, a
//! temporary storage directory and a fully configured router.

#![allow(dead_code)]

use axum_test::TestServer;
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;
use walnut_gallery::{
    AppState,
    config::{AdminConfig, AppConfig, UploadConfig},
    create_app, db,
};

pub const ADMIN_PASSWORD: &str = "walnut-admin";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub config: AppConfig,
    // keeps the storage directory alive for the test's duration
    pub storage: TempDir,
}

pub fn test_config(storage: &TempDir, secret_key: Option<&str>) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        storage_dir: storage.path().to_string_lossy().into_owned(),
        database_url: "sqlite::memory:".into(),
        upload: UploadConfig {
            bucket: "walnut-images".into(),
            public_domain: Some("https://cdn.test".into()),
            access_key: "test-access".into(),
            secret_key: secret_key.map(String::from),
            token_ttl_secs: 3600,
        },
        admin: AdminConfig {
            password: Some(ADMIN_PASSWORD.into()),
            session_secret: "test-session-secret".into(),
            session_ttl_secs: 600,
        },
    }
}

pub async fn build_state(config: &AppConfig) -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    AppState::new(config, Arc::new(pool)).unwrap()
}

pub async fn spawn_app_with(secret_key: Option<&str>) -> TestApp {
    let storage = TempDir::new().unwrap();
    let config = test_config(&storage, secret_key);
    let state = build_state(&config).await;
    let server = TestServer::new(create_app(state.clone())).unwrap();
    TestApp {
        server,
        state,
        config,
        storage,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Some("test-secret-key")).await
}

pub async fn admin_token(server: &TestServer) -> String {
    let response = server
        .post("/admin/session")
        .json(&json!({ "password": ADMIN_PASSWORD }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["token"]
        .as_str()
        .unwrap()
        .to_string()
}

pub fn item_body(title: &str, variety: &str) -> Value {
    json!({
        "title": title,
        "variety": variety,
        "ownerName": "老王",
        "description": "a fine pair",
        "coverImage": { "url": "https://cdn.test/walnuts/covers/a.jpg", "width": 800, "height": 600 },
        "tags": [
            { "type": "size", "value": { "length": "48", "width": "42", "height": "40" } },
            { "type": "weight", "value": "32g" }
        ]
    })
}

pub async fn create_item(server: &TestServer, token: &str, title: &str, variety: &str) -> Value {
    let response = server
        .post("/items")
        .add_header("Authorization", format!("Bearer {}", token))
        .json(&item_body(title, variety))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<Value>()["data"].clone()
}
