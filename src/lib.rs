//! Walnut gallery: a catalogue of collectible walnuts.
//!
//! The server half (`routes`, `handlers`, `services`) stores item records in
//! SQLite, issues signed upload credentials and stores uploaded images. The
//! `client` half holds the stateful controllers of the gallery front end:
//! upload token cache, uploader, upload form and paginated gallery.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use auth::AdminAuth;
use config::AppConfig;
use services::{
    item_service::ItemService,
    storage_service::{StorageResult, StorageService},
    token_service::TokenService,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub items: ItemService,
    pub storage: StorageService,
    pub tokens: TokenService,
    pub admin: AdminAuth,
}

impl AppState {
    pub fn new(cfg: &AppConfig, db: Arc<SqlitePool>) -> StorageResult<Self> {
        Ok(Self {
            items: ItemService::new(db.clone()),
            storage: StorageService::new(db, cfg.storage_dir.clone(), cfg.upload.bucket.clone())?,
            tokens: TokenService::new(&cfg.upload, cfg.delivery_domain()),
            admin: AdminAuth::new(cfg.admin.clone()),
        })
    }
}

/// Build the application router with its state attached.
pub fn create_app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
