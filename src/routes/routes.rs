//! Defines routes for the gallery API.
//!
//! ## Structure
//! - **Items**
//!   - `GET    /items`      -> list (supports variety, limit, skip, sort)
//!   - `POST   /items`      -> create (admin)
//!   - `GET    /items/{id}` -> fetch one
//!   - `PUT    /items/{id}` -> replace (admin)
//!   - `PATCH  /items/{id}` -> adjust likes
//!   - `DELETE /items/{id}` -> delete (admin)
//!
//! - **Uploads**
//!   - `GET    /upload-token` -> signed upload credential (admin)
//!   - `POST   /upload`       -> multipart object upload (credential in form)
//!   - `GET    /files/{*key}` -> serve an uploaded object
//!
//! - **Misc**
//!   - `GET  /categories`, `POST /admin/session`, `GET /healthz`, `GET /readyz`

use crate::{
    AppState,
    auth::login_handler,
    handlers::{
        catalog_handlers::list_categories,
        health_handlers::{healthz, readyz},
        item_handlers::{create_item, delete_item, get_item, like_item, list_items, update_item},
        upload_handlers::{get_file, head_file, upload_object, upload_token},
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Upper bound for a single uploaded image.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build and return the router for all gallery routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/categories", get(list_categories))
        .route("/admin/session", post(login_handler))
        // Item routes
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item)
                .put(update_item)
                .patch(like_item)
                .delete(delete_item),
        )
        // Upload routes
        .route("/upload-token", get(upload_token))
        .route(
            "/upload",
            post(upload_object).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/files/{*key}", get(get_file).head(head_file))
}
