//! HTTP handlers for the item endpoints.
//! Parameter validation happens here; everything else is delegated to
//! `ItemService`.

use crate::{
    AppState,
    auth::AdminSession,
    errors::AppError,
    models::item::{Item, ItemPayload, LikesPatch},
    services::item_service::{DEFAULT_LIMIT, ListItemsParams, ListItemsResult, SortOrder},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Query params accepted by `GET /items`.
#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub variety: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub sort: Option<String>,
}

/// Envelope used by single-record responses.
#[derive(Serialize, Deserialize, Debug)]
pub struct DataResponse<T> {
    pub data: T,
}

/// `GET /items`
pub async fn list_items(
    State(state): State<AppState>,
    Query(q): Query<ListItemsQuery>,
) -> Result<Json<ListItemsResult>, AppError> {
    let sort = match q.sort.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<SortOrder>()?,
        None => SortOrder::default(),
    };
    let params = ListItemsParams {
        variety: q.variety,
        limit: q.limit.unwrap_or(DEFAULT_LIMIT),
        skip: q.skip.unwrap_or(0),
        sort,
    };
    tracing::debug!(?params, "list items");

    Ok(Json(state.items.list(params).await?))
}

/// `GET /items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Item>>, AppError> {
    let item = state.items.get(&id).await?;
    Ok(Json(DataResponse { data: item }))
}

/// `POST /items`
pub async fn create_item(
    _admin: AdminSession,
    State(state): State<AppState>,
    Json(payload): Json<ItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    let item = state.items.create(payload).await?;
    tracing::info!(id = %item.id, title = %item.title, "item created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: item })))
}

/// `PUT /items/{id}`
pub async fn update_item(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ItemPayload>,
) -> Result<Json<DataResponse<Item>>, AppError> {
    let item = state.items.update(&id, payload).await?;
    tracing::info!(id = %item.id, "item updated");
    Ok(Json(DataResponse { data: item }))
}

/// `DELETE /items/{id}`
///
/// Uploaded images referenced by the record are left in storage.
pub async fn delete_item(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.items.delete(&id).await?;
    tracing::info!(id = %id, "item deleted");
    Ok(Json(json!({ "success": true })))
}

/// `PATCH /items/{id}` with `{"likesIncrement": n}`.
pub async fn like_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<DataResponse<Item>>, AppError> {
    let increment = serde_json::from_value::<LikesPatch>(body)
        .ok()
        .and_then(|patch| patch.likes_increment)
        .ok_or_else(|| AppError::bad_request("likesIncrement must be an integer"))?;

    let item = state.items.add_likes(&id, increment).await?;
    Ok(Json(DataResponse { data: item }))
}
