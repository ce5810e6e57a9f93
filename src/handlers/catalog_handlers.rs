//! Static catalog endpoint.

use crate::catalog::{self, Category, ColorOption};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub data: &'static [Category],
    pub colors: &'static [ColorOption],
    pub play_time_units: &'static [&'static str],
    pub page_size: usize,
}

/// `GET /categories`
pub async fn list_categories() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        data: catalog::CATEGORIES,
        colors: catalog::COLOR_OPTIONS,
        play_time_units: catalog::PLAY_TIME_UNITS,
        page_size: catalog::PAGE_SIZE,
    })
}
