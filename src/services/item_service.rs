//! ItemService: CRUD over the `items` table.
//!
//! Items are stored one row per record; cover image, detail images and tags
//! are JSON columns. Listing supports an optional variety filter, offset
//! paging and three server-side sort orders.

use crate::models::item::{ImageAsset, Item, ItemPayload, ItemRow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 12;
pub const MAX_LIMIT: usize = 100;

const ITEM_COLUMNS: &str = "id, variety, title, owner_name, description, cover_image, \
                            detail_images, tags, likes, created_at, updated_at";

/// Server-interpreted ordering of the item list.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    Newest,
    Oldest,
    /// Most liked first, ties broken by newest.
    Likes,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
            SortOrder::Likes => "likes",
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            SortOrder::Newest => " ORDER BY created_at DESC, id DESC",
            SortOrder::Oldest => " ORDER BY created_at ASC, id ASC",
            SortOrder::Likes => " ORDER BY likes DESC, created_at DESC, id DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "likes" => Ok(SortOrder::Likes),
            other => Err(ItemError::Invalid(format!("unsupported sort `{}`", other))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListItemsParams {
    pub variety: Option<String>,
    pub limit: usize,
    pub skip: usize,
    pub sort: SortOrder,
}

#[derive(Serialize, Debug)]
pub struct ListItemsResult {
    pub data: Vec<Item>,
    pub total: i64,
    pub limit: usize,
    pub skip: usize,
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("item `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type ItemResult<T> = Result<T, ItemError>;

/// Data-access object for collectible records.
#[derive(Clone)]
pub struct ItemService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl ItemService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Reject payloads the gallery cannot render.
    fn validate(payload: &ItemPayload) -> ItemResult<()> {
        if payload.title.trim().is_empty() {
            return Err(ItemError::Invalid("title is required".into()));
        }
        if payload.variety.trim().is_empty() {
            return Err(ItemError::Invalid("variety is required".into()));
        }
        validate_asset(&payload.cover_image, "coverImage")?;
        for asset in payload.detail_images.iter().flatten() {
            validate_asset(asset, "detailImages")?;
        }
        Ok(())
    }

    /// List one page of items.
    ///
    /// `limit` is clamped to `1..=MAX_LIMIT`; `total` counts every item that
    /// matches the variety filter, independent of paging.
    pub async fn list(&self, params: ListItemsParams) -> ItemResult<ListItemsResult> {
        let limit = params.limit.clamp(1, MAX_LIMIT);
        let variety = params.variety.filter(|v| !v.trim().is_empty());

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM items");
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM items", ITEM_COLUMNS));
        if let Some(variety) = &variety {
            count.push(" WHERE variety = ").push_bind(variety.clone());
            select.push(" WHERE variety = ").push_bind(variety.clone());
        }
        select.push(params.sort.order_by());
        select.push(" LIMIT ").push_bind(limit as i64);
        select.push(" OFFSET ").push_bind(params.skip as i64);

        let total: i64 = count.build_query_scalar().fetch_one(&*self.db).await?;
        let rows: Vec<ItemRow> = select.build_query_as().fetch_all(&*self.db).await?;
        debug!(
            returned = rows.len(),
            total,
            skip = params.skip,
            sort = %params.sort,
            "listed items"
        );

        Ok(ListItemsResult {
            data: rows.into_iter().map(Item::from).collect(),
            total,
            limit,
            skip: params.skip,
        })
    }

    pub async fn get(&self, id: &str) -> ItemResult<Item> {
        sqlx::query_as::<_, ItemRow>(&format!("SELECT {} FROM items WHERE id = ?", ITEM_COLUMNS))
            .bind(id)
            .fetch_one(&*self.db)
            .await
            .map(Item::from)
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => ItemError::NotFound(id.to_string()),
                other => ItemError::Sqlx(other),
            })
    }

    /// Insert a new record; id and timestamps are assigned here.
    pub async fn create(&self, payload: ItemPayload) -> ItemResult<Item> {
        Self::validate(&payload)?;
        let now = Utc::now();
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "INSERT INTO items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?) RETURNING {}",
            ITEM_COLUMNS, ITEM_COLUMNS
        ))
        .bind(Uuid::new_v4().simple().to_string())
        .bind(payload.variety.trim())
        .bind(payload.title.trim())
        .bind(&payload.owner_name)
        .bind(&payload.description)
        .bind(Json(&payload.cover_image))
        .bind(payload.detail_images.as_ref().map(Json))
        .bind(Json(&payload.tags))
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        debug!(id = %row.id, "created item");
        Ok(row.into())
    }

    /// Replace the editable fields of an existing record.
    ///
    /// Likes and the creation timestamp are preserved.
    pub async fn update(&self, id: &str, payload: ItemPayload) -> ItemResult<Item> {
        Self::validate(&payload)?;
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE items SET variety = ?, title = ?, owner_name = ?, description = ?,
                    cover_image = ?, detail_images = ?, tags = ?, updated_at = ?
             WHERE id = ? RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(payload.variety.trim())
        .bind(payload.title.trim())
        .bind(&payload.owner_name)
        .bind(&payload.description)
        .bind(Json(&payload.cover_image))
        .bind(payload.detail_images.as_ref().map(Json))
        .bind(Json(&payload.tags))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(Item::from)
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }

    pub async fn delete(&self, id: &str) -> ItemResult<()> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ItemError::NotFound(id.to_string()));
        }
        debug!(id, "deleted item");
        Ok(())
    }

    /// Adjust the like counter by `increment`, never going below zero.
    pub async fn add_likes(&self, id: &str, increment: i64) -> ItemResult<Item> {
        if increment == 0 {
            return Err(ItemError::Invalid("likesIncrement must not be zero".into()));
        }
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE items SET likes = MAX(likes + ?, 0) WHERE id = ? RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(increment)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(Item::from)
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }
}

fn validate_asset(asset: &ImageAsset, field: &str) -> ItemResult<()> {
    if asset.url.trim().is_empty() {
        return Err(ItemError::Invalid(format!("{}.url is required", field)));
    }
    if asset.width == 0 || asset.height == 0 {
        return Err(ItemError::Invalid(format!(
            "{} dimensions must be positive",
            field
        )));
    }
    Ok(())
}
