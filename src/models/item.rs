//! Represents a catalogued walnut and the assets attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::tag::Tag;

/// An image reference: a CDN-addressable URL plus the natural pixel size of
/// the source file, captured when the file was selected.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageAsset {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl ImageAsset {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }

    /// Width over height, used by the masonry grid to reserve space.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// A collectible record as returned by the item endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Opaque identifier assigned by the store on creation.
    pub id: String,

    /// Category key, usually one of the catalog ids.
    pub variety: String,

    pub title: String,

    pub owner_name: String,

    pub description: String,

    pub cover_image: ImageAsset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_images: Option<Vec<ImageAsset>>,

    #[serde(default)]
    pub tags: Vec<Tag>,

    pub likes: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /items` and `PUT /items/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub title: String,

    #[serde(default)]
    pub variety: String,

    #[serde(default)]
    pub owner_name: String,

    #[serde(default)]
    pub description: String,

    pub cover_image: ImageAsset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_images: Option<Vec<ImageAsset>>,

    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Body of `PATCH /items/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LikesPatch {
    pub likes_increment: Option<i64>,
}

/// Row shape of the `items` table.
#[derive(FromRow, Debug)]
pub struct ItemRow {
    pub id: String,
    pub variety: String,
    pub title: String,
    pub owner_name: String,
    pub description: String,
    pub cover_image: Json<ImageAsset>,
    pub detail_images: Option<Json<Vec<ImageAsset>>>,
    pub tags: Json<Vec<Tag>>,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            variety: row.variety,
            title: row.title,
            owner_name: row.owner_name,
            description: row.description,
            cover_image: row.cover_image.0,
            detail_images: row.detail_images.map(|images| images.0),
            tags: row.tags.0,
            likes: row.likes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tag::SizeValue;
    use serde_json::json;

    #[test]
    fn payload_uses_camel_case_and_omits_empty_details() {
        let payload = ItemPayload {
            title: "Lion head pair".into(),
            variety: "lion-head".into(),
            owner_name: "Old Zhang".into(),
            description: String::new(),
            cover_image: ImageAsset::new("https://cdn.test/covers/a.jpg", 800, 600),
            detail_images: None,
            tags: vec![Tag::Weight("42g".into())],
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["ownerName"], "Old Zhang");
        assert_eq!(value["coverImage"]["width"], 800);
        assert!(value.get("detailImages").is_none());
        assert_eq!(value["tags"][0], json!({"type": "weight", "value": "42g"}));
    }

    #[test]
    fn item_parses_from_listing_json() {
        let value = json!({
            "id": "abc",
            "variety": "official-hat",
            "title": "Official hat",
            "ownerName": "Li",
            "description": "",
            "coverImage": {"url": "https://cdn.test/c.jpg", "width": 400, "height": 500},
            "tags": [{"type": "size", "value": {"length": "48", "width": null, "height": "40"}}],
            "likes": 3,
            "createdAt": "2026-01-02T03:04:05Z",
            "updatedAt": "2026-01-02T03:04:05Z"
        });

        let item: Item = serde_json::from_value(value).unwrap();
        assert_eq!(item.detail_images, None);
        assert_eq!(
            item.tags,
            vec![Tag::Size(SizeValue {
                length: Some("48".into()),
                width: None,
                height: Some("40".into()),
            })]
        );
        assert!((item.cover_image.aspect_ratio() - 0.8).abs() < f64::EPSILON);
    }
}
