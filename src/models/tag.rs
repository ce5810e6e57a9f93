//! Descriptive tags attached to an item.
//!
//! A tag is keyed by a fixed kind. `size` carries a structured triple whose
//! members may each be unknown; every other kind carries a single string that
//! already includes its unit (`"42g"`, `"3年"`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length / width / height, each an optional numeric string in millimetres.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SizeValue {
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
}

impl SizeValue {
    /// True when none of the three dimensions is known.
    pub fn is_empty(&self) -> bool {
        [&self.length, &self.width, &self.height]
            .iter()
            .all(|dim| dim.as_deref().is_none_or(|v| v.trim().is_empty()))
    }
}

impl fmt::Display for SizeValue {
    /// Renders known dimensions joined by `×`, e.g. `48×42×40mm`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = [&self.length, &self.width, &self.height]
            .into_iter()
            .filter_map(|dim| dim.as_deref())
            .filter(|v| !v.trim().is_empty())
            .collect();
        if known.is_empty() {
            return Ok(());
        }
        write!(f, "{}mm", known.join("×"))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Tag {
    Size(SizeValue),
    Weight(String),
    PlayTime(String),
    Color(String),
}

/// Discriminant of [`Tag`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Size,
    Weight,
    PlayTime,
    Color,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Size => "size",
            TagKind::Weight => "weight",
            TagKind::PlayTime => "play_time",
            TagKind::Color => "color",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Size(_) => TagKind::Size,
            Tag::Weight(_) => TagKind::Weight,
            Tag::PlayTime(_) => TagKind::PlayTime,
            Tag::Color(_) => TagKind::Color,
        }
    }

    /// Display text used in the tag strip.
    pub fn display_value(&self) -> String {
        match self {
            Tag::Size(size) => size.to_string(),
            Tag::Weight(v) | Tag::PlayTime(v) | Tag::Color(v) => v.clone(),
        }
    }
}

/// First tag of the given kind, if any.
pub fn find_tag(tags: &[Tag], kind: TagKind) -> Option<&Tag> {
    tags.iter().find(|tag| tag.kind() == kind)
}

/// Joins the display values of all tags in insertion order.
pub fn tag_line(tags: &[Tag], separator: &str) -> String {
    tags.iter()
        .map(Tag::display_value)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
