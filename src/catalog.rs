//! Static catalog configuration: categories, display options and paging.

use serde::Serialize;

/// Number of items requested per gallery page.
pub const PAGE_SIZE: usize = 12;

/// Id of the synthetic category that matches every item.
pub const ALL_CATEGORY: &str = "all";

/// Folder prefix for uploaded cover images.
pub const COVER_FOLDER: &str = "walnuts/covers";

/// Folder prefix for uploaded detail images.
pub const DETAIL_FOLDER: &str = "walnuts/details";

/// Suffix appended to the weight field when building a weight tag.
pub const WEIGHT_UNIT: &str = "g";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl Category {
    pub fn is_all(&self) -> bool {
        self.id == ALL_CATEGORY
    }
}

pub const CATEGORIES: &[Category] = &[
    Category {
        id: ALL_CATEGORY,
        name: "全部",
        description: "All walnuts in the collection",
    },
    Category {
        id: "lion-head",
        name: "狮子头",
        description: "Round, flat-bottomed walnuts with a thick rim",
    },
    Category {
        id: "official-hat",
        name: "官帽",
        description: "Broad shoulders resembling an official's hat",
    },
    Category {
        id: "chicken-heart",
        name: "鸡心",
        description: "Heart-shaped with a pointed tip",
    },
    Category {
        id: "tiger-head",
        name: "虎头",
        description: "Tall body with pronounced, sharp ridges",
    },
    Category {
        id: "buddha-head",
        name: "佛肚",
        description: "Full, rounded body with a wide belly",
    },
    Category {
        id: "other",
        name: "其他",
        description: "Other and mixed varieties",
    },
];

/// Categories a record can actually be filed under (everything but `all`).
pub fn selectable_categories() -> impl Iterator<Item = &'static Category> {
    CATEGORIES.iter().filter(|c| !c.is_all())
}

pub fn find_category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.id == id)
}

/// Variety a fresh upload form starts with.
pub fn default_variety() -> &'static str {
    selectable_categories()
        .next()
        .map(|c| c.id)
        .unwrap_or(ALL_CATEGORY)
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorOption {
    pub id: &'static str,
    pub name: &'static str,
}

pub const COLOR_OPTIONS: &[ColorOption] = &[
    ColorOption {
        id: "natural",
        name: "原色",
    },
    ColorOption {
        id: "yellow",
        name: "黄",
    },
    ColorOption {
        id: "red",
        name: "红",
    },
    ColorOption {
        id: "red_dark",
        name: "枣红",
    },
    ColorOption {
        id: "brown",
        name: "褐",
    },
];

/// Units offered for the play-time field, in display order.
pub const PLAY_TIME_UNITS: &[&str] = &["年", "月", "天"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sentinel_is_first_and_not_selectable() {
        assert!(CATEGORIES[0].is_all());
        assert!(selectable_categories().all(|c| !c.is_all()));
        assert_eq!(default_variety(), "lion-head");
    }

    #[test]
    fn category_ids_are_unique() {
        let mut ids: Vec<_> = CATEGORIES.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATEGORIES.len());
        assert_eq!(find_category("tiger-head").map(|c| c.name), Some("虎头"));
        assert!(find_category("walnut").is_none());
    }
}
