//! Category filtering over the accumulated gallery list.

use crate::{catalog::ALL_CATEGORY, models::item::Item};

/// Items whose variety equals `category`, or every item for the `all`
/// sentinel. Order is preserved.
pub fn filter_by_category(items: &[Item], category: &str) -> Vec<Item> {
    if category == ALL_CATEGORY {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| item.variety == category)
        .cloned()
        .collect()
}
