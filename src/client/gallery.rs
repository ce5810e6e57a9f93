//! Gallery pagination controller.
//!
//! Keeps the list of items fetched so far, page by page, in server sort
//! order. Category filtering is applied over that list only; the server
//! never sees the category, so `has_more` describes the unfiltered list.
//!
//! A full reload (start, sort change, retry) is not serialized against an
//! in-flight incremental fetch; whichever response lands last wins.

use super::{ItemSource, LOAD_FAILED, PageQuery, filter::filter_by_category};
use crate::{
    catalog::{ALL_CATEGORY, PAGE_SIZE, find_category},
    models::{
        item::Item,
        tag::{Tag, TagKind, find_tag, tag_line},
    },
    services::item_service::SortOrder,
};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and this many items were added.
    Loaded(usize),
    /// The trigger was ignored: nothing more to load or a fetch is running.
    Skipped,
    /// The fetch failed; see [`GallerySnapshot::error`].
    Failed,
}

/// What a masonry tile needs to render one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCard {
    pub id: String,
    pub title: String,
    /// Display name of the variety, or the raw key when it is not catalogued.
    pub variety_name: String,
    pub cover_url: String,
    /// Cover width over height, so the tile can reserve space before load.
    pub aspect_ratio: f64,
    pub weight: Option<String>,
    /// All tag values joined with ` · `.
    pub tag_line: String,
    pub likes: i64,
}

impl From<&Item> for ItemCard {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            variety_name: find_category(&item.variety)
                .map(|c| c.name.to_string())
                .unwrap_or_else(|| item.variety.clone()),
            cover_url: item.cover_image.url.clone(),
            aspect_ratio: item.cover_image.aspect_ratio(),
            weight: find_tag(&item.tags, TagKind::Weight).map(Tag::display_value),
            tag_line: tag_line(&item.tags, " · "),
            likes: item.likes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GallerySnapshot {
    pub items: Vec<Item>,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub has_more: bool,
    pub sort: SortOrder,
    pub category: String,
    pub error: Option<String>,
}

#[derive(Debug)]
struct FilterMemo {
    revision: u64,
    category: String,
    items: Vec<Item>,
}

#[derive(Debug)]
struct GalleryState {
    items: Vec<Item>,
    /// Bumped on every change to `items`.
    revision: u64,
    is_loading: bool,
    is_loading_more: bool,
    has_more: bool,
    sort: SortOrder,
    category: String,
    error: Option<String>,
    memo: Option<FilterMemo>,
}

impl GalleryState {
    fn replace_items(&mut self, items: Vec<Item>) {
        self.items = items;
        self.revision += 1;
    }
}

/// Clears the incremental-fetch guard on every exit path.
struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct GalleryController {
    source: Arc<dyn ItemSource>,
    page_size: usize,
    state: Mutex<GalleryState>,
    /// Set before an incremental request starts, so a second trigger that
    /// arrives before the state flags are visible is still rejected.
    fetching_more: AtomicBool,
}

impl GalleryController {
    pub fn new(source: Arc<dyn ItemSource>) -> Self {
        Self::with_page_size(source, PAGE_SIZE)
    }

    pub fn with_page_size(source: Arc<dyn ItemSource>, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            state: Mutex::new(GalleryState {
                items: Vec::new(),
                revision: 0,
                is_loading: false,
                is_loading_more: false,
                has_more: true,
                sort: SortOrder::default(),
                category: ALL_CATEGORY.to_string(),
                error: None,
                memo: None,
            }),
            fetching_more: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, GalleryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        let state = self.state();
        GallerySnapshot {
            items: state.items.clone(),
            is_loading: state.is_loading,
            is_loading_more: state.is_loading_more,
            has_more: state.has_more,
            sort: state.sort,
            category: state.category.clone(),
            error: state.error.clone(),
        }
    }

    /// Initial load.
    pub async fn start(&self) -> LoadOutcome {
        self.full_reload().await
    }

    /// Re-run the full reload after a failure.
    pub async fn retry(&self) -> LoadOutcome {
        self.full_reload().await
    }

    /// Drop everything accumulated and fetch the first page again.
    pub async fn full_reload(&self) -> LoadOutcome {
        let sort = {
            let mut state = self.state();
            state.replace_items(Vec::new());
            state.has_more = true;
            state.is_loading = true;
            state.error = None;
            state.sort
        };
        tracing::debug!(%sort, "gallery full reload");

        let result = self
            .source
            .fetch_page(PageQuery {
                limit: self.page_size,
                skip: 0,
                sort,
            })
            .await;

        let mut state = self.state();
        state.is_loading = false;
        match result {
            Ok(page) => {
                let added = page.data.len();
                state.has_more = added >= self.page_size;
                state.replace_items(page.data);
                LoadOutcome::Loaded(added)
            }
            Err(err) => {
                tracing::warn!(error = %err, "gallery reload failed");
                state.error = Some(error_message(&err.to_string()));
                LoadOutcome::Failed
            }
        }
    }

    /// Fetch the next page when the sentinel scrolls into view.
    pub async fn on_sentinel_visible(&self) -> LoadOutcome {
        self.load_more().await
    }

    /// Append the page starting at the current list length.
    pub async fn load_more(&self) -> LoadOutcome {
        {
            let state = self.state();
            if !state.has_more || state.is_loading {
                return LoadOutcome::Skipped;
            }
        }
        if self
            .fetching_more
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return LoadOutcome::Skipped;
        }
        let _guard = FetchGuard(&self.fetching_more);

        let query = {
            let mut state = self.state();
            state.is_loading_more = true;
            PageQuery {
                limit: self.page_size,
                skip: state.items.len(),
                sort: state.sort,
            }
        };
        tracing::debug!(skip = query.skip, "gallery loading more");

        let result = self.source.fetch_page(query).await;

        let mut state = self.state();
        state.is_loading_more = false;
        match result {
            Ok(page) => {
                let added = page.data.len();
                state.has_more = added >= self.page_size;
                state.items.extend(page.data);
                state.revision += 1;
                state.error = None;
                LoadOutcome::Loaded(added)
            }
            Err(err) => {
                tracing::warn!(error = %err, "gallery page fetch failed");
                state.error = Some(error_message(&err.to_string()));
                LoadOutcome::Failed
            }
        }
    }

    /// Change the server sort order; a change restarts from offset 0.
    pub async fn set_sort(&self, sort: SortOrder) -> Option<LoadOutcome> {
        {
            let mut state = self.state();
            if state.sort == sort {
                return None;
            }
            state.sort = sort;
        }
        Some(self.full_reload().await)
    }

    /// Select a category. Never touches the network.
    pub fn set_category(&self, category: impl Into<String>) {
        self.state().category = category.into();
    }

    /// Accumulated items in the selected category, memoized per list
    /// revision and category.
    pub fn visible_items(&self) -> Vec<Item> {
        let mut state = self.state();
        let state = &mut *state;
        if let Some(memo) = &state.memo
            && memo.revision == state.revision
            && memo.category == state.category
        {
            return memo.items.clone();
        }

        let items = filter_by_category(&state.items, &state.category);
        state.memo = Some(FilterMemo {
            revision: state.revision,
            category: state.category.clone(),
            items: items.clone(),
        });
        items
    }

    /// Tiles for the visible items, in list order.
    pub fn visible_cards(&self) -> Vec<ItemCard> {
        self.visible_items().iter().map(ItemCard::from).collect()
    }

    /// Reconcile a record saved by the upload form: replace it in place if
    /// it is already listed, otherwise put it first.
    pub fn apply_saved(&self, item: Item) {
        let mut state = self.state();
        match state.items.iter().position(|i| i.id == item.id) {
            Some(pos) => state.items[pos] = item,
            None => state.items.insert(0, item),
        }
        state.revision += 1;
    }

    /// Drop a deleted record from the list.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|i| i.id != id);
        let removed = state.items.len() != before;
        if removed {
            state.revision += 1;
        }
        removed
    }
}

fn error_message(raw: &str) -> String {
    if raw.trim().is_empty() {
        LOAD_FAILED.to_string()
    } else {
        raw.to_string()
    }
}
