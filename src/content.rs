//! Content items and the content store boundary.

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::visibility::{ContentVisibility, RegionMode};

/// Publication status of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Visible to readers
    #[default]
    Published,
    /// Not yet published
    Draft,
    /// Awaiting review
    Pending,
    /// Removed
    Deleted,
}

/// A piece of gated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Item id
    pub id: u64,
    /// Publication status
    #[serde(default)]
    pub status: ContentStatus,
    /// Category id
    #[serde(default)]
    pub category_id: u32,
    /// Flagged as sensitive (hidden in safe mode)
    #[serde(default)]
    pub is_sensitive: bool,
    /// Visibility policy; `None` means unrestricted
    #[serde(default)]
    pub visibility: Option<ContentVisibility>,
}

impl ContentItem {
    /// Create a published, unrestricted item.
    pub fn new(id: u64, category_id: u32) -> Self {
        Self {
            id,
            status: ContentStatus::Published,
            category_id,
            is_sensitive: false,
            visibility: None,
        }
    }

    /// Set the visibility policy.
    pub fn with_visibility(mut self, visibility: ContentVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }

    /// Effective region mode.
    pub fn mode(&self) -> RegionMode {
        self.visibility.as_ref().map(|v| v.mode).unwrap_or_default()
    }
}

/// Predicate over content items used for filtered listing.
pub trait ContentPredicate {
    /// Whether `item` should be listed.
    fn matches(&self, item: &ContentItem) -> bool;
}

impl<F: Fn(&ContentItem) -> bool> ContentPredicate for F {
    fn matches(&self, item: &ContentItem) -> bool {
        self(item)
    }
}

/// ContentStore supplies content items.
pub trait ContentStore: Send + Sync {
    /// Fetch one item by id.
    fn get(&self, id: u64) -> Option<ContentItem>;

    /// List items accepted by `predicate`, ordered by id.
    fn list(&self, predicate: &dyn ContentPredicate) -> Vec<ContentItem>;
}

/// In-memory content store.
#[derive(Default)]
pub struct MemoryContentStore {
    items: RwLock<AHashMap<u64, ContentItem>>,
}

impl MemoryContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item.
    pub fn insert(&self, item: ContentItem) {
        self.items.write().insert(item.id, item);
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryContentStore {
    fn get(&self, id: u64) -> Option<ContentItem> {
        self.items.read().get(&id).cloned()
    }

    fn list(&self, predicate: &dyn ContentPredicate) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .items
            .read()
            .values()
            .filter(|item| predicate.matches(item))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }
}
