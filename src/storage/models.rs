use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One watched item's user-facing state. `status` holds the rendered
/// classification string; `last_checked` is bumped whenever the scheduler
/// touches the item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedItem {
    pub display_name: String,
    pub status: String,
    pub last_checked: Option<DateTime<Utc>>,
}

impl WatchedItem {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            status: "Not Checked".to_string(),
            last_checked: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// The user's watchlist, keyed by normalized item key. Persisted and loaded
/// as one JSON blob; serializes as a plain object so the HTTP surface can
/// hand it through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Watchlist {
    items: HashMap<String, WatchedItem>,
}

impl Watchlist {
    /// Idempotent: adding an already-present key changes nothing.
    pub fn add(&mut self, item_key: &str, display_name: &str) -> AddOutcome {
        if self.items.contains_key(item_key) {
            return AddOutcome::AlreadyPresent;
        }
        self.items
            .insert(item_key.to_string(), WatchedItem::new(display_name));
        AddOutcome::Added
    }

    /// Removing a key that is not present is a no-op; returns whether an
    /// entry was actually removed.
    pub fn remove(&mut self, item_key: &str) -> bool {
        self.items.remove(item_key).is_some()
    }

    pub fn get(&self, item_key: &str) -> Option<&WatchedItem> {
        self.items.get(item_key)
    }

    pub fn get_mut(&mut self, item_key: &str) -> Option<&mut WatchedItem> {
        self.items.get_mut(item_key)
    }

    /// Item keys in a stable (sorted) order, used for cycle snapshots.
    pub fn item_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &WatchedItem)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
