//! Table state
//!
//! The authoritative item store plus its index set. Items are deep-cloned
//! on both sides of the boundary: callers can never mutate stored state
//! through a returned item, and stored items never alias caller data.
//!
//! Index membership is maintained synchronously with every mutation.

use crate::index_set::IndexSet;
use dynamem_core::{Item, PrimaryKey, Result};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Authoritative table store.
#[derive(Debug, Default)]
pub struct TableState {
    items: BTreeMap<PrimaryKey, Item>,
    indexes: IndexSet,
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Deep copy of the item at `key`, if present.
    pub fn get_cloned(&self, key: &PrimaryKey) -> Option<Item> {
        self.items.get(key).cloned()
    }

    /// Resolve an index candidate (an encoded item key) to the stored item.
    pub fn get_by_encoded(&self, encoded: &str) -> Option<(&PrimaryKey, &Item)> {
        let key = PrimaryKey::decode(encoded)?;
        self.items.get_key_value(&key)
    }

    /// Store an item, replacing any existing item at the same key.
    ///
    /// Validates the primary key shape; existing index entries are removed
    /// before the replacement is registered.
    pub fn put(&mut self, item: Item) -> Result<()> {
        let key = PrimaryKey::from_item(&item)?;
        let encoded = key.encode();
        if let Some(existing) = self.items.get(&key) {
            self.indexes.remove(&encoded, existing);
        }
        self.indexes.add(&encoded, &item);
        self.items.insert(key, item);
        Ok(())
    }

    /// Remove the item at `key`, returning the prior item.
    pub fn delete(&mut self, key: &PrimaryKey) -> Option<Item> {
        let removed = self.items.remove(key)?;
        self.indexes.remove(&key.encode(), &removed);
        Some(removed)
    }

    /// Iterate items in ascending (PK, SK) order, strictly after
    /// `exclusive_start` when given.
    pub fn scan_from<'a>(
        &'a self,
        exclusive_start: Option<&PrimaryKey>,
    ) -> impl Iterator<Item = (&'a PrimaryKey, &'a Item)> {
        let lower = match exclusive_start {
            Some(start) => Bound::Excluded(start.clone()),
            None => Bound::Unbounded,
        };
        self.items.range((lower, Bound::Unbounded))
    }

    /// The index set, for query candidate iteration.
    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    /// Deterministic map from `PK + "__" + SK` to a deep item clone.
    pub fn snapshot(&self) -> BTreeMap<String, Item> {
        self.items
            .iter()
            .map(|(key, item)| (key.snapshot_key(), item.clone()))
            .collect()
    }

    /// Empty the store and every index.
    pub fn clear(&mut self) {
        self.items.clear();
        self.indexes.clear();
    }
}
