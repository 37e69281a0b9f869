//! Index set
//!
//! Maintains, per named index, a mapping from hash-key value to an ordered
//! partition map. Membership is derived purely from item content: an item
//! participates in an index exactly when both of that index's key
//! attributes are present as strings.
//!
//! ## Invariant
//!
//! For every stored item, every index whose hash/range attributes are
//! strings on the item holds exactly one entry pointing at the item's
//! primary-key encoding; no index holds a stale entry after update or
//! delete.

use crate::partition::{stable_priority, Direction, IterBound, PartitionMap};
use dynamem_core::{encode_entry_key, AttrValue, IndexName, Item};
use std::collections::BTreeMap;

/// Continuation point inside a partition: the last-read entry.
#[derive(Debug, Clone)]
pub struct ExclusiveStart {
    pub range_value: String,
    pub item_key: String,
}

/// Per-index partition registry.
#[derive(Debug, Default)]
pub struct IndexSet {
    maps: BTreeMap<IndexName, BTreeMap<String, PartitionMap>>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item under every index it participates in.
    pub fn add(&mut self, item_key: &str, item: &Item) {
        for index in IndexName::all() {
            let Some((hash, range)) = index_keys_of(index, item) else {
                continue;
            };
            let priority = stable_priority(&index.to_string(), hash, range, item_key);
            let entry_key = encode_entry_key(range, item_key);
            self.maps
                .entry(index)
                .or_default()
                .entry(hash.to_string())
                .or_default()
                .insert(entry_key, item_key.to_string(), priority);
        }
    }

    /// Remove an item's entries; drops empty partitions.
    pub fn remove(&mut self, item_key: &str, item: &Item) {
        for index in IndexName::all() {
            let Some((hash, range)) = index_keys_of(index, item) else {
                continue;
            };
            let Some(partitions) = self.maps.get_mut(&index) else {
                continue;
            };
            if let Some(partition) = partitions.get_mut(hash) {
                partition.remove(&encode_entry_key(range, item_key));
                if partition.is_empty() {
                    partitions.remove(hash);
                }
            }
            if partitions.is_empty() {
                self.maps.remove(&index);
            }
        }
    }

    /// Look up one partition.
    pub fn partition(&self, index: IndexName, hash: &str) -> Option<&PartitionMap> {
        self.maps.get(&index)?.get(hash)
    }

    /// Total entry count of one index (tests and diagnostics).
    pub fn index_len(&self, index: IndexName) -> usize {
        self.maps
            .get(&index)
            .map(|partitions| partitions.values().map(PartitionMap::len).sum())
            .unwrap_or(0)
    }

    /// Visit candidate item keys from `index`'s `hash` partition in order.
    ///
    /// `lower`/`upper` bound the encoded entry key (derived from a range
    /// condition by the caller). `exclusive_start` skips entries at or
    /// before (after, in reverse) the given continuation point.
    pub fn iterate_candidates(
        &self,
        index: IndexName,
        hash: &str,
        lower: Option<IterBound>,
        upper: Option<IterBound>,
        direction: Direction,
        exclusive_start: Option<&ExclusiveStart>,
        visit: &mut dyn FnMut(&str) -> bool,
    ) {
        let Some(partition) = self.partition(index, hash) else {
            return;
        };

        let mut lower = lower;
        let mut upper = upper;
        if let Some(start) = exclusive_start {
            let resume = IterBound::exclusive(encode_entry_key(&start.range_value, &start.item_key));
            match direction {
                Direction::Forward => lower = Some(tighten_lower(lower, resume)),
                Direction::Reverse => upper = Some(tighten_upper(upper, resume)),
            }
        }

        partition.for_each(direction, lower.as_ref(), upper.as_ref(), &mut |_, item_key| {
            visit(item_key)
        });
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }
}

/// The (hash, range) string pair of an item under an index, when the item
/// participates in it.
pub fn index_keys_of(index: IndexName, item: &Item) -> Option<(&str, &str)> {
    let hash = match item.get(&index.hash_attribute()) {
        Some(AttrValue::String(s)) => s.as_str(),
        _ => return None,
    };
    let range = match item.get(&index.range_attribute()) {
        Some(AttrValue::String(s)) => s.as_str(),
        _ => return None,
    };
    Some((hash, range))
}

fn tighten_lower(current: Option<IterBound>, candidate: IterBound) -> IterBound {
    match current {
        None => candidate,
        Some(current) => match candidate.key.cmp(&current.key) {
            std::cmp::Ordering::Greater => candidate,
            std::cmp::Ordering::Less => current,
            std::cmp::Ordering::Equal => {
                if current.inclusive {
                    candidate
                } else {
                    current
                }
            }
        },
    }
}

fn tighten_upper(current: Option<IterBound>, candidate: IterBound) -> IterBound {
    match current {
        None => candidate,
        Some(current) => match candidate.key.cmp(&current.key) {
            std::cmp::Ordering::Less => candidate,
            std::cmp::Ordering::Greater => current,
            std::cmp::Ordering::Equal => {
                if current.inclusive {
                    candidate
                } else {
                    current
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamem_core::{item_from_json, PrimaryKey};
    use serde_json::json;

    fn item(pk: &str, sk: &str, extra: serde_json::Value) -> (String, Item) {
        let mut it = item_from_json(extra);
        it.insert("PK".into(), AttrValue::from(pk));
        it.insert("SK".into(), AttrValue::from(sk));
        let key = PrimaryKey::from_item(&it).unwrap().encode();
        (key, it)
    }

    fn collect(
        set: &IndexSet,
        index: IndexName,
        hash: &str,
        direction: Direction,
    ) -> Vec<String> {
        let mut out = Vec::new();
        set.iterate_candidates(index, hash, None, None, direction, None, &mut |k| {
            out.push(k.to_string());
            true
        });
        out
    }

    #[test]
    fn test_add_registers_primary_and_matching_gsis() {
        let mut set = IndexSet::new();
        let (key, it) = item(
            "USER#1",
            "PROFILE",
            json!({"GSI2PK": "E#a@e.com", "GSI2SK": "PROFILE"}),
        );
        set.add(&key, &it);

        assert_eq!(set.index_len(IndexName::Primary), 1);
        assert_eq!(set.index_len(IndexName::Gsi(2)), 1);
        assert_eq!(set.index_len(IndexName::Gsi(3)), 0);
    }

    #[test]
    fn test_non_string_gsi_keys_are_skipped() {
        let mut set = IndexSet::new();
        let (key, it) = item(
            "USER#1",
            "PROFILE",
            json!({"GSI2PK": 42, "GSI2SK": "x", "GSI3PK": "only-half"}),
        );
        set.add(&key, &it);
        assert_eq!(set.index_len(IndexName::Gsi(2)), 0);
        assert_eq!(set.index_len(IndexName::Gsi(3)), 0);
    }

    #[test]
    fn test_remove_drops_empty_partitions() {
        let mut set = IndexSet::new();
        let (key, it) = item("USER#1", "A", json!({}));
        set.add(&key, &it);
        assert!(set.partition(IndexName::Primary, "USER#1").is_some());

        set.remove(&key, &it);
        assert!(set.partition(IndexName::Primary, "USER#1").is_none());
        assert_eq!(set.index_len(IndexName::Primary), 0);
    }

    #[test]
    fn test_iteration_order_by_range_then_item_key() {
        let mut set = IndexSet::new();
        // Two items sharing a GSI2 range value; item key breaks the tie.
        for (pk, sk) in [("B", "1"), ("A", "1")] {
            let (key, it) = item(pk, sk, json!({"GSI2PK": "H", "GSI2SK": "same"}));
            set.add(&key, &it);
        }
        let keys = collect(&set, IndexName::Gsi(2), "H", Direction::Forward);
        assert_eq!(keys.len(), 2);
        assert!(keys[0].contains("A"));
        assert!(keys[1].contains("B"));
    }

    #[test]
    fn test_reverse_is_mirror() {
        let mut set = IndexSet::new();
        for sk in ["a", "b", "c"] {
            let (key, it) = item("P", sk, json!({}));
            set.add(&key, &it);
        }
        let fwd = collect(&set, IndexName::Primary, "P", Direction::Forward);
        let mut rev = collect(&set, IndexName::Primary, "P", Direction::Reverse);
        rev.reverse();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn test_exclusive_start_skips_forward() {
        let mut set = IndexSet::new();
        let mut encoded = Vec::new();
        for sk in ["a", "b", "c", "d"] {
            let (key, it) = item("P", sk, json!({}));
            encoded.push(key.clone());
            set.add(&key, &it);
        }
        let start = ExclusiveStart {
            range_value: "b".into(),
            item_key: encoded[1].clone(),
        };
        let mut out = Vec::new();
        set.iterate_candidates(
            IndexName::Primary,
            "P",
            None,
            None,
            Direction::Forward,
            Some(&start),
            &mut |k| {
                out.push(k.to_string());
                true
            },
        );
        assert_eq!(out, vec![encoded[2].clone(), encoded[3].clone()]);
    }

    #[test]
    fn test_exclusive_start_skips_reverse() {
        let mut set = IndexSet::new();
        let mut encoded = Vec::new();
        for sk in ["a", "b", "c"] {
            let (key, it) = item("P", sk, json!({}));
            encoded.push(key.clone());
            set.add(&key, &it);
        }
        let start = ExclusiveStart {
            range_value: "b".into(),
            item_key: encoded[1].clone(),
        };
        let mut out = Vec::new();
        set.iterate_candidates(
            IndexName::Primary,
            "P",
            None,
            None,
            Direction::Reverse,
            Some(&start),
            &mut |k| {
                out.push(k.to_string());
                true
            },
        );
        assert_eq!(out, vec![encoded[0].clone()]);
    }

    #[test]
    fn test_update_leaves_no_stale_entries() {
        let mut set = IndexSet::new();
        let (key, old) = item("P", "s", json!({"GSI2PK": "H", "GSI2SK": "old"}));
        set.add(&key, &old);

        // Re-add under a changed GSI2SK, the way table state does on put.
        set.remove(&key, &old);
        let (_, new) = item("P", "s", json!({"GSI2PK": "H", "GSI2SK": "new"}));
        set.add(&key, &new);

        assert_eq!(set.index_len(IndexName::Gsi(2)), 1);
        let keys = collect(&set, IndexName::Gsi(2), "H", Direction::Forward);
        assert_eq!(keys, vec![key]);
    }
}
