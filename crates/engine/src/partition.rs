//! Ordered partition map
//!
//! A treap from string entry-key to string item-key. The heap priority of
//! every node is content-derived (SHA-256 over the entry's identifying
//! tuple), so for a given set of entries the tree shape, and therefore
//! every traversal, is identical regardless of insertion order.
//!
//! ## Contract
//!
//! - Iteration in ascending or descending key order with optional
//!   lower/upper bounds; bounds prune whole subtrees.
//! - `len` is the logical entry count; re-inserting an existing entry key
//!   replaces the value without changing the count.

use sha2::{Digest, Sha256};

/// Iteration direction over a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// An iteration bound on the encoded entry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterBound {
    pub key: String,
    pub inclusive: bool,
}

impl IterBound {
    pub fn inclusive(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            inclusive: false,
        }
    }

    fn admits_from_below(&self, key: &str) -> bool {
        if self.inclusive {
            key >= self.key.as_str()
        } else {
            key > self.key.as_str()
        }
    }

    fn admits_from_above(&self, key: &str) -> bool {
        if self.inclusive {
            key <= self.key.as_str()
        } else {
            key < self.key.as_str()
        }
    }
}

/// Derive the stable priority of an index entry.
///
/// First 32 bits, big-endian, of SHA-256 over the identifying tuple joined
/// with NUL. Content-derived priorities are what make index shape a pure
/// function of index content.
pub fn stable_priority(index: &str, hash_key: &str, range_key: &str, item_key: &str) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(index.as_bytes());
    hasher.update([0u8]);
    hasher.update(hash_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(range_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(item_key.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Debug)]
struct Node {
    key: String,
    value: String,
    priority: u32,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(key: String, value: String, priority: u32) -> Box<Self> {
        Box::new(Node {
            key,
            value,
            priority,
            left: None,
            right: None,
        })
    }
}

/// Deterministic ordered map over one index partition.
#[derive(Debug, Default)]
pub struct PartitionMap {
    root: Option<Box<Node>>,
    len: usize,
}

impl PartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let mut node = &self.root;
        while let Some(n) = node {
            node = match key.cmp(n.key.as_str()) {
                std::cmp::Ordering::Less => &n.left,
                std::cmp::Ordering::Greater => &n.right,
                std::cmp::Ordering::Equal => return true,
            };
        }
        false
    }

    /// Insert an entry. Replaces the value (count unchanged) when the entry
    /// key already exists.
    pub fn insert(&mut self, key: String, value: String, priority: u32) {
        let (root, inserted) = Self::insert_node(self.root.take(), key, value, priority);
        self.root = Some(root);
        if inserted {
            self.len += 1;
        }
    }

    /// Remove an entry by key. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let (root, removed) = Self::remove_node(self.root.take(), key);
        self.root = root;
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Visit entries in `direction`, bounded below and above, until the
    /// visitor returns `false`.
    pub fn for_each(
        &self,
        direction: Direction,
        lower: Option<&IterBound>,
        upper: Option<&IterBound>,
        visit: &mut dyn FnMut(&str, &str) -> bool,
    ) {
        if let Some(root) = &self.root {
            Self::visit_node(root, direction, lower, upper, visit);
        }
    }

    /// Collect entries in `direction` within the bounds.
    pub fn range(
        &self,
        direction: Direction,
        lower: Option<&IterBound>,
        upper: Option<&IterBound>,
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.for_each(direction, lower, upper, &mut |k, v| {
            out.push((k.to_string(), v.to_string()));
            true
        });
        out
    }

    /// Pre-order key walk. Exposes the tree shape so tests can assert that
    /// structure is independent of insertion order.
    pub fn preorder_keys(&self) -> Vec<String> {
        fn walk(node: &Option<Box<Node>>, out: &mut Vec<String>) {
            if let Some(n) = node {
                out.push(n.key.clone());
                walk(&n.left, out);
                walk(&n.right, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    fn insert_node(
        node: Option<Box<Node>>,
        key: String,
        value: String,
        priority: u32,
    ) -> (Box<Node>, bool) {
        let Some(mut n) = node else {
            return (Node::new(key, value, priority), true);
        };
        match key.cmp(&n.key) {
            std::cmp::Ordering::Less => {
                let (child, inserted) = Self::insert_node(n.left.take(), key, value, priority);
                n.left = Some(child);
                if n.left.as_ref().expect("just set").priority > n.priority {
                    n = Self::rotate_right(n);
                }
                (n, inserted)
            }
            std::cmp::Ordering::Greater => {
                let (child, inserted) = Self::insert_node(n.right.take(), key, value, priority);
                n.right = Some(child);
                if n.right.as_ref().expect("just set").priority > n.priority {
                    n = Self::rotate_left(n);
                }
                (n, inserted)
            }
            std::cmp::Ordering::Equal => {
                n.value = value;
                (n, false)
            }
        }
    }

    fn remove_node(node: Option<Box<Node>>, key: &str) -> (Option<Box<Node>>, bool) {
        let Some(mut n) = node else {
            return (None, false);
        };
        match key.cmp(n.key.as_str()) {
            std::cmp::Ordering::Less => {
                let (child, removed) = Self::remove_node(n.left.take(), key);
                n.left = child;
                (Some(n), removed)
            }
            std::cmp::Ordering::Greater => {
                let (child, removed) = Self::remove_node(n.right.take(), key);
                n.right = child;
                (Some(n), removed)
            }
            std::cmp::Ordering::Equal => (Self::sink_and_drop(n), true),
        }
    }

    /// Rotate the target node down until it has at most one child, then
    /// splice it out.
    fn sink_and_drop(mut n: Box<Node>) -> Option<Box<Node>> {
        match (n.left.take(), n.right.take()) {
            (None, None) => None,
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (Some(l), Some(r)) => {
                if l.priority > r.priority {
                    // Left child rises; the target sinks into its right slot.
                    let mut new_root = l;
                    n.left = new_root.right.take();
                    n.right = Some(r);
                    new_root.right = Self::sink_and_drop(n);
                    Some(new_root)
                } else {
                    let mut new_root = r;
                    n.right = new_root.left.take();
                    n.left = Some(l);
                    new_root.left = Self::sink_and_drop(n);
                    Some(new_root)
                }
            }
        }
    }

    fn rotate_right(mut n: Box<Node>) -> Box<Node> {
        let mut l = n.left.take().expect("rotate_right requires a left child");
        n.left = l.right.take();
        l.right = Some(n);
        l
    }

    fn rotate_left(mut n: Box<Node>) -> Box<Node> {
        let mut r = n.right.take().expect("rotate_left requires a right child");
        n.right = r.left.take();
        r.left = Some(n);
        r
    }

    fn visit_node(
        n: &Node,
        direction: Direction,
        lower: Option<&IterBound>,
        upper: Option<&IterBound>,
        visit: &mut dyn FnMut(&str, &str) -> bool,
    ) -> bool {
        // Subtree pruning: left holds keys < n.key, right holds keys > n.key.
        let descend_left = lower.map_or(true, |b| b.key.as_str() < n.key.as_str());
        let descend_right = upper.map_or(true, |b| b.key.as_str() > n.key.as_str());
        let in_range = lower.map_or(true, |b| b.admits_from_below(&n.key))
            && upper.map_or(true, |b| b.admits_from_above(&n.key));

        let (first, second) = match direction {
            Direction::Forward => (
                descend_left.then_some(&n.left),
                descend_right.then_some(&n.right),
            ),
            Direction::Reverse => (
                descend_right.then_some(&n.right),
                descend_left.then_some(&n.left),
            ),
        };

        if let Some(Some(child)) = first {
            if !Self::visit_node(child, direction, lower, upper, visit) {
                return false;
            }
        }
        if in_range && !visit(&n.key, &n.value) {
            return false;
        }
        if let Some(Some(child)) = second {
            if !Self::visit_node(child, direction, lower, upper, visit) {
                return false;
            }
        }
        true
    }
}
