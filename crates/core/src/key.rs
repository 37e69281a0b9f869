//! Primary keys and their canonical encodings
//!
//! Every item carries two mandatory string attributes: `PK` (partition key)
//! and `SK` (sort key). The pair uniquely identifies an item.
//!
//! ## Contract
//!
//! Two string encodings are load-bearing and frozen:
//!
//! - **Encoded item key**: `len(PK) + ":" + PK + NUL + len(SK) + ":" + SK`.
//!   Unique and comparable; length prefixes prevent collisions when keys
//!   contain the separator.
//! - **Encoded index entry key**: `range_value + NUL + encoded_item_key`.
//!   Lexicographic order of this string is the iteration order of every
//!   index partition.

use crate::error::{EngineError, Result};
use crate::value::{AttrValue, Item};
use std::fmt;

/// Name of the partition key attribute.
pub const PARTITION_KEY: &str = "PK";

/// Name of the sort key attribute.
pub const SORT_KEY: &str = "SK";

/// Separator inside encoded keys.
pub const KEY_SEPARATOR: char = '\u{0}';

/// A table primary key: the (PK, SK) pair.
///
/// Ordering is by `(pk, sk)`, which is the scan and snapshot order of the
/// authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimaryKey {
    pub pk: String,
    pub sk: String,
}

impl PrimaryKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Extract and validate the primary key of an item.
    ///
    /// Both `PK` and `SK` must be present, strings, and non-empty.
    pub fn from_item(item: &Item) -> Result<Self> {
        let pk = require_key_string(item, PARTITION_KEY)?;
        let sk = require_key_string(item, SORT_KEY)?;
        Ok(Self::new(pk, sk))
    }

    /// Canonical collision-free string encoding of this key.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}{}{}:{}",
            self.pk.len(),
            self.pk,
            KEY_SEPARATOR,
            self.sk.len(),
            self.sk
        )
    }

    /// Decode an encoded item key produced by [`PrimaryKey::encode`].
    ///
    /// Returns `None` on any shape mismatch.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (pk, rest) = decode_part(encoded)?;
        let rest = rest.strip_prefix(KEY_SEPARATOR)?;
        let (sk, rest) = decode_part(rest)?;
        if !rest.is_empty() {
            return None;
        }
        Some(Self::new(pk, sk))
    }

    /// Snapshot key: `PK + "__" + SK`.
    pub fn snapshot_key(&self) -> String {
        format!("{}__{}", self.pk, self.sk)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.pk, self.sk)
    }
}

/// Encode an index entry key: `range_value + NUL + encoded_item_key`.
pub fn encode_entry_key(range_value: &str, encoded_item_key: &str) -> String {
    format!("{}{}{}", range_value, KEY_SEPARATOR, encoded_item_key)
}

fn decode_part(s: &str) -> Option<(String, &str)> {
    let colon = s.find(':')?;
    let len: usize = s[..colon].parse().ok()?;
    let body_start = colon + 1;
    let body_end = body_start.checked_add(len)?;
    if body_end > s.len() || !s.is_char_boundary(body_end) {
        return None;
    }
    Some((s[body_start..body_end].to_string(), &s[body_end..]))
}

fn require_key_string(item: &Item, attr: &str) -> Result<String> {
    match item.get(attr) {
        Some(AttrValue::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(AttrValue::String(_)) => Err(EngineError::validation(format!(
            "One or more parameter values were invalid: The AttributeValue for a key attribute cannot contain an empty string value. Key: {attr}"
        ))),
        Some(other) => Err(EngineError::validation(format!(
            "One or more parameter values were invalid: Type mismatch for key {attr} expected: S actual: {}",
            other.type_code()
        ))),
        None => Err(EngineError::validation(format!(
            "One or more parameter values were invalid: Missing the key {attr} in the item"
        ))),
    }
}
