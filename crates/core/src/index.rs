//! Index catalog
//!
//! The table carries one primary index and a fixed family of global
//! secondary indexes `GSI2..GSI19`, each with full projection. `GSI1` is
//! recognized at the wire level but excluded from the in-memory engine by
//! policy (the manifest carries the exclusion; the operation surface
//! enforces it).

use crate::key::{PARTITION_KEY, SORT_KEY};
use std::fmt;

/// Lowest in-core GSI ordinal.
pub const GSI_MIN: u8 = 2;

/// Highest GSI ordinal.
pub const GSI_MAX: u8 = 19;

/// A named index of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexName {
    /// The primary index: hash `PK`, range `SK`
    Primary,
    /// A global secondary index: hash `GSI{n}PK`, range `GSI{n}SK`
    ///
    /// Ordinal 1 parses (the wire layer defines it) but is rejected by the
    /// operation surface; ordinals outside `1..=19` do not parse.
    Gsi(u8),
}

impl IndexName {
    /// Parse an index name (`"primary"`, `"GSI2"`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        if name == "primary" {
            return Some(IndexName::Primary);
        }
        let ordinal: u8 = name.strip_prefix("GSI")?.parse().ok()?;
        if (1..=GSI_MAX).contains(&ordinal) {
            Some(IndexName::Gsi(ordinal))
        } else {
            None
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, IndexName::Primary)
    }

    /// The index's hash-key attribute name.
    pub fn hash_attribute(&self) -> String {
        match self {
            IndexName::Primary => PARTITION_KEY.to_string(),
            IndexName::Gsi(n) => format!("GSI{n}PK"),
        }
    }

    /// The index's range-key attribute name.
    pub fn range_attribute(&self) -> String {
        match self {
            IndexName::Primary => SORT_KEY.to_string(),
            IndexName::Gsi(n) => format!("GSI{n}SK"),
        }
    }

    /// Every index the in-memory engine maintains: primary plus
    /// `GSI2..GSI19`.
    pub fn all() -> impl Iterator<Item = IndexName> {
        std::iter::once(IndexName::Primary).chain((GSI_MIN..=GSI_MAX).map(IndexName::Gsi))
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexName::Primary => write!(f, "primary"),
            IndexName::Gsi(n) => write!(f, "GSI{n}"),
        }
    }
}
