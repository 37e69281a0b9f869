//! Document paths
//!
//! A document path addresses a nested position inside an item: a sequence
//! of attribute steps separated by `.`, each optionally followed by `[N]`
//! list indices (`a.b[0].c`). The same path type is the target of both SET
//! and REMOVE update actions; only the leaf action differs.
//!
//! Resolution distinguishes *missing* (`None`) from stored null
//! (`AttrValue::Null`); condition semantics depend on that difference.

use crate::value::{AttrValue, Item};
use std::fmt;

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Descend into a map by attribute name
    Attr(String),
    /// Descend into a list by index
    Index(usize),
}

/// A parsed document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    segments: Vec<PathSegment>,
}

impl DocPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        debug_assert!(
            matches!(segments.first(), Some(PathSegment::Attr(_))),
            "paths start with an attribute step"
        );
        Self { segments }
    }

    /// Shorthand for a single top-level attribute.
    pub fn attr(name: impl Into<String>) -> Self {
        Self::new(vec![PathSegment::Attr(name.into())])
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The top-level attribute this path enters through.
    pub fn root(&self) -> &str {
        match &self.segments[0] {
            PathSegment::Attr(name) => name,
            PathSegment::Index(_) => unreachable!("paths start with an attribute step"),
        }
    }

    /// Whether this path is exactly one attribute deep.
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// Walk the item along this path.
    ///
    /// Returns `None` when any step is missing: the MISSING sentinel,
    /// distinct from a stored `AttrValue::Null`.
    pub fn resolve<'a>(&self, item: &'a Item) -> Option<&'a AttrValue> {
        let mut segments = self.segments.iter();
        let mut current = match segments.next()? {
            PathSegment::Attr(name) => item.get(name)?,
            PathSegment::Index(_) => return None,
        };
        for segment in segments {
            current = match (segment, current) {
                (PathSegment::Attr(name), AttrValue::Map(m)) => m.get(name)?,
                (PathSegment::Index(i), AttrValue::List(l)) => l.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Attr(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathSegment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}
