//! Core types for dynamem
//!
//! This crate defines the data model shared by every layer of the engine:
//!
//! - [`AttrValue`] / [`Item`]: the tagged attribute value model
//! - [`PrimaryKey`]: the (PK, SK) pair and its canonical encodings
//! - [`DocPath`]: document paths for expressions and updates
//! - [`EngineError`]: the unified error surface
//! - [`IndexName`]: the primary + GSI2..GSI19 index catalog
//! - [`manifest`]: the declarative supported/unsupported surface
//!
//! The engine crate (`dynamem-engine`) builds the ordered indexes, the
//! expression language, and the operation surface on top of these types.

pub mod error;
pub mod index;
pub mod key;
pub mod manifest;
pub mod path;
pub mod value;

pub use error::{CancelReason, EngineError, Result};
pub use index::IndexName;
pub use key::{encode_entry_key, PrimaryKey, KEY_SEPARATOR, PARTITION_KEY, SORT_KEY};
pub use path::{DocPath, PathSegment};
pub use value::{format_number, item_from_json, item_to_json, AttrValue, Item};
