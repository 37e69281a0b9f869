//! # dynamem
//!
//! An in-memory, deterministic, transactional document store that
//! emulates a wide-column cloud key-value service: one composite-key
//! table (`PK`/`SK`) plus a bounded family of global secondary indexes
//! (`GSI2`..`GSI19`, full projection).
//!
//! Built as a test double: wire-compatible parameter and output field
//! names, byte-compatible validation messages, and deterministic
//! iteration order independent of insertion order, so snapshot-based
//! assertions are stable across runs.
//!
//! # Quick Start
//!
//! ```
//! use dynamem::{DocumentClient, EngineConfig};
//! use serde_json::json;
//!
//! fn main() -> dynamem::Result<()> {
//!     let config = EngineConfig::builder().table_name("main").build();
//!     let mut db = DocumentClient::from_config(&config)?;
//!
//!     db.put(json!({
//!         "TableName": "main",
//!         "Item": {"PK": "USER#1", "SK": "PROFILE", "name": "Alice"},
//!     }))?;
//!
//!     let out = db.query(json!({
//!         "TableName": "main",
//!         "KeyConditionExpression": "PK = :pk",
//!         "ExpressionAttributeValues": {":pk": "USER#1"},
//!     }))?;
//!     assert_eq!(out.count, 1);
//!     Ok(())
//! }
//! ```
//!
//! # Surface
//!
//! | Layer | Entry point | Purpose |
//! |-------|-------------|---------|
//! | Operations | [`DocumentClient`] | get, put, update, delete, query, scan, batchGet, batchWrite, transactWrite |
//! | Change tracking | [`TrackingClient`] | capture pre-images, roll a write sequence back to a snapshot |
//! | Configuration | [`EngineConfig`] | environment gate, table-name injection |
//!
//! # Concurrency
//!
//! The engine is single-threaded cooperative; operations are atomic from
//! the caller's viewpoint. Multi-threaded hosts must serialize access:
//! wrap the client in a [`SharedClient`].

pub use dynamem_core::{
    manifest, AttrValue, CancelReason, DocPath, EngineError, IndexName, Item, PathSegment,
    PrimaryKey, Result,
};
pub use dynamem_engine::{
    BatchGetOutput, DocumentClient, EngineConfig, EngineConfigBuilder, GetOutput, QueryOutput,
    TrackingClient, UpdateOutput,
};

use parking_lot::Mutex;
use std::sync::Arc;

/// A client handle shared across threads.
///
/// The engine's data structures are not internally synchronized; this
/// outer mutex serializes operations as the concurrency model requires.
pub type SharedClient = Arc<Mutex<DocumentClient>>;

/// Wrap a client for multi-threaded hosts.
pub fn shared(client: DocumentClient) -> SharedClient {
    Arc::new(Mutex::new(client))
}
