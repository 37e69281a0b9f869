//! Change tracker
//!
//! A mutation-recording wrapper around [`DocumentClient`]. While tracking
//! is enabled, every write captures the pre-image of each touched
//! (PK, SK). Capture happens once per key, so repeated mutations keep the original
//! pre-image. `rollback` restores every touched key to its captured
//! pre-image (or deletes it if it did not exist), using batched writes.
//!
//! Writes performed before `start_tracking` are not recorded and are
//! therefore not rolled back. Tracking/rollback cycles are independent.

use crate::ops::{BatchGetOutput, DocumentClient, GetOutput, QueryOutput, UpdateOutput};
use dynamem_core::{item_from_json, item_to_json, Item, PrimaryKey, Result};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

const ROLLBACK_BATCH_SIZE: usize = 25;

/// Pre-image journal: insertion-ordered, first capture per key wins.
#[derive(Debug, Default)]
struct Journal {
    entries: Vec<(PrimaryKey, Option<Item>)>,
    seen: BTreeSet<PrimaryKey>,
}

impl Journal {
    fn capture(&mut self, key: PrimaryKey, pre_image: Option<Item>) {
        if self.seen.insert(key.clone()) {
            self.entries.push((key, pre_image));
        }
    }
}

/// Document client wrapper that can roll back tracked writes.
pub struct TrackingClient {
    inner: DocumentClient,
    journal: Option<Journal>,
}

impl TrackingClient {
    pub fn new(inner: DocumentClient) -> Self {
        Self {
            inner,
            journal: None,
        }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &DocumentClient {
        &self.inner
    }

    pub fn snapshot(&self) -> std::collections::BTreeMap<String, Item> {
        self.inner.snapshot()
    }

    /// Begin a tracking cycle, discarding any prior journal.
    pub fn start_tracking(&mut self) {
        debug!("tracking enabled");
        self.journal = Some(Journal::default());
    }

    /// Whether a tracking cycle is active.
    pub fn is_tracking(&self) -> bool {
        self.journal.is_some()
    }

    /// Disable capture and restore every tracked key to its pre-image.
    pub fn rollback(&mut self) -> Result<()> {
        let Some(journal) = self.journal.take() else {
            return Ok(());
        };
        debug!(keys = journal.entries.len(), "rolling back tracked writes");
        let table = self.inner.table_name().to_string();
        for chunk in journal.entries.chunks(ROLLBACK_BATCH_SIZE) {
            let requests: Vec<Value> = chunk
                .iter()
                .map(|(key, pre_image)| match pre_image {
                    Some(item) => json!({
                        "PutRequest": {"Item": item_to_json(item.clone())}
                    }),
                    None => json!({
                        "DeleteRequest": {"Key": {"PK": key.pk, "SK": key.sk}}
                    }),
                })
                .collect();
            let mut tables = serde_json::Map::new();
            tables.insert(table.clone(), Value::Array(requests));
            let mut params = serde_json::Map::new();
            params.insert("RequestItems".to_string(), Value::Object(tables));
            self.inner.batch_write(Value::Object(params))?;
        }
        Ok(())
    }

    // ========== Forwarded reads ==========

    pub fn get(&self, params: Value) -> Result<GetOutput> {
        self.inner.get(params)
    }

    pub fn query(&self, params: Value) -> Result<QueryOutput> {
        self.inner.query(params)
    }

    pub fn scan(&self, params: Value) -> Result<QueryOutput> {
        self.inner.scan(params)
    }

    pub fn batch_get(&self, params: Value) -> Result<BatchGetOutput> {
        self.inner.batch_get(params)
    }

    // ========== Tracked writes ==========

    pub fn put(&mut self, params: Value) -> Result<()> {
        self.capture_item_key(params.get("Item"));
        self.inner.put(params)
    }

    pub fn update(&mut self, params: Value) -> Result<UpdateOutput> {
        self.capture_key_object(params.get("Key"));
        self.inner.update(params)
    }

    pub fn delete(&mut self, params: Value) -> Result<()> {
        self.capture_key_object(params.get("Key"));
        self.inner.delete(params)
    }

    pub fn batch_write(&mut self, params: Value) -> Result<()> {
        if self.journal.is_some() {
            if let Some(Value::Object(tables)) = params.get("RequestItems") {
                for requests in tables.values() {
                    let Value::Array(requests) = requests else {
                        continue;
                    };
                    for request in requests {
                        self.capture_item_key(
                            request.pointer("/PutRequest/Item"),
                        );
                        self.capture_key_object(
                            request.pointer("/DeleteRequest/Key"),
                        );
                    }
                }
            }
        }
        self.inner.batch_write(params)
    }

    pub fn transact_write(&mut self, params: Value) -> Result<()> {
        if self.journal.is_some() {
            if let Some(Value::Array(entries)) = params.get("TransactItems") {
                for entry in entries {
                    // ConditionCheck entries never mutate; skip them.
                    self.capture_item_key(entry.pointer("/Put/Item"));
                    self.capture_key_object(entry.pointer("/Update/Key"));
                    self.capture_key_object(entry.pointer("/Delete/Key"));
                }
            }
        }
        self.inner.transact_write(params)
    }

    /// Best-effort capture from a wire item object. Malformed shapes are
    /// left for the underlying operation to reject; it will not mutate.
    fn capture_item_key(&mut self, item: Option<&Value>) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let Some(item @ Value::Object(_)) = item else {
            return;
        };
        if let Ok(key) = PrimaryKey::from_item(&item_from_json(item.clone())) {
            let pre_image = self.inner.state_item(&key);
            journal.capture(key, pre_image);
        }
    }

    fn capture_key_object(&mut self, key: Option<&Value>) {
        self.capture_item_key(key);
    }
}

impl DocumentClient {
    /// Direct keyed read used by the change tracker's capture path.
    pub(crate) fn state_item(&self, key: &PrimaryKey) -> Option<Item> {
        self.state.get_cloned(key)
    }
}
