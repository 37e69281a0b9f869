//! Transact-write
//!
//! All-or-nothing multi-operation writes. Entries are collected and
//! validated up front, then applied in order; every mutating entry
//! records the prior item in an insertion-ordered journal. Any failure
//! during the apply phase replays the journal in reverse and surfaces a
//! `TransactionCanceled` error carrying the per-entry reasons mirror.
//!
//! Lifecycle: `Collecting → Applying → Committed`, or on failure
//! `Applying → RollingBack → Aborted`.

use crate::expr::condition::CondExpr;
use crate::expr::update::UpdateExpression;
use crate::expr::{parse_condition, parse_update};
use crate::ops::{check_condition, expr_context, DocumentClient};
use dynamem_core::error::MSG_TRANSACTION_DUPLICATE_ITEM;
use dynamem_core::{
    item_from_json, AttrValue, CancelReason, EngineError, Item, PrimaryKey, Result, PARTITION_KEY,
    SORT_KEY,
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

const MAX_TRANSACT_ITEMS: usize = 100;

/// Transaction processor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Collecting,
    Applying,
    Committed,
    RollingBack,
    Aborted,
}

/// One collected transact-write entry.
#[derive(Debug)]
enum TransactItem {
    Put {
        key: PrimaryKey,
        item: Item,
        condition: Option<CondExpr>,
    },
    Update {
        key: PrimaryKey,
        update: UpdateExpression,
        condition: Option<CondExpr>,
    },
    Delete {
        key: PrimaryKey,
        condition: Option<CondExpr>,
    },
    ConditionCheck {
        key: PrimaryKey,
        condition: CondExpr,
    },
}

impl TransactItem {
    fn key(&self) -> &PrimaryKey {
        match self {
            TransactItem::Put { key, .. }
            | TransactItem::Update { key, .. }
            | TransactItem::Delete { key, .. }
            | TransactItem::ConditionCheck { key, .. } => key,
        }
    }
}

impl DocumentClient {
    /// Apply a transact-write request atomically.
    pub fn transact_write(&mut self, params: Value) -> Result<()> {
        let params = self.validated("transactWrite", params)?;
        let entries = self.collect_entries(&params)?;
        let mut txn = TransactionProcessor::new(self);
        txn.apply(entries)
    }

    /// Collecting phase: parse and validate every entry before anything
    /// mutates. Failures here propagate directly; no rollback is needed.
    fn collect_entries(&self, params: &Map<String, Value>) -> Result<Vec<TransactItem>> {
        let Some(Value::Array(raw_entries)) = params.get("TransactItems") else {
            return Err(EngineError::validation(
                "The parameter 'TransactItems' is required and must be a list",
            ));
        };
        if raw_entries.is_empty() {
            return Err(EngineError::validation(
                "1 validation error detected: Value at 'transactItems' failed to satisfy constraint: Member must have length greater than or equal to 1",
            ));
        }
        if raw_entries.len() > MAX_TRANSACT_ITEMS {
            return Err(EngineError::validation(
                "1 validation error detected: Value at 'transactItems' failed to satisfy constraint: Member must have length less than or equal to 100",
            ));
        }

        let mut entries = Vec::with_capacity(raw_entries.len());
        let mut touched: BTreeSet<PrimaryKey> = BTreeSet::new();
        for raw in raw_entries {
            let entry = self.collect_entry(raw)?;
            if !touched.insert(entry.key().clone()) {
                return Err(EngineError::validation(MSG_TRANSACTION_DUPLICATE_ITEM));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    fn collect_entry(&self, raw: &Value) -> Result<TransactItem> {
        let Value::Object(entry) = raw else {
            return Err(invalid_entry());
        };
        if entry.len() != 1 {
            return Err(invalid_entry());
        }
        let (kind, body) = entry.iter().next().expect("len checked");
        let Value::Object(body) = body else {
            return Err(invalid_entry());
        };
        self.check_table_name(body.get("TableName").unwrap_or(&Value::Null))?;

        let condition = parse_entry_condition(body)?;
        match kind.as_str() {
            "Put" => {
                check_entry_params(kind, body, &["Item"], &["TableName", "Item"])?;
                let item = match body.get("Item") {
                    Some(item @ Value::Object(_)) => item_from_json(item.clone()),
                    _ => return Err(invalid_entry()),
                };
                let key = PrimaryKey::from_item(&item)?;
                Ok(TransactItem::Put {
                    key,
                    item,
                    condition,
                })
            }
            "Update" => {
                check_entry_params(
                    kind,
                    body,
                    &["Key", "UpdateExpression"],
                    &["TableName", "Key", "UpdateExpression"],
                )?;
                let key = entry_key(body)?;
                let Some(Value::String(expression)) = body.get("UpdateExpression") else {
                    return Err(EngineError::validation(
                        "Invalid UpdateExpression: The expression can not be empty;",
                    ));
                };
                let ctx = expr_context(body)?;
                let update =
                    parse_update(expression, &ctx).map_err(EngineError::into_validation)?;
                Ok(TransactItem::Update {
                    key,
                    update,
                    condition,
                })
            }
            "Delete" => {
                check_entry_params(kind, body, &["Key"], &["TableName", "Key"])?;
                Ok(TransactItem::Delete {
                    key: entry_key(body)?,
                    condition,
                })
            }
            "ConditionCheck" => {
                check_entry_params(kind, body, &["Key"], &["TableName", "Key"])?;
                let Some(condition) = condition else {
                    return Err(EngineError::validation(
                        "ConditionCheck entries require a ConditionExpression",
                    ));
                };
                Ok(TransactItem::ConditionCheck {
                    key: entry_key(body)?,
                    condition,
                })
            }
            _ => Err(invalid_entry()),
        }
    }
}

fn invalid_entry() -> EngineError {
    EngineError::validation(
        "Invalid request in TransactItems: each entry must be a Put, Update, Delete, or ConditionCheck",
    )
}

fn entry_key(body: &Map<String, Value>) -> Result<PrimaryKey> {
    match body.get("Key") {
        Some(Value::Object(key)) => crate::ops::key_from_object(key),
        _ => Err(EngineError::validation(
            "The parameter 'Key' is required and must be an object",
        )),
    }
}

fn parse_entry_condition(body: &Map<String, Value>) -> Result<Option<CondExpr>> {
    let Some(value) = body.get("ConditionExpression") else {
        return Ok(None);
    };
    let Value::String(expression) = value else {
        return Err(EngineError::validation(
            "ConditionExpression must be a string",
        ));
    };
    let ctx = expr_context(body)?;
    parse_condition(expression, &ctx)
        .map(Some)
        .map_err(EngineError::into_validation)
}

fn check_entry_params(
    kind: &str,
    body: &Map<String, Value>,
    own: &[&str],
    required: &[&str],
) -> Result<()> {
    const COMMON: &[&str] = &[
        "TableName",
        "ConditionExpression",
        "ExpressionAttributeNames",
        "ExpressionAttributeValues",
    ];
    for param in body.keys() {
        if !COMMON.contains(&param.as_str()) && !own.contains(&param.as_str()) {
            return Err(EngineError::not_supported(
                "transactWrite",
                format!("transactWrite.{kind}.{param}"),
                format!("parameter {param} is not emulated"),
            ));
        }
    }
    for param in required {
        if !body.contains_key(*param) {
            return Err(EngineError::validation(format!(
                "The parameter '{param}' is required for {kind} entries",
            )));
        }
    }
    Ok(())
}

/// Applies collected entries against the client, journaling pre-images.
struct TransactionProcessor<'a> {
    client: &'a mut DocumentClient,
    journal: Vec<(PrimaryKey, Option<Item>)>,
    state: TxnState,
}

impl<'a> TransactionProcessor<'a> {
    fn new(client: &'a mut DocumentClient) -> Self {
        Self {
            client,
            journal: Vec::new(),
            state: TxnState::Collecting,
        }
    }

    fn apply(&mut self, entries: Vec<TransactItem>) -> Result<()> {
        self.state = TxnState::Applying;
        debug!(entries = entries.len(), "applying transaction");

        for (position, entry) in entries.iter().enumerate() {
            if let Err(error) = self.apply_entry(entry) {
                self.roll_back();
                return Err(cancellation(error, position, entries.len()));
            }
        }

        self.state = TxnState::Committed;
        debug!(state = ?self.state, "transaction committed");
        Ok(())
    }

    fn apply_entry(&mut self, entry: &TransactItem) -> Result<()> {
        match entry {
            TransactItem::Put {
                key,
                item,
                condition,
            } => {
                let current = self.client.state.get_cloned(key);
                check_condition(condition.as_ref(), current.as_ref())?;
                self.journal.push((key.clone(), current));
                self.client.state.put(item.clone())
            }
            TransactItem::Update {
                key,
                update,
                condition,
            } => {
                let current = self.client.state.get_cloned(key);
                check_condition(condition.as_ref(), current.as_ref())?;
                let mut item = current.clone().unwrap_or_else(|| {
                    let mut base = Item::new();
                    base.insert(PARTITION_KEY.into(), AttrValue::String(key.pk.clone()));
                    base.insert(SORT_KEY.into(), AttrValue::String(key.sk.clone()));
                    base
                });
                update.apply_to(&mut item)?;
                self.journal.push((key.clone(), current));
                self.client.state.put(item)
            }
            TransactItem::Delete { key, condition } => {
                let current = self.client.state.get_cloned(key);
                check_condition(condition.as_ref(), current.as_ref())?;
                self.journal.push((key.clone(), current));
                self.client.state.delete(key);
                Ok(())
            }
            TransactItem::ConditionCheck { key, condition } => {
                let current = self.client.state.get_cloned(key);
                check_condition(Some(condition), current.as_ref())
            }
        }
    }

    /// Replay the journal in reverse insertion order, restoring each
    /// pre-image (or deleting keys that did not exist).
    fn roll_back(&mut self) {
        self.state = TxnState::RollingBack;
        debug!(journal = self.journal.len(), "rolling back transaction");
        for (key, prior) in self.journal.drain(..).rev() {
            match prior {
                Some(item) => {
                    if let Err(error) = self.client.state.put(item) {
                        tracing::warn!(%key, %error, "failed to restore pre-image");
                    }
                }
                None => {
                    self.client.state.delete(&key);
                }
            }
        }
        self.state = TxnState::Aborted;
        debug!(state = ?self.state, "transaction aborted");
    }
}

/// Map an apply-phase failure to the canceled-transaction error surface.
///
/// - A failed condition yields the per-entry reasons mirror.
/// - A key-attribute violation collapses to `[ValidationError]`.
/// - Other validation errors propagate as themselves (state is already
///   rolled back).
fn cancellation(error: EngineError, position: usize, total: usize) -> EngineError {
    match error {
        EngineError::ConditionalCheckFailed => {
            let mut reasons = vec![CancelReason::None; total];
            reasons[position] = CancelReason::ConditionalCheckFailed;
            EngineError::transaction_canceled(reasons)
        }
        EngineError::KeyAttributeViolation { .. } => {
            EngineError::transaction_canceled(vec![CancelReason::ValidationError])
        }
        other => other.into_validation(),
    }
}
