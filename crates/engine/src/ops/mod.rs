//! Operation surface
//!
//! [`DocumentClient`] exposes the emulated method set against one table.
//! Methods take wire-shaped JSON parameter objects (the field names
//! `TableName`, `Key`, `Item`, `KeyConditionExpression`, ... interchange
//! with a wire-compatible hosted service) and return typed outputs that
//! serialize back to the wire shape.
//!
//! Every method begins with manifest parameter validation, then
//! extracts and checks the table name. Expression-level `NotSupported`
//! errors are rewritten into `Validation` before they reach the caller;
//! manifest-level `NotSupported` errors pass through unchanged.

mod batch;
mod query;
mod transact;

pub use query::QueryOutput;

use crate::config::EngineConfig;
use crate::expr::condition::CondExpr;
use crate::expr::{parse_condition, ExprContext};
use crate::table::TableState;
use dynamem_core::{
    item_from_json, AttrValue, EngineError, Item, PrimaryKey, Result, PARTITION_KEY, SORT_KEY,
};
use dynamem_core::manifest;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Wire-shaped parameter object.
pub type Params = Map<String, Value>;

/// Output of `get`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetOutput {
    #[serde(rename = "Item", skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

/// Output of `update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutput {
    #[serde(rename = "Attributes", skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
}

/// Output of `batchGet`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchGetOutput {
    #[serde(rename = "Responses")]
    pub responses: BTreeMap<String, Vec<Item>>,
}

/// In-memory document client over a single table.
#[derive(Debug)]
pub struct DocumentClient {
    pub(crate) state: TableState,
    pub(crate) table_name: String,
}

impl DocumentClient {
    /// Create a client with the given table name.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            state: TableState::new(),
            table_name: table_name.into(),
        }
    }

    /// Create a client from an engine config.
    ///
    /// The in-memory engine only instantiates in the `test` environment.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.check_in_memory_allowed()?;
        Ok(Self::new(config.table_name.clone()))
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Inject the table name post-construction.
    pub fn set_table_name(&mut self, name: impl Into<String>) {
        self.table_name = name.into();
    }

    /// Deterministic `"PK__SK"` → item snapshot of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, Item> {
        self.state.snapshot()
    }

    /// Drop every item and index entry.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Number of stored items.
    pub fn item_count(&self) -> usize {
        self.state.len()
    }

    // ========== Single-item operations ==========

    /// Read one item by primary key.
    pub fn get(&self, params: Value) -> Result<GetOutput> {
        let params = self.validated("get", params)?;
        let key = extract_key(&params, "Key")?;
        check_bool_param(&params, "ConsistentRead")?;
        Ok(GetOutput {
            item: self.state.get_cloned(&key),
        })
    }

    /// Store an item, overwriting any existing item at its key.
    pub fn put(&mut self, params: Value) -> Result<()> {
        let params = self.validated("put", params)?;
        let item = extract_item(&params, "Item")?;
        let key = PrimaryKey::from_item(&item)?;
        let condition = parse_optional_condition(&params)?;
        check_condition(condition.as_ref(), self.state.get_cloned(&key).as_ref())?;
        self.state.put(item)
    }

    /// Apply an update expression, creating the item if absent (upsert).
    pub fn update(&mut self, params: Value) -> Result<UpdateOutput> {
        let params = self.validated("update", params)?;
        let key = extract_key(&params, "Key")?;
        let return_values = extract_return_values(&params)?;

        let expression = match params.get("UpdateExpression") {
            Some(Value::String(s)) => s.clone(),
            Some(_) | None => {
                return Err(EngineError::validation(
                    "Invalid UpdateExpression: The expression can not be empty;",
                ))
            }
        };
        let ctx = expr_context(&params)?;
        let update = crate::expr::parse_update(&expression, &ctx)
            .map_err(EngineError::into_validation)?;

        let condition = parse_optional_condition(&params)?;
        let current = self.state.get_cloned(&key);
        check_condition(condition.as_ref(), current.as_ref())?;

        // Upsert base: the current item, or a bare key item.
        let mut item = current.unwrap_or_else(|| {
            let mut base = Item::new();
            base.insert(PARTITION_KEY.into(), AttrValue::String(key.pk.clone()));
            base.insert(SORT_KEY.into(), AttrValue::String(key.sk.clone()));
            base
        });
        update.apply_to(&mut item)?;
        self.state.put(item.clone())?;

        Ok(UpdateOutput {
            attributes: match return_values {
                ReturnValues::None => None,
                ReturnValues::AllNew => Some(item),
            },
        })
    }

    /// Delete one item by primary key.
    pub fn delete(&mut self, params: Value) -> Result<()> {
        let params = self.validated("delete", params)?;
        let key = extract_key(&params, "Key")?;
        let condition = parse_optional_condition(&params)?;
        check_condition(condition.as_ref(), self.state.get_cloned(&key).as_ref())?;
        self.state.delete(&key);
        Ok(())
    }

    // ========== Shared plumbing ==========

    /// Manifest-validate the parameter object and check the table name.
    pub(crate) fn validated(&self, method: &str, params: Value) -> Result<Params> {
        let Value::Object(params) = params else {
            return Err(EngineError::validation(format!(
                "Invalid {method} request: expected a parameter object"
            )));
        };
        manifest::validate_params(method, &params)?;
        if let Some(table) = params.get("TableName") {
            self.check_table_name(table)?;
        }
        debug!(method, table = %self.table_name, "dispatching operation");
        Ok(params)
    }

    pub(crate) fn check_table_name(&self, table: &Value) -> Result<()> {
        match table {
            Value::String(name) if name == &self.table_name => Ok(()),
            _ => Err(EngineError::validation(
                "Cannot do operations on a non-existent table",
            )),
        }
    }
}

/// `ReturnValues` subset the engine emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReturnValues {
    None,
    AllNew,
}

pub(crate) fn extract_return_values(params: &Params) -> Result<ReturnValues> {
    match params.get("ReturnValues") {
        None => Ok(ReturnValues::None),
        Some(Value::String(s)) if s == "NONE" => Ok(ReturnValues::None),
        Some(Value::String(s)) if s == "ALL_NEW" => Ok(ReturnValues::AllNew),
        Some(other) => Err(EngineError::not_supported(
            "update",
            "update.ReturnValues",
            format!("only NONE and ALL_NEW are emulated, got {other}"),
        )),
    }
}

/// Extract a `{PK, SK}` key object.
pub(crate) fn extract_key(params: &Params, field: &str) -> Result<PrimaryKey> {
    let Some(Value::Object(key)) = params.get(field) else {
        return Err(EngineError::validation(format!(
            "The parameter '{field}' is required and must be an object"
        )));
    };
    key_from_object(key)
}

pub(crate) fn key_from_object(key: &Map<String, Value>) -> Result<PrimaryKey> {
    let item = item_from_json(Value::Object(key.clone()));
    PrimaryKey::from_item(&item)
}

/// Extract a wire-shaped item object.
pub(crate) fn extract_item(params: &Params, field: &str) -> Result<Item> {
    match params.get(field) {
        Some(Value::Object(obj)) => Ok(item_from_json(Value::Object(obj.clone()))),
        _ => Err(EngineError::validation(format!(
            "The parameter '{field}' is required and must be an object"
        ))),
    }
}

pub(crate) fn check_bool_param(params: &Params, field: &str) -> Result<()> {
    match params.get(field) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(_) => Err(EngineError::validation(format!(
            "The parameter '{field}' must be a boolean"
        ))),
    }
}

/// Build the placeholder context from `ExpressionAttributeNames` /
/// `ExpressionAttributeValues`.
pub(crate) fn expr_context(params: &Params) -> Result<ExprContext> {
    let mut names = BTreeMap::new();
    if let Some(value) = params.get("ExpressionAttributeNames") {
        let Value::Object(obj) = value else {
            return Err(EngineError::validation(
                "ExpressionAttributeNames must be an object",
            ));
        };
        for (token, name) in obj {
            let Value::String(name) = name else {
                return Err(EngineError::validation(format!(
                    "ExpressionAttributeNames contains a non-string substitution for {token}"
                )));
            };
            names.insert(token.clone(), name.clone());
        }
    }

    let mut values = BTreeMap::new();
    if let Some(value) = params.get("ExpressionAttributeValues") {
        let Value::Object(obj) = value else {
            return Err(EngineError::validation(
                "ExpressionAttributeValues must be an object",
            ));
        };
        for (token, v) in obj {
            values.insert(token.clone(), AttrValue::from(v.clone()));
        }
    }

    Ok(ExprContext::new(names, values))
}

/// Parse the optional `ConditionExpression` with the request's context.
pub(crate) fn parse_optional_condition(params: &Params) -> Result<Option<CondExpr>> {
    let Some(value) = params.get("ConditionExpression") else {
        return Ok(None);
    };
    let Value::String(expression) = value else {
        return Err(EngineError::validation(
            "ConditionExpression must be a string",
        ));
    };
    let ctx = expr_context(params)?;
    parse_condition(expression, &ctx)
        .map(Some)
        .map_err(EngineError::into_validation)
}

/// Evaluate an optional condition against the current item (or an empty
/// item when none exists).
pub(crate) fn check_condition(condition: Option<&CondExpr>, current: Option<&Item>) -> Result<()> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let empty = Item::new();
    let target = current.unwrap_or(&empty);
    if condition.evaluate(target) {
        Ok(())
    } else {
        Err(EngineError::ConditionalCheckFailed)
    }
}
