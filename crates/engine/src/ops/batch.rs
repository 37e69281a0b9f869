//! Batch operations
//!
//! `batchGet` reads up to 100 distinct keys per table; found items come
//! back in request order, missing keys are omitted. `batchWrite` applies
//! up to 25 unconditioned put/delete requests per table.

use crate::ops::{key_from_object, BatchGetOutput, DocumentClient};
use dynamem_core::{item_from_json, EngineError, PrimaryKey, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const MAX_BATCH_GET_KEYS: usize = 100;
const MAX_BATCH_WRITE_REQUESTS: usize = 25;

impl DocumentClient {
    /// Read a batch of keys.
    pub fn batch_get(&self, params: Value) -> Result<BatchGetOutput> {
        let params = self.validated("batchGet", params)?;
        let request_items = extract_request_items(&params)?;

        let mut output = BatchGetOutput {
            responses: Default::default(),
        };
        for (table, spec) in request_items {
            self.check_table_name(&Value::String(table.clone()))?;
            let Value::Object(spec) = spec else {
                return Err(EngineError::validation(format!(
                    "RequestItems entry for table {table} must be an object"
                )));
            };
            for param in spec.keys() {
                if param != "Keys" {
                    return Err(EngineError::not_supported(
                        "batchGet",
                        format!("batchGet.RequestItems.{param}"),
                        format!("parameter {param} is not emulated"),
                    ));
                }
            }
            let Some(Value::Array(keys)) = spec.get("Keys") else {
                return Err(EngineError::validation(format!(
                    "RequestItems entry for table {table} must carry a Keys list"
                )));
            };
            if keys.is_empty() {
                return Err(EngineError::validation(
                    "1 validation error detected: Value at 'requestItems' failed to satisfy constraint: Member must have length greater than or equal to 1",
                ));
            }
            if keys.len() > MAX_BATCH_GET_KEYS {
                return Err(EngineError::validation(
                    "Too many items requested for the BatchGetItem call",
                ));
            }

            let mut seen = BTreeSet::new();
            let mut found = Vec::new();
            for key in keys {
                let Value::Object(key) = key else {
                    return Err(EngineError::validation(
                        "The provided key element does not match the schema",
                    ));
                };
                let key = key_from_object(key)?;
                if !seen.insert(key.clone()) {
                    return Err(EngineError::validation(
                        "Provided list of item keys contains duplicates",
                    ));
                }
                if let Some(item) = self.state.get_cloned(&key) {
                    found.push(item);
                }
            }
            output.responses.insert(table, found);
        }
        Ok(output)
    }

    /// Apply a batch of unconditioned put/delete requests.
    pub fn batch_write(&mut self, params: Value) -> Result<()> {
        let params = self.validated("batchWrite", params)?;
        let request_items = extract_request_items(&params)?;

        // Validate every entry before mutating anything: batch shape
        // errors must not leave a half-applied batch behind.
        let mut writes: Vec<WriteRequest> = Vec::new();
        for (table, spec) in request_items {
            self.check_table_name(&Value::String(table.clone()))?;
            let Value::Array(requests) = spec else {
                return Err(EngineError::validation(format!(
                    "RequestItems entry for table {table} must be a list"
                )));
            };
            if requests.is_empty() {
                return Err(EngineError::validation(
                    "1 validation error detected: Value at 'requestItems' failed to satisfy constraint: Member must have length greater than or equal to 1",
                ));
            }
            if requests.len() > MAX_BATCH_WRITE_REQUESTS {
                return Err(EngineError::validation(
                    "Too many items requested for the BatchWriteItem call",
                ));
            }
            for request in requests {
                writes.push(parse_write_request(&request)?);
            }
        }

        for write in writes {
            match write {
                WriteRequest::Put(item) => {
                    self.state.put(item_from_json(item))?;
                }
                WriteRequest::Delete(key) => {
                    self.state.delete(&key);
                }
            }
        }
        Ok(())
    }
}

enum WriteRequest {
    Put(Value),
    Delete(PrimaryKey),
}

fn parse_write_request(request: &Value) -> Result<WriteRequest> {
    let Value::Object(request) = request else {
        return Err(invalid_write_request());
    };
    if request.len() != 1 {
        return Err(invalid_write_request());
    }
    let (kind, body) = request.iter().next().expect("len checked");
    let Value::Object(body) = body else {
        return Err(invalid_write_request());
    };
    match kind.as_str() {
        "PutRequest" => match body.get("Item") {
            Some(item @ Value::Object(_)) => Ok(WriteRequest::Put(item.clone())),
            _ => Err(invalid_write_request()),
        },
        "DeleteRequest" => match body.get("Key") {
            Some(Value::Object(key)) => Ok(WriteRequest::Delete(key_from_object(key)?)),
            _ => Err(invalid_write_request()),
        },
        _ => Err(invalid_write_request()),
    }
}

fn invalid_write_request() -> EngineError {
    EngineError::validation(
        "Invalid request in RequestItems: each entry must be a PutRequest or DeleteRequest",
    )
}

fn extract_request_items(params: &Map<String, Value>) -> Result<Vec<(String, Value)>> {
    match params.get("RequestItems") {
        Some(Value::Object(tables)) if !tables.is_empty() => Ok(tables
            .iter()
            .map(|(table, spec)| (table.clone(), spec.clone()))
            .collect()),
        _ => Err(EngineError::validation(
            "The parameter 'RequestItems' is required and must be a non-empty object",
        )),
    }
}
