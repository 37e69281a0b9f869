//! Spec manifest
//!
//! A declarative description of the emulated surface: per method, the set
//! of supported parameters and the set of recognized-but-unsupported
//! parameters, plus the methods that are not emulated at all. The single
//! source of truth for surface errors; the operation layer never
//! hand-rolls parameter checks.
//!
//! The manifest also carries two engine invariants: `GSI1` is excluded
//! from the in-memory engine, and every index projects `ALL` attributes.

use crate::error::{EngineError, Result};
use serde_json::Map;

/// Supported/unsupported parameter sets for one method.
#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub name: &'static str,
    pub supported_params: &'static [&'static str],
    pub unsupported_params: &'static [&'static str],
}

/// Indexes the wire layer defines but the in-memory engine refuses.
pub const EXCLUDED_INDEXES: &[&str] = &["GSI1"];

/// Index projection; the engine only models full projection.
pub const PROJECTION: &str = "ALL";

/// Methods the engine does not emulate at all.
pub const UNSUPPORTED_METHODS: &[&str] = &[
    "transactGet",
    "createSet",
    "executeStatement",
    "batchExecuteStatement",
    "executeTransaction",
];

/// The emulated methods.
pub const METHODS: &[MethodSpec] = &[
    MethodSpec {
        name: "get",
        supported_params: &["TableName", "Key", "ConsistentRead"],
        unsupported_params: &[
            "ProjectionExpression",
            "ExpressionAttributeNames",
            "AttributesToGet",
            "ReturnConsumedCapacity",
        ],
    },
    MethodSpec {
        name: "put",
        supported_params: &[
            "TableName",
            "Item",
            "ConditionExpression",
            "ExpressionAttributeNames",
            "ExpressionAttributeValues",
        ],
        unsupported_params: &[
            "ReturnValues",
            "Expected",
            "ConditionalOperator",
            "ReturnConsumedCapacity",
            "ReturnItemCollectionMetrics",
        ],
    },
    MethodSpec {
        name: "update",
        supported_params: &[
            "TableName",
            "Key",
            "UpdateExpression",
            "ConditionExpression",
            "ExpressionAttributeNames",
            "ExpressionAttributeValues",
            "ReturnValues",
        ],
        unsupported_params: &[
            "AttributeUpdates",
            "Expected",
            "ConditionalOperator",
            "ReturnConsumedCapacity",
            "ReturnItemCollectionMetrics",
        ],
    },
    MethodSpec {
        name: "delete",
        supported_params: &[
            "TableName",
            "Key",
            "ConditionExpression",
            "ExpressionAttributeNames",
            "ExpressionAttributeValues",
        ],
        unsupported_params: &[
            "ReturnValues",
            "Expected",
            "ConditionalOperator",
            "ReturnConsumedCapacity",
            "ReturnItemCollectionMetrics",
        ],
    },
    MethodSpec {
        name: "query",
        supported_params: &[
            "TableName",
            "IndexName",
            "KeyConditionExpression",
            "FilterExpression",
            "ExpressionAttributeNames",
            "ExpressionAttributeValues",
            "Limit",
            "ExclusiveStartKey",
            "ScanIndexForward",
            "ConsistentRead",
        ],
        unsupported_params: &[
            "ProjectionExpression",
            "Select",
            "AttributesToGet",
            "KeyConditions",
            "QueryFilter",
            "ConditionalOperator",
            "ReturnConsumedCapacity",
        ],
    },
    MethodSpec {
        name: "scan",
        supported_params: &[
            "TableName",
            "FilterExpression",
            "ExpressionAttributeNames",
            "ExpressionAttributeValues",
            "Limit",
            "ExclusiveStartKey",
        ],
        unsupported_params: &[
            "IndexName",
            "ProjectionExpression",
            "Select",
            "AttributesToGet",
            "ScanFilter",
            "ConditionalOperator",
            "ConsistentRead",
            "TotalSegments",
            "Segment",
            "ReturnConsumedCapacity",
        ],
    },
    MethodSpec {
        name: "batchGet",
        supported_params: &["RequestItems"],
        unsupported_params: &["ReturnConsumedCapacity"],
    },
    MethodSpec {
        name: "batchWrite",
        supported_params: &["RequestItems"],
        unsupported_params: &["ReturnConsumedCapacity", "ReturnItemCollectionMetrics"],
    },
    MethodSpec {
        name: "transactWrite",
        supported_params: &["TransactItems"],
        unsupported_params: &[
            "ClientRequestToken",
            "ReturnConsumedCapacity",
            "ReturnItemCollectionMetrics",
        ],
    },
];

/// Look up a method's spec.
pub fn method_spec(method: &str) -> Option<&'static MethodSpec> {
    METHODS.iter().find(|m| m.name == method)
}

/// Validate the parameter names of a request against the manifest.
///
/// - An unemulated method is rejected by name.
/// - A present parameter from `unsupported_params` is rejected, naming the
///   parameter and its path.
/// - A present parameter outside both sets is rejected as unknown.
pub fn validate_params(method: &str, params: &Map<String, serde_json::Value>) -> Result<()> {
    if UNSUPPORTED_METHODS.contains(&method) {
        return Err(EngineError::not_supported(
            method,
            method,
            "method is not emulated by the in-memory engine",
        ));
    }
    let spec = method_spec(method).ok_or_else(|| {
        EngineError::not_supported(method, method, "unknown method")
    })?;

    for param in params.keys() {
        let param = param.as_str();
        if spec.unsupported_params.contains(&param) {
            return Err(EngineError::not_supported(
                method,
                format!("{method}.{param}"),
                format!("parameter {param} is not emulated"),
            ));
        }
        if !spec.supported_params.contains(&param) {
            return Err(EngineError::not_supported(
                method,
                format!("{method}.{param}"),
                format!("unknown parameter {param}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: serde_json::Value) -> Map<String, serde_json::Value> {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_supported_params_pass() {
        let p = params(json!({"TableName": "t", "Key": {}, "ConsistentRead": true}));
        assert!(validate_params("get", &p).is_ok());
    }

    #[test]
    fn test_unsupported_param_names_the_path() {
        let p = params(json!({"TableName": "t", "Key": {}, "ProjectionExpression": "a"}));
        let err = validate_params("get", &p).unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("get.ProjectionExpression"));
    }

    #[test]
    fn test_unknown_param_rejected() {
        let p = params(json!({"TableName": "t", "Key": {}, "Bogus": 1}));
        let err = validate_params("get", &p).unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("Bogus"));
    }

    #[test]
    fn test_unsupported_method_rejected_by_name() {
        let p = params(json!({}));
        let err = validate_params("transactGet", &p).unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("transactGet"));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let p = params(json!({}));
        assert!(validate_params("describeTable", &p).is_err());
    }

    #[test]
    fn test_every_method_has_disjoint_sets() {
        for spec in METHODS {
            for p in spec.supported_params {
                assert!(
                    !spec.unsupported_params.contains(p),
                    "{} lists {} as both supported and unsupported",
                    spec.name,
                    p
                );
            }
        }
    }

    #[test]
    fn test_invariants() {
        assert_eq!(EXCLUDED_INDEXES, &["GSI1"]);
        assert_eq!(PROJECTION, "ALL");
    }
}
