//! Query and scan
//!
//! Query iterates one index partition through the index set's ordered
//! maps; scan walks the whole table in ascending (PK, SK) order. Both
//! share the scanned/limit accounting: every visited candidate counts
//! toward `ScannedCount`, the filter only decides membership in `Items`,
//! and hitting the limit records a continuation key for the last-scanned
//! item.

use crate::expr::condition::CondExpr;
use crate::expr::{parse_condition, parse_key_condition};
use crate::index_set::ExclusiveStart;
use crate::ops::{check_bool_param, expr_context, DocumentClient, Params};
use crate::partition::Direction;
use dynamem_core::error::{MSG_CONSISTENT_READ_ON_GSI, MSG_STARTING_KEY_INVALID};
use dynamem_core::manifest;
use dynamem_core::{
    AttrValue, EngineError, IndexName, Item, PrimaryKey, Result, PARTITION_KEY, SORT_KEY,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Output of `query` and `scan`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    #[serde(rename = "Items")]
    pub items: Vec<Item>,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "ScannedCount")]
    pub scanned_count: usize,
    #[serde(rename = "LastEvaluatedKey", skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

impl DocumentClient {
    /// Query one index partition.
    pub fn query(&self, params: Value) -> Result<QueryOutput> {
        let params = self.validated("query", params)?;

        let index = extract_index(&params)?;
        check_bool_param(&params, "ScanIndexForward")?;
        check_bool_param(&params, "ConsistentRead")?;
        if params.get("ConsistentRead") == Some(&Value::Bool(true)) && !index.is_primary() {
            return Err(EngineError::validation(MSG_CONSISTENT_READ_ON_GSI));
        }
        let limit = extract_limit(&params)?;

        let ctx = expr_context(&params)?;
        let expression = match params.get("KeyConditionExpression") {
            Some(Value::String(s)) => s,
            _ => {
                return Err(EngineError::validation(
                    "Either the KeyConditions or KeyConditionExpression parameter must be specified in the request.",
                ))
            }
        };
        let key_condition =
            parse_key_condition(expression, &ctx).map_err(EngineError::into_validation)?;

        if key_condition.hash_attribute != index.hash_attribute() {
            return Err(EngineError::validation(format!(
                "Query condition missed key schema element: {}",
                index.hash_attribute()
            )));
        }
        if let Some(range) = &key_condition.range {
            if range.attribute != index.range_attribute() {
                return Err(EngineError::validation(format!(
                    "Query condition missed key schema element: {}",
                    index.range_attribute()
                )));
            }
        }

        let filter = parse_optional_filter(&params, &ctx)?;
        let direction = match params.get("ScanIndexForward") {
            Some(Value::Bool(false)) => Direction::Reverse,
            _ => Direction::Forward,
        };
        let exclusive_start = extract_query_start(&params, index)?;

        let (lower, upper) = match &key_condition.range {
            Some(range) => range.condition.entry_bounds(),
            None => (None, None),
        };

        let mut items = Vec::new();
        let mut scanned_count = 0usize;
        let mut last_evaluated_key = None;

        self.state.indexes().iterate_candidates(
            index,
            &key_condition.hash_value,
            lower,
            upper,
            direction,
            exclusive_start.as_ref(),
            &mut |encoded| {
                let Some((key, item)) = self.state.get_by_encoded(encoded) else {
                    warn!(encoded, "index entry without a backing item");
                    return true;
                };
                scanned_count += 1;
                if filter.as_ref().map_or(true, |f| f.evaluate(item)) {
                    items.push(item.clone());
                }
                if limit == Some(scanned_count) {
                    last_evaluated_key = Some(continuation_key(index, key, item));
                    return false;
                }
                true
            },
        );

        Ok(QueryOutput {
            count: items.len(),
            scanned_count,
            items,
            last_evaluated_key,
        })
    }

    /// Walk the table in ascending (PK, SK) order.
    pub fn scan(&self, params: Value) -> Result<QueryOutput> {
        let params = self.validated("scan", params)?;
        let limit = extract_limit(&params)?;
        let ctx = expr_context(&params)?;
        let filter = parse_optional_filter(&params, &ctx)?;
        let exclusive_start = extract_scan_start(&params)?;

        let mut items = Vec::new();
        let mut scanned_count = 0usize;
        let mut last_evaluated_key = None;

        for (key, item) in self.state.scan_from(exclusive_start.as_ref()) {
            scanned_count += 1;
            if filter.as_ref().map_or(true, |f| f.evaluate(item)) {
                items.push(item.clone());
            }
            if limit == Some(scanned_count) {
                last_evaluated_key = Some(continuation_key(IndexName::Primary, key, item));
                break;
            }
        }

        Ok(QueryOutput {
            count: items.len(),
            scanned_count,
            items,
            last_evaluated_key,
        })
    }
}

fn extract_index(params: &Params) -> Result<IndexName> {
    let index = match params.get("IndexName") {
        None => IndexName::Primary,
        Some(Value::String(name)) => IndexName::parse(name).ok_or_else(|| {
            EngineError::validation(format!(
                "The table does not have the specified index: {name}"
            ))
        })?,
        Some(_) => {
            return Err(EngineError::validation(
                "The parameter 'IndexName' must be a string",
            ))
        }
    };
    let name = index.to_string();
    if manifest::EXCLUDED_INDEXES.contains(&name.as_str()) {
        return Err(EngineError::not_supported(
            "query",
            format!("query.IndexName.{name}"),
            "index is excluded from the in-memory engine",
        ));
    }
    Ok(index)
}

fn extract_limit(params: &Params) -> Result<Option<usize>> {
    let Some(value) = params.get("Limit") else {
        return Ok(None);
    };
    match value.as_u64() {
        Some(n) if n >= 1 => Ok(Some(n as usize)),
        _ => Err(EngineError::validation(format!(
            "1 validation error detected: Value '{value}' at 'limit' failed to satisfy constraint: Member must have value greater than or equal to 1"
        ))),
    }
}

fn parse_optional_filter(params: &Params, ctx: &crate::expr::ExprContext) -> Result<Option<CondExpr>> {
    let Some(value) = params.get("FilterExpression") else {
        return Ok(None);
    };
    let Value::String(expression) = value else {
        return Err(EngineError::validation("FilterExpression must be a string"));
    };
    parse_condition(expression, ctx)
        .map(Some)
        .map_err(EngineError::into_validation)
}

/// A query continuation key carries the primary key plus the queried
/// index's own key attributes.
fn continuation_key(index: IndexName, key: &PrimaryKey, item: &Item) -> Item {
    let mut lek = Item::new();
    lek.insert(PARTITION_KEY.into(), AttrValue::String(key.pk.clone()));
    lek.insert(SORT_KEY.into(), AttrValue::String(key.sk.clone()));
    if !index.is_primary() {
        for attr in [index.hash_attribute(), index.range_attribute()] {
            if let Some(value) = item.get(&attr) {
                lek.insert(attr, value.clone());
            }
        }
    }
    lek
}

/// Decode a query `ExclusiveStartKey` into the partition continuation
/// point for the queried index.
fn extract_query_start(params: &Params, index: IndexName) -> Result<Option<ExclusiveStart>> {
    let Some(value) = params.get("ExclusiveStartKey") else {
        return Ok(None);
    };
    let Value::Object(obj) = value else {
        return Err(EngineError::validation(MSG_STARTING_KEY_INVALID));
    };
    let get_string = |attr: &str| -> Result<String> {
        match obj.get(attr) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(EngineError::validation(MSG_STARTING_KEY_INVALID)),
        }
    };
    let pk = get_string(PARTITION_KEY)?;
    let sk = get_string(SORT_KEY)?;
    // GSI continuation keys must also carry the index's own attributes.
    if !index.is_primary() {
        get_string(&index.hash_attribute())?;
    }
    let range_value = get_string(&index.range_attribute())?;
    Ok(Some(ExclusiveStart {
        range_value,
        item_key: PrimaryKey::new(pk, sk).encode(),
    }))
}

/// Decode a scan `ExclusiveStartKey` into a primary key.
fn extract_scan_start(params: &Params) -> Result<Option<PrimaryKey>> {
    let Some(value) = params.get("ExclusiveStartKey") else {
        return Ok(None);
    };
    let Value::Object(obj) = value else {
        return Err(EngineError::validation(MSG_STARTING_KEY_INVALID));
    };
    match (obj.get(PARTITION_KEY), obj.get(SORT_KEY)) {
        (Some(Value::String(pk)), Some(Value::String(sk)))
            if !pk.is_empty() && !sk.is_empty() =>
        {
            Ok(Some(PrimaryKey::new(pk.clone(), sk.clone())))
        }
        _ => Err(EngineError::validation(MSG_STARTING_KEY_INVALID)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> DocumentClient {
        let mut c = DocumentClient::new("main");
        for sk in ["PROFILE#001", "ORDER#001", "ORDER#002", "ORDER#003", "COMMENT#001"] {
            c.put(json!({
                "TableName": "main",
                "Item": {"PK": "USER#1", "SK": sk},
            }))
            .unwrap();
        }
        c
    }

    #[test]
    fn test_query_begins_with() {
        let c = seeded();
        let out = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "PK = :pk AND begins_with(SK, :p)",
                "ExpressionAttributeValues": {":pk": "USER#1", ":p": "ORDER#"},
            }))
            .unwrap();
        assert_eq!(out.count, 3);
        assert_eq!(out.scanned_count, 3);
        assert!(out.last_evaluated_key.is_none());
        let sks: Vec<&str> = out
            .items
            .iter()
            .map(|i| i["SK"].as_str().unwrap())
            .collect();
        assert_eq!(sks, vec!["ORDER#001", "ORDER#002", "ORDER#003"]);
    }

    #[test]
    fn test_query_reverse_is_mirror() {
        let c = seeded();
        let base = json!({
            "TableName": "main",
            "KeyConditionExpression": "PK = :pk",
            "ExpressionAttributeValues": {":pk": "USER#1"},
        });
        let forward = c.query(base.clone()).unwrap();
        let mut reversed = base;
        reversed["ScanIndexForward"] = json!(false);
        let backward = c.query(reversed).unwrap();

        let mut mirrored = forward.items.clone();
        mirrored.reverse();
        assert_eq!(backward.items, mirrored);
    }

    #[test]
    fn test_query_range_operators() {
        let c = seeded();
        let out = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "PK = :pk AND SK BETWEEN :a AND :b",
                "ExpressionAttributeValues": {":pk": "USER#1", ":a": "ORDER#001", ":b": "ORDER#002"},
            }))
            .unwrap();
        assert_eq!(out.count, 2);

        let out = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "PK = :pk AND SK > :v",
                "ExpressionAttributeValues": {":pk": "USER#1", ":v": "ORDER#003"},
            }))
            .unwrap();
        let sks: Vec<&str> = out.items.iter().map(|i| i["SK"].as_str().unwrap()).collect();
        assert_eq!(sks, vec!["PROFILE#001"]);
    }

    #[test]
    fn test_query_filter_affects_count_not_scanned() {
        let mut c = seeded();
        c.update(json!({
            "TableName": "main",
            "Key": {"PK": "USER#1", "SK": "ORDER#002"},
            "UpdateExpression": "SET flagged = :t",
            "ExpressionAttributeValues": {":t": true},
        }))
        .unwrap();
        let out = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "PK = :pk AND begins_with(SK, :p)",
                "FilterExpression": "flagged = :t",
                "ExpressionAttributeValues": {":pk": "USER#1", ":p": "ORDER#", ":t": true},
            }))
            .unwrap();
        assert_eq!(out.scanned_count, 3);
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_query_wrong_hash_attribute() {
        let c = seeded();
        let err = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "Other = :pk",
                "ExpressionAttributeValues": {":pk": "USER#1"},
            }))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Query condition missed key schema element: PK"));
    }

    #[test]
    fn test_query_gsi1_is_excluded() {
        let c = seeded();
        let err = c
            .query(json!({
                "TableName": "main",
                "IndexName": "GSI1",
                "KeyConditionExpression": "GSI1PK = :pk",
                "ExpressionAttributeValues": {":pk": "x"},
            }))
            .unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("GSI1"));
    }

    #[test]
    fn test_query_unknown_index() {
        let c = seeded();
        let err = c
            .query(json!({
                "TableName": "main",
                "IndexName": "GSI42",
                "KeyConditionExpression": "PK = :pk",
                "ExpressionAttributeValues": {":pk": "x"},
            }))
            .unwrap_err();
        assert!(err.to_string().contains("GSI42"));
    }

    #[test]
    fn test_consistent_read_on_gsi_rejected() {
        let mut c = DocumentClient::new("main");
        c.put(json!({
            "TableName": "main",
            "Item": {"PK": "K", "SK": "S", "GSI2PK": "H", "GSI2SK": "R"},
        }))
        .unwrap();
        let err = c
            .query(json!({
                "TableName": "main",
                "IndexName": "GSI2",
                "ConsistentRead": true,
                "KeyConditionExpression": "GSI2PK = :pk",
                "ExpressionAttributeValues": {":pk": "H"},
            }))
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_CONSISTENT_READ_ON_GSI);
    }

    #[test]
    fn test_limit_validation() {
        let c = seeded();
        for bad in [json!(0), json!(-1), json!(1.5), json!("3")] {
            let err = c
                .query(json!({
                    "TableName": "main",
                    "KeyConditionExpression": "PK = :pk",
                    "ExpressionAttributeValues": {":pk": "USER#1"},
                    "Limit": bad,
                }))
                .unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains("greater than or equal to 1"));
        }
    }

    #[test]
    fn test_gsi_query_with_limit_and_continuation() {
        let mut c = DocumentClient::new("main");
        for i in 0..10 {
            c.put(json!({
                "TableName": "main",
                "Item": {
                    "PK": "USER#X",
                    "SK": format!("ITEM#{i:03}"),
                    "GSI2PK": "E#x@e.com",
                    "GSI2SK": format!("ITEM#{i:03}"),
                },
            }))
            .unwrap();
        }

        let first = c
            .query(json!({
                "TableName": "main",
                "IndexName": "GSI2",
                "KeyConditionExpression": "GSI2PK = :pk",
                "ExpressionAttributeValues": {":pk": "E#x@e.com"},
                "Limit": 3,
            }))
            .unwrap();
        assert_eq!(first.count, 3);
        assert_eq!(first.scanned_count, 3);
        let lek = first.last_evaluated_key.clone().unwrap();
        assert_eq!(lek["PK"], AttrValue::from("USER#X"));
        assert_eq!(lek["SK"], AttrValue::from("ITEM#002"));
        assert_eq!(lek["GSI2PK"], AttrValue::from("E#x@e.com"));
        assert_eq!(lek["GSI2SK"], AttrValue::from("ITEM#002"));

        let second = c
            .query(json!({
                "TableName": "main",
                "IndexName": "GSI2",
                "KeyConditionExpression": "GSI2PK = :pk",
                "ExpressionAttributeValues": {":pk": "E#x@e.com"},
                "Limit": 3,
                "ExclusiveStartKey": serde_json::to_value(&lek).unwrap(),
            }))
            .unwrap();
        let sks: Vec<&str> = second
            .items
            .iter()
            .map(|i| i["SK"].as_str().unwrap())
            .collect();
        assert_eq!(sks, vec!["ITEM#003", "ITEM#004", "ITEM#005"]);
    }

    #[test]
    fn test_invalid_starting_key() {
        let c = seeded();
        let err = c
            .query(json!({
                "TableName": "main",
                "KeyConditionExpression": "PK = :pk",
                "ExpressionAttributeValues": {":pk": "USER#1"},
                "ExclusiveStartKey": {"PK": "USER#1"},
            }))
            .unwrap_err();
        assert_eq!(err.to_string(), MSG_STARTING_KEY_INVALID);
    }

    #[test]
    fn test_scan_orders_by_primary_key() {
        let mut c = DocumentClient::new("main");
        for (pk, sk) in [("B", "1"), ("A", "2"), ("A", "1")] {
            c.put(json!({"TableName": "main", "Item": {"PK": pk, "SK": sk}}))
                .unwrap();
        }
        let out = c.scan(json!({"TableName": "main"})).unwrap();
        let keys: Vec<(String, String)> = out
            .items
            .iter()
            .map(|i| {
                (
                    i["PK"].as_str().unwrap().to_string(),
                    i["SK"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A".into(), "1".into()),
                ("A".into(), "2".into()),
                ("B".into(), "1".into()),
            ]
        );
    }

    #[test]
    fn test_scan_with_limit_and_continuation() {
        let mut c = DocumentClient::new("main");
        for i in 0..5 {
            c.put(json!({"TableName": "main", "Item": {"PK": "P", "SK": format!("{i}")}}))
                .unwrap();
        }
        let first = c
            .scan(json!({"TableName": "main", "Limit": 2}))
            .unwrap();
        assert_eq!(first.count, 2);
        let lek = first.last_evaluated_key.unwrap();
        assert_eq!(lek.len(), 2);
        assert_eq!(lek["SK"], AttrValue::from("1"));

        let second = c
            .scan(json!({
                "TableName": "main",
                "ExclusiveStartKey": serde_json::to_value(&lek).unwrap(),
            }))
            .unwrap();
        assert_eq!(second.count, 3);
        assert!(second.last_evaluated_key.is_none());
    }

    #[test]
    fn test_scan_filter() {
        let mut c = DocumentClient::new("main");
        for (sk, status) in [("1", "a"), ("2", "b"), ("3", "a")] {
            c.put(json!({
                "TableName": "main",
                "Item": {"PK": "P", "SK": sk, "status": status},
            }))
            .unwrap();
        }
        let out = c
            .scan(json!({
                "TableName": "main",
                "FilterExpression": "status = :s",
                "ExpressionAttributeValues": {":s": "a"},
            }))
            .unwrap();
        assert_eq!(out.count, 2);
        assert_eq!(out.scanned_count, 3);
    }
}
