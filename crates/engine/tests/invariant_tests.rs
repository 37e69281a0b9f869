//! Invariants and round-trip laws
//!
//! Properties that must hold for every reachable engine state:
//! - index membership mirrors item content exactly
//! - index structure is independent of insertion order
//! - aborted transactions and tracked rollbacks restore snapshots
//! - round-trip laws over put/get/update/delete and query direction

use dynamem_core::{item_from_json, AttrValue, IndexName, Item};
use dynamem_engine::table::TableState;
use dynamem_engine::DocumentClient;
use serde_json::json;

fn item(pk: &str, sk: &str, extra: serde_json::Value) -> Item {
    let mut it = item_from_json(extra);
    it.insert("PK".into(), AttrValue::from(pk));
    it.insert("SK".into(), AttrValue::from(sk));
    it
}

// ============================================================================
// Index membership
// ============================================================================

#[test]
fn test_index_membership_mirrors_item_content() {
    let mut table = TableState::new();
    table
        .put(item("A", "1", json!({"GSI2PK": "H", "GSI2SK": "r", "GSI7PK": "X", "GSI7SK": "y"})))
        .unwrap();
    table.put(item("B", "1", json!({"GSI2PK": "H"}))).unwrap();
    table
        .put(item("C", "1", json!({"GSI3PK": 12, "GSI3SK": "s"})))
        .unwrap();

    // Every item lands in the primary index.
    assert_eq!(table.indexes().index_len(IndexName::Primary), 3);
    // Only the item with both GSI2 attributes as strings participates.
    assert_eq!(table.indexes().index_len(IndexName::Gsi(2)), 1);
    assert_eq!(table.indexes().index_len(IndexName::Gsi(7)), 1);
    // Non-string hash excludes the item.
    assert_eq!(table.indexes().index_len(IndexName::Gsi(3)), 0);

    // Removing the item clears every entry.
    table.delete(&dynamem_core::PrimaryKey::new("A", "1"));
    assert_eq!(table.indexes().index_len(IndexName::Gsi(2)), 0);
    assert_eq!(table.indexes().index_len(IndexName::Gsi(7)), 0);
    assert_eq!(table.indexes().index_len(IndexName::Primary), 2);
}

#[test]
fn test_update_through_client_keeps_indexes_fresh() {
    let mut db = DocumentClient::new("main");
    db.put(json!({
        "TableName": "main",
        "Item": {"PK": "K", "SK": "S", "GSI2PK": "H", "GSI2SK": "old"},
    }))
    .unwrap();
    db.put(json!({
        "TableName": "main",
        "Item": {"PK": "K", "SK": "S", "GSI2PK": "H", "GSI2SK": "new"},
    }))
    .unwrap();

    let out = db
        .query(json!({
            "TableName": "main",
            "IndexName": "GSI2",
            "KeyConditionExpression": "GSI2PK = :h AND GSI2SK = :r",
            "ExpressionAttributeValues": {":h": "H", ":r": "old"},
        }))
        .unwrap();
    assert_eq!(out.count, 0, "stale entry must be gone");

    let out = db
        .query(json!({
            "TableName": "main",
            "IndexName": "GSI2",
            "KeyConditionExpression": "GSI2PK = :h AND GSI2SK = :r",
            "ExpressionAttributeValues": {":h": "H", ":r": "new"},
        }))
        .unwrap();
    assert_eq!(out.count, 1);
}

// ============================================================================
// Structural determinism
// ============================================================================

#[test]
fn test_index_shape_is_independent_of_insertion_order() {
    let rows: Vec<Item> = (0..32)
        .map(|i| item("P", &format!("SK#{i:02}"), json!({})))
        .collect();

    let mut forward = TableState::new();
    for row in &rows {
        forward.put(row.clone()).unwrap();
    }

    let mut backward = TableState::new();
    for row in rows.iter().rev() {
        backward.put(row.clone()).unwrap();
    }

    let shape_a = forward
        .indexes()
        .partition(IndexName::Primary, "P")
        .unwrap()
        .preorder_keys();
    let shape_b = backward
        .indexes()
        .partition(IndexName::Primary, "P")
        .unwrap()
        .preorder_keys();
    assert_eq!(shape_a, shape_b);
}

#[test]
fn test_snapshots_agree_across_histories() {
    // Same final content through different mutation histories.
    let mut direct = DocumentClient::new("main");
    direct
        .put(json!({"TableName": "main", "Item": {"PK": "A", "SK": "1", "v": 2}}))
        .unwrap();

    let mut churned = DocumentClient::new("main");
    churned
        .put(json!({"TableName": "main", "Item": {"PK": "A", "SK": "1", "v": 1}}))
        .unwrap();
    churned
        .put(json!({"TableName": "main", "Item": {"PK": "Z", "SK": "9"}}))
        .unwrap();
    churned
        .delete(json!({"TableName": "main", "Key": {"PK": "Z", "SK": "9"}}))
        .unwrap();
    churned
        .update(json!({
            "TableName": "main",
            "Key": {"PK": "A", "SK": "1"},
            "UpdateExpression": "SET v = :v",
            "ExpressionAttributeValues": {":v": 2},
        }))
        .unwrap();

    assert_eq!(direct.snapshot(), churned.snapshot());
}

// ============================================================================
// Round-trip laws
// ============================================================================

#[test]
fn test_put_get_round_trip_is_deep_equal() {
    let mut db = DocumentClient::new("main");
    db.put(json!({
        "TableName": "main",
        "Item": {
            "PK": "K", "SK": "S",
            "nested": {"list": [1, {"deep": true}], "nil": null},
        },
    }))
    .unwrap();
    let fetched = db
        .get(json!({"TableName": "main", "Key": {"PK": "K", "SK": "S"}}))
        .unwrap()
        .item
        .unwrap();
    assert_eq!(
        fetched,
        item(
            "K",
            "S",
            json!({"nested": {"list": [1, {"deep": true}], "nil": null}})
        )
    );
}

#[test]
fn test_update_then_get_reflects_assignment() {
    let mut db = DocumentClient::new("main");
    db.put(json!({"TableName": "main", "Item": {"PK": "K", "SK": "S"}}))
        .unwrap();
    db.update(json!({
        "TableName": "main",
        "Key": {"PK": "K", "SK": "S"},
        "UpdateExpression": "SET a = :v",
        "ExpressionAttributeValues": {":v": "value"},
    }))
    .unwrap();
    let fetched = db
        .get(json!({"TableName": "main", "Key": {"PK": "K", "SK": "S"}}))
        .unwrap()
        .item
        .unwrap();
    assert_eq!(fetched["a"], AttrValue::from("value"));
}

#[test]
fn test_put_delete_get_is_nothing() {
    let mut db = DocumentClient::new("main");
    db.put(json!({"TableName": "main", "Item": {"PK": "K", "SK": "S"}}))
        .unwrap();
    db.delete(json!({"TableName": "main", "Key": {"PK": "K", "SK": "S"}}))
        .unwrap();
    let out = db
        .get(json!({"TableName": "main", "Key": {"PK": "K", "SK": "S"}}))
        .unwrap();
    assert!(out.item.is_none());
}

#[test]
fn test_descending_query_is_reverse_of_ascending() {
    let mut db = DocumentClient::new("main");
    for sk in ["c", "a", "e", "b", "d"] {
        db.put(json!({"TableName": "main", "Item": {"PK": "P", "SK": sk}}))
            .unwrap();
    }
    let base = json!({
        "TableName": "main",
        "KeyConditionExpression": "PK = :pk",
        "ExpressionAttributeValues": {":pk": "P"},
    });
    let ascending = db.query(base.clone()).unwrap();
    let mut descending_params = base;
    descending_params["ScanIndexForward"] = json!(false);
    let descending = db.query(descending_params).unwrap();

    let mut mirrored = ascending.items.clone();
    mirrored.reverse();
    assert_eq!(descending.items, mirrored);
}

// ============================================================================
// Batch-get laws
// ============================================================================

#[test]
fn test_batch_get_returns_at_most_requested_and_in_order() {
    let mut db = DocumentClient::new("main");
    for sk in ["a", "b"] {
        db.put(json!({"TableName": "main", "Item": {"PK": "P", "SK": sk}}))
            .unwrap();
    }
    let out = db
        .batch_get(json!({
            "RequestItems": {"main": {"Keys": [
                {"PK": "P", "SK": "b"},
                {"PK": "P", "SK": "zz"},
                {"PK": "P", "SK": "a"},
            ]}}
        }))
        .unwrap();
    let found = &out.responses["main"];
    assert!(found.len() <= 3);
    assert_eq!(found[0]["SK"], AttrValue::from("b"));
    assert_eq!(found[1]["SK"], AttrValue::from("a"));
}

// ============================================================================
// Failure semantics leave state untouched
// ============================================================================

#[test]
fn test_validation_errors_do_not_mutate() {
    let mut db = DocumentClient::new("main");
    db.put(json!({"TableName": "main", "Item": {"PK": "K", "SK": "S"}}))
        .unwrap();
    let before = db.snapshot();

    // Bad expression.
    assert!(db
        .update(json!({
            "TableName": "main",
            "Key": {"PK": "K", "SK": "S"},
            "UpdateExpression": "SET a = :missing",
        }))
        .is_err());
    // Bad key shape.
    assert!(db
        .put(json!({"TableName": "main", "Item": {"PK": "K"}}))
        .is_err());
    // Unsupported parameter.
    assert!(db
        .put(json!({
            "TableName": "main",
            "Item": {"PK": "Q", "SK": "Q"},
            "ReturnValues": "ALL_OLD",
        }))
        .is_err());

    assert_eq!(db.snapshot(), before);
}
