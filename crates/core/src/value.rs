//! Attribute value model
//!
//! This module defines:
//! - AttrValue: Unified enum for all attribute value types
//! - Item: an attribute-name to value mapping
//!
//! ## Canonical Value Model
//!
//! The AttrValue enum has exactly 10 variants, matching the wire type codes
//! of the hosted service:
//! - Null (`NULL`), Bool (`BOOL`), Number (`N`), String (`S`), Bytes (`B`),
//!   List (`L`), Map (`M`), StringSet (`SS`), NumberSet (`NS`), ByteSet (`BS`)
//!
//! ### Type Rules
//!
//! - Numbers are doubles. Equality follows IEEE-754: `NaN != NaN`, `-0.0 == 0.0`.
//! - Different types are NEVER equal: `Number(1.0) != String("1")`.
//! - `Bytes` are not `String`.
//!
//! ## JSON Interop
//!
//! Plain JSON maps onto the first seven variants (array → List, object → Map).
//! Sets and bytes have no plain-JSON source; they round-trip through a
//! single-key tagged object (`{"SS": [...]}`, `{"B": "base64"}`), which is
//! also the hosted service's wire shape for those types.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An item: a mapping from attribute name to value.
///
/// `BTreeMap` keeps attribute enumeration deterministic, which snapshot
/// comparisons depend on.
pub type Item = BTreeMap<String, AttrValue>;

/// Canonical attribute value type for all API surfaces
///
/// ## Type Equality
///
/// Different types are NEVER equal, even if they contain the same "value":
/// - `Number(1.0) != String("1")`
/// - `Bytes(b"hello") != String("hello")`
///
/// Number equality follows IEEE-754 semantics:
/// - `NaN != NaN`
/// - `-0.0 == 0.0`
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Number (64-bit IEEE-754 double)
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Binary blob
    Bytes(Vec<u8>),
    /// List of values
    List(Vec<AttrValue>),
    /// Map with string keys
    Map(BTreeMap<String, AttrValue>),
    /// Set of strings
    StringSet(Vec<String>),
    /// Set of numbers
    NumberSet(Vec<f64>),
    /// Set of binary blobs
    ByteSet(Vec<Vec<u8>>),
}

// IEEE-754 float semantics for Number and NumberSet
impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Null, AttrValue::Null) => true,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Number(a), AttrValue::Number(b)) => a == b,
            (AttrValue::String(a), AttrValue::String(b)) => a == b,
            (AttrValue::Bytes(a), AttrValue::Bytes(b)) => a == b,
            (AttrValue::List(a), AttrValue::List(b)) => a == b,
            (AttrValue::Map(a), AttrValue::Map(b)) => a == b,
            (AttrValue::StringSet(a), AttrValue::StringSet(b)) => a == b,
            (AttrValue::NumberSet(a), AttrValue::NumberSet(b)) => a == b,
            (AttrValue::ByteSet(a), AttrValue::ByteSet(b)) => a == b,
            _ => false,
        }
    }
}

impl AttrValue {
    /// Get the wire type code for this value.
    ///
    /// These are the codes accepted by `attribute_type(path, code)` in
    /// condition expressions.
    pub fn type_code(&self) -> &'static str {
        match self {
            AttrValue::Null => "NULL",
            AttrValue::Bool(_) => "BOOL",
            AttrValue::Number(_) => "N",
            AttrValue::String(_) => "S",
            AttrValue::Bytes(_) => "B",
            AttrValue::List(_) => "L",
            AttrValue::Map(_) => "M",
            AttrValue::StringSet(_) => "SS",
            AttrValue::NumberSet(_) => "NS",
            AttrValue::ByteSet(_) => "BS",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Check if this is a string value
    pub fn is_string(&self) -> bool {
        matches!(self, AttrValue::String(_))
    }

    /// Check if this is a number value
    pub fn is_number(&self) -> bool {
        matches!(self, AttrValue::Number(_))
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64 if this is a Number value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[AttrValue] if this is a List value
    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Get as &BTreeMap if this is a Map value
    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Element count / length, as reported by the `size()` expression
    /// function.
    ///
    /// - String: byte length
    /// - Bytes: byte length
    /// - List: element count
    /// - Map: entry count
    /// - Sets: member count
    /// - Scalars: `None` (size() is undefined)
    pub fn size_of(&self) -> Option<usize> {
        match self {
            AttrValue::String(s) => Some(s.len()),
            AttrValue::Bytes(b) => Some(b.len()),
            AttrValue::List(l) => Some(l.len()),
            AttrValue::Map(m) => Some(m.len()),
            AttrValue::StringSet(s) => Some(s.len()),
            AttrValue::NumberSet(s) => Some(s.len()),
            AttrValue::ByteSet(s) => Some(s.len()),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for ergonomic construction
// ============================================================================

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(b: Vec<u8>) -> Self {
        AttrValue::Bytes(b)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(l: Vec<AttrValue>) -> Self {
        AttrValue::List(l)
    }
}

impl From<BTreeMap<String, AttrValue>> for AttrValue {
    fn from(m: BTreeMap<String, AttrValue>) -> Self {
        AttrValue::Map(m)
    }
}

// ============================================================================
// serde_json interop
// ============================================================================

impl From<serde_json::Value> for AttrValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => AttrValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => AttrValue::String(s),
            serde_json::Value::Array(arr) => {
                AttrValue::List(arr.into_iter().map(AttrValue::from).collect())
            }
            serde_json::Value::Object(obj) => {
                // Single-key tagged forms carry the types plain JSON cannot.
                if obj.len() == 1 {
                    let (tag, inner) = obj.iter().next().expect("len checked");
                    match (tag.as_str(), inner) {
                        ("SS", serde_json::Value::Array(a))
                            if a.iter().all(|v| v.is_string()) =>
                        {
                            return AttrValue::StringSet(
                                a.iter()
                                    .map(|v| v.as_str().expect("checked").to_string())
                                    .collect(),
                            );
                        }
                        ("NS", serde_json::Value::Array(a))
                            if a.iter().all(|v| v.is_number()) =>
                        {
                            return AttrValue::NumberSet(
                                a.iter().map(|v| v.as_f64().expect("checked")).collect(),
                            );
                        }
                        ("BS", serde_json::Value::Array(a))
                            if a.iter().all(|v| v.is_string()) =>
                        {
                            return AttrValue::ByteSet(
                                a.iter()
                                    .map(|v| base64_decode(v.as_str().expect("checked")))
                                    .collect(),
                            );
                        }
                        ("B", serde_json::Value::String(s)) => {
                            return AttrValue::Bytes(base64_decode(s));
                        }
                        _ => {}
                    }
                }
                AttrValue::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, AttrValue::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<AttrValue> for serde_json::Value {
    fn from(v: AttrValue) -> Self {
        match v {
            AttrValue::Null => serde_json::Value::Null,
            AttrValue::Bool(b) => serde_json::Value::Bool(b),
            AttrValue::Number(n) => number_to_json(n),
            AttrValue::String(s) => serde_json::Value::String(s),
            AttrValue::Bytes(b) => {
                serde_json::json!({ "B": base64_encode(&b) })
            }
            AttrValue::List(l) => {
                serde_json::Value::Array(l.into_iter().map(serde_json::Value::from).collect())
            }
            AttrValue::Map(m) => serde_json::Value::Object(
                m.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            AttrValue::StringSet(s) => serde_json::json!({ "SS": s }),
            AttrValue::NumberSet(s) => serde_json::Value::Object(
                std::iter::once((
                    "NS".to_string(),
                    serde_json::Value::Array(s.into_iter().map(number_to_json).collect()),
                ))
                .collect(),
            ),
            AttrValue::ByteSet(s) => serde_json::json!({
                "BS": s.iter().map(|b| base64_encode(b)).collect::<Vec<_>>()
            }),
        }
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttrValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(AttrValue::from(v))
    }
}

/// Render a number the way a document client does: integral values print
/// without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Convert a plain-JSON object into an Item.
///
/// Non-object input yields an empty item; callers validate shape upstream.
pub fn item_from_json(v: serde_json::Value) -> Item {
    match AttrValue::from(v) {
        AttrValue::Map(m) => m,
        _ => Item::new(),
    }
}

/// Convert an Item back into a plain-JSON object.
pub fn item_to_json(item: Item) -> serde_json::Value {
    serde_json::Value::from(AttrValue::Map(item))
}

const B64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Simple base64 encoding for bytes (no external dependency)
pub fn base64_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as usize;
        let b1 = chunk.get(1).copied().unwrap_or(0) as usize;
        let b2 = chunk.get(2).copied().unwrap_or(0) as usize;

        result.push(B64_ALPHABET[(b0 >> 2) & 0x3F] as char);
        result.push(B64_ALPHABET[((b0 << 4) | (b1 >> 4)) & 0x3F] as char);
        if chunk.len() > 1 {
            result.push(B64_ALPHABET[((b1 << 2) | (b2 >> 6)) & 0x3F] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(B64_ALPHABET[b2 & 0x3F] as char);
        } else {
            result.push('=');
        }
    }
    result
}

/// Decode base64; invalid characters are skipped, truncated input is
/// decoded as far as it goes.
pub fn base64_decode(s: &str) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut out = Vec::with_capacity(s.len() / 4 * 3);
    for c in s.bytes() {
        let v = match c {
            b'A'..=b'Z' => (c - b'A') as u32,
            b'a'..=b'z' => (c - b'a') as u32 + 26,
            b'0'..=b'9' => (c - b'0') as u32 + 52,
            b'+' => 62,
            b'/' => 63,
            _ => continue,
        };
        acc = (acc << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    out
}
