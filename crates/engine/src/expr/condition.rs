//! Condition / filter expression parsing and evaluation
//!
//! A boolean expression over clauses combined with case-insensitive
//! `AND`/`OR` (AND binds tighter) and parentheses. Supported clauses:
//!
//! - `attribute_exists(path)` / `attribute_not_exists(path)`
//! - `begins_with(path, value)` / `contains(container, value)`
//! - `attribute_type(path, code)`
//! - `path BETWEEN value AND value`
//! - comparisons `= <> < <= > >=`, with `size(path)` on either side
//!
//! Any referenced path that is MISSING makes its predicate false, except
//! `attribute_not_exists` (true on missing) and `attribute_exists` (false
//! on missing).

use crate::expr::lexer::{Token, TokenStream};
use crate::expr::operand::{expect, parse_operand, parse_path};
use crate::expr::{ExprContext, Operand};
use dynamem_core::{AttrValue, DocPath, EngineError, Item, Result};
use std::cmp::Ordering;

/// Comparison operators usable in condition clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
    Compare(Operand, CmpOp, Operand),
    Between(Operand, Operand, Operand),
    AttributeExists(DocPath),
    AttributeNotExists(DocPath),
    BeginsWith(DocPath, Operand),
    Contains(Operand, Operand),
    AttributeType(DocPath, String),
}

const TYPE_CODES: &[&str] = &["S", "N", "BOOL", "NULL", "L", "M", "B", "SS", "NS", "BS"];

/// Parse a condition or filter expression.
pub fn parse_condition(input: &str, ctx: &ExprContext) -> Result<CondExpr> {
    let mut ts = TokenStream::lex(input)?;
    let expr = parse_or(&mut ts, ctx)?;
    if !ts.is_empty() {
        return Err(EngineError::validation(format!(
            "Syntax error; token: \"{}\"",
            ts.describe_next()
        )));
    }
    Ok(expr)
}

fn parse_or(ts: &mut TokenStream, ctx: &ExprContext) -> Result<CondExpr> {
    let mut left = parse_and(ts, ctx)?;
    while ts.eat_keyword("OR") {
        let right = parse_and(ts, ctx)?;
        left = CondExpr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(ts: &mut TokenStream, ctx: &ExprContext) -> Result<CondExpr> {
    let mut left = parse_primary(ts, ctx)?;
    while ts.eat_keyword("AND") {
        let right = parse_primary(ts, ctx)?;
        left = CondExpr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_primary(ts: &mut TokenStream, ctx: &ExprContext) -> Result<CondExpr> {
    if ts.eat(&Token::LParen) {
        let inner = parse_or(ts, ctx)?;
        expect(ts, &Token::RParen)?;
        return Ok(inner);
    }

    // Function clause?
    if let Some(Token::Ident(name)) = ts.peek() {
        if ts.peek_second() == Some(&Token::LParen) {
            let lowered = name.to_ascii_lowercase();
            match lowered.as_str() {
                "attribute_exists" | "attribute_not_exists" | "begins_with" | "contains"
                | "attribute_type" => {
                    ts.next();
                    ts.next();
                    let clause = parse_function_clause(&lowered, ts, ctx)?;
                    expect(ts, &Token::RParen)?;
                    return Ok(clause);
                }
                // size() starts a comparison clause, handled below.
                "size" => {}
                other => {
                    return Err(EngineError::not_supported(
                        "condition-expression",
                        other.to_string(),
                        format!("unsupported function: {other}"),
                    ));
                }
            }
        } else if name.eq_ignore_ascii_case("not") {
            return Err(EngineError::not_supported(
                "condition-expression",
                "NOT",
                "NOT is outside the supported expression subset",
            ));
        }
    }

    let left = parse_operand(ts, ctx)?;
    if ts.eat_keyword("BETWEEN") {
        let low = parse_operand(ts, ctx)?;
        if !ts.eat_keyword("AND") {
            return Err(EngineError::validation(format!(
                "Syntax error; token: \"{}\", expected: \"AND\"",
                ts.describe_next()
            )));
        }
        let high = parse_operand(ts, ctx)?;
        return Ok(CondExpr::Between(left, low, high));
    }

    let op = match ts.next() {
        Some(Token::Eq) => CmpOp::Eq,
        Some(Token::Ne) => CmpOp::Ne,
        Some(Token::Lt) => CmpOp::Lt,
        Some(Token::Le) => CmpOp::Le,
        Some(Token::Gt) => CmpOp::Gt,
        Some(Token::Ge) => CmpOp::Ge,
        other => {
            let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
            return Err(EngineError::validation(format!(
                "Syntax error; token: \"{near}\""
            )));
        }
    };
    let right = parse_operand(ts, ctx)?;
    Ok(CondExpr::Compare(left, op, right))
}

fn parse_function_clause(
    name: &str,
    ts: &mut TokenStream,
    ctx: &ExprContext,
) -> Result<CondExpr> {
    match name {
        "attribute_exists" => Ok(CondExpr::AttributeExists(parse_path(ts, ctx)?)),
        "attribute_not_exists" => Ok(CondExpr::AttributeNotExists(parse_path(ts, ctx)?)),
        "begins_with" => {
            let path = parse_path(ts, ctx)?;
            expect(ts, &Token::Comma)?;
            let prefix = parse_operand(ts, ctx)?;
            Ok(CondExpr::BeginsWith(path, prefix))
        }
        "contains" => {
            let container = parse_operand(ts, ctx)?;
            expect(ts, &Token::Comma)?;
            let value = parse_operand(ts, ctx)?;
            Ok(CondExpr::Contains(container, value))
        }
        "attribute_type" => {
            let path = parse_path(ts, ctx)?;
            expect(ts, &Token::Comma)?;
            let code = match parse_operand(ts, ctx)? {
                Operand::Value(AttrValue::String(code)) => code,
                other => {
                    return Err(EngineError::validation(format!(
                        "Invalid attribute_type argument: {other:?}"
                    )))
                }
            };
            if !TYPE_CODES.contains(&code.as_str()) {
                return Err(EngineError::validation(format!(
                    "Invalid attribute_type argument; type: \"{code}\""
                )));
            }
            Ok(CondExpr::AttributeType(path, code))
        }
        _ => unreachable!("caller dispatches known functions"),
    }
}

impl CondExpr {
    /// Evaluate against an item.
    pub fn evaluate(&self, item: &Item) -> bool {
        match self {
            CondExpr::And(a, b) => a.evaluate(item) && b.evaluate(item),
            CondExpr::Or(a, b) => a.evaluate(item) || b.evaluate(item),
            CondExpr::Compare(left, op, right) => {
                match (left.eval(item), right.eval(item)) {
                    (Some(a), Some(b)) => compare(*op, &a, &b),
                    // MISSING on either side: predicate is false.
                    _ => false,
                }
            }
            CondExpr::Between(value, low, high) => {
                match (value.eval(item), low.eval(item), high.eval(item)) {
                    (Some(v), Some(lo), Some(hi)) => {
                        compare(CmpOp::Ge, &v, &lo) && compare(CmpOp::Le, &v, &hi)
                    }
                    _ => false,
                }
            }
            CondExpr::AttributeExists(path) => path.resolve(item).is_some(),
            CondExpr::AttributeNotExists(path) => path.resolve(item).is_none(),
            CondExpr::BeginsWith(path, prefix) => {
                let (Some(AttrValue::String(value)), Some(AttrValue::String(prefix))) =
                    (path.resolve(item).cloned(), prefix.eval(item))
                else {
                    return false;
                };
                value.starts_with(&prefix)
            }
            CondExpr::Contains(container, value) => {
                match (container.eval(item), value.eval(item)) {
                    (Some(c), Some(v)) => contains(&c, &v),
                    _ => false,
                }
            }
            CondExpr::AttributeType(path, code) => path
                .resolve(item)
                .is_some_and(|v| v.type_code() == code),
        }
    }
}

/// Value comparison: deep equality for `=`/`<>`; ordered comparison for
/// numbers, strings, and bytes. Mismatched or unordered types compare
/// false.
pub fn compare(op: CmpOp, a: &AttrValue, b: &AttrValue) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        _ => {
            let Some(ordering) = order(a, b) else {
                return false;
            };
            match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::Ge => ordering != Ordering::Less,
                CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
            }
        }
    }
}

fn order(a: &AttrValue, b: &AttrValue) -> Option<Ordering> {
    match (a, b) {
        (AttrValue::Number(x), AttrValue::Number(y)) => x.partial_cmp(y),
        (AttrValue::String(x), AttrValue::String(y)) => Some(x.cmp(y)),
        (AttrValue::Bytes(x), AttrValue::Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(container: &AttrValue, value: &AttrValue) -> bool {
    match container {
        AttrValue::String(s) => match value {
            AttrValue::String(sub) => s.contains(sub.as_str()),
            _ => false,
        },
        AttrValue::List(items) => items.iter().any(|v| v == value),
        AttrValue::StringSet(members) => match value {
            AttrValue::String(s) => members.iter().any(|m| m == s),
            _ => false,
        },
        AttrValue::NumberSet(members) => match value {
            AttrValue::Number(n) => members.iter().any(|m| m == n),
            _ => false,
        },
        AttrValue::ByteSet(members) => match value {
            AttrValue::Bytes(b) => members.iter().any(|m| m == b),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamem_core::item_from_json;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ctx_with(values: &[(&str, AttrValue)]) -> ExprContext {
        ExprContext::new(
            BTreeMap::new(),
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn eval(input: &str, item: &Item, values: &[(&str, AttrValue)]) -> bool {
        parse_condition(input, &ctx_with(values))
            .unwrap()
            .evaluate(item)
    }

    fn sample() -> Item {
        item_from_json(json!({
            "PK": "K",
            "status": "active",
            "count": 5,
            "tags": ["red", "blue"],
            "profile": {"name": "a", "age": 30},
            "nil": null,
        }))
    }

    #[test]
    fn test_comparisons() {
        let item = sample();
        assert!(eval("count = :v", &item, &[(":v", AttrValue::Number(5.0))]));
        assert!(eval("count <> :v", &item, &[(":v", AttrValue::Number(6.0))]));
        assert!(eval("count > :v", &item, &[(":v", AttrValue::Number(4.0))]));
        assert!(eval("count <= :v", &item, &[(":v", AttrValue::Number(5.0))]));
        assert!(eval(
            "status < :v",
            &item,
            &[(":v", AttrValue::from("b"))]
        ));
    }

    #[test]
    fn test_type_mismatch_compares_false() {
        let item = sample();
        // count is a number, :v a string: ordered comparison is false.
        assert!(!eval("count > :v", &item, &[(":v", AttrValue::from("4"))]));
        assert!(!eval("count = :v", &item, &[(":v", AttrValue::from("5"))]));
    }

    #[test]
    fn test_missing_path_is_false() {
        let item = sample();
        assert!(!eval("absent = :v", &item, &[(":v", AttrValue::Number(1.0))]));
        assert!(!eval(
            "absent <> :v",
            &item,
            &[(":v", AttrValue::Number(1.0))]
        ));
    }

    #[test]
    fn test_attribute_exists_and_not_exists() {
        let item = sample();
        assert!(eval("attribute_exists(PK)", &item, &[]));
        assert!(eval("attribute_exists(nil)", &item, &[]));
        assert!(!eval("attribute_exists(absent)", &item, &[]));
        assert!(eval("attribute_not_exists(absent)", &item, &[]));
        assert!(!eval("attribute_not_exists(nil)", &item, &[]));
    }

    #[test]
    fn test_begins_with() {
        let item = sample();
        assert!(eval(
            "begins_with(status, :p)",
            &item,
            &[(":p", AttrValue::from("act"))]
        ));
        assert!(!eval(
            "begins_with(status, :p)",
            &item,
            &[(":p", AttrValue::from("x"))]
        ));
        // Non-string prefix: false, not an error, in filter position.
        assert!(!eval(
            "begins_with(status, :p)",
            &item,
            &[(":p", AttrValue::Number(1.0))]
        ));
    }

    #[test]
    fn test_contains() {
        let item = sample();
        assert!(eval(
            "contains(status, :s)",
            &item,
            &[(":s", AttrValue::from("tiv"))]
        ));
        assert!(eval(
            "contains(tags, :s)",
            &item,
            &[(":s", AttrValue::from("blue"))]
        ));
        assert!(!eval(
            "contains(tags, :s)",
            &item,
            &[(":s", AttrValue::from("green"))]
        ));
    }

    #[test]
    fn test_contains_on_sets() {
        let mut item = sample();
        item.insert(
            "colors".into(),
            AttrValue::StringSet(vec!["red".into(), "blue".into()]),
        );
        item.insert("nums".into(), AttrValue::NumberSet(vec![1.0, 2.0]));
        assert!(eval(
            "contains(colors, :s)",
            &item,
            &[(":s", AttrValue::from("red"))]
        ));
        assert!(eval(
            "contains(nums, :n)",
            &item,
            &[(":n", AttrValue::Number(2.0))]
        ));
    }

    #[test]
    fn test_attribute_type() {
        let item = sample();
        assert!(eval("attribute_type(status, :t)", &item, &[(":t", AttrValue::from("S"))]));
        assert!(eval("attribute_type(count, :t)", &item, &[(":t", AttrValue::from("N"))]));
        assert!(eval("attribute_type(nil, :t)", &item, &[(":t", AttrValue::from("NULL"))]));
        assert!(eval("attribute_type(tags, :t)", &item, &[(":t", AttrValue::from("L"))]));
        assert!(!eval("attribute_type(absent, :t)", &item, &[(":t", AttrValue::from("S"))]));
    }

    #[test]
    fn test_attribute_type_rejects_bad_code() {
        let err = parse_condition(
            "attribute_type(status, :t)",
            &ctx_with(&[(":t", AttrValue::from("STR"))]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("STR"));
    }

    #[test]
    fn test_between() {
        let item = sample();
        assert!(eval(
            "count BETWEEN :a AND :b",
            &item,
            &[(":a", AttrValue::Number(1.0)), (":b", AttrValue::Number(9.0))]
        ));
        assert!(!eval(
            "count between :a and :b",
            &item,
            &[(":a", AttrValue::Number(6.0)), (":b", AttrValue::Number(9.0))]
        ));
    }

    #[test]
    fn test_size_in_comparison() {
        let item = sample();
        assert!(eval(
            "size(tags) = :n",
            &item,
            &[(":n", AttrValue::Number(2.0))]
        ));
        assert!(eval(
            ":n <= size(status)",
            &item,
            &[(":n", AttrValue::Number(3.0))]
        ));
        assert!(eval(
            "size(profile) = :n",
            &item,
            &[(":n", AttrValue::Number(2.0))]
        ));
    }

    #[test]
    fn test_and_or_precedence_and_parens() {
        let item = sample();
        // AND binds tighter: false OR (true AND true) = true
        assert!(eval(
            "absent = :one OR count = :five AND status = :active",
            &item,
            &[
                (":one", AttrValue::Number(1.0)),
                (":five", AttrValue::Number(5.0)),
                (":active", AttrValue::from("active")),
            ]
        ));
        // Parenthesized: (false OR true) AND false = false
        assert!(!eval(
            "(absent = :one OR count = :five) AND status = :missing",
            &item,
            &[
                (":one", AttrValue::Number(1.0)),
                (":five", AttrValue::Number(5.0)),
                (":missing", AttrValue::from("gone")),
            ]
        ));
    }

    #[test]
    fn test_unknown_function_names_offender() {
        let err = parse_condition("attribute_kind(a)", &ctx_with(&[])).unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("attribute_kind"));
    }

    #[test]
    fn test_not_is_unsupported() {
        let err = parse_condition("NOT a = :v", &ctx_with(&[(":v", AttrValue::Null)])).unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_missing_value_placeholder_fails_parse() {
        let err = parse_condition("a = :gone", &ctx_with(&[])).unwrap_err();
        assert!(err.to_string().contains(":gone"));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse_condition(
            "a = :v b",
            &ctx_with(&[(":v", AttrValue::Number(1.0))]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Syntax error"));
    }
}
