//! Key-condition expressions
//!
//! Grammar (keywords case-insensitive):
//!
//! ```text
//! {hash-attr} = {value}
//!   [ AND begins_with({range-attr}, {string-value})
//!   | AND {range-attr} BETWEEN {value} AND {value}
//!   | AND {range-attr} {= | < | <= | > | >=} {value} ]
//! ```
//!
//! Parsing resolves placeholders and coerces key values to strings (the
//! indexed attributes are always strings). The parsed range condition maps
//! onto bounds over the encoded index entry key, which is what the ordered
//! partition maps iterate by.

use crate::expr::lexer::{Token, TokenStream};
use crate::expr::ExprContext;
use crate::partition::IterBound;
use dynamem_core::{format_number, AttrValue, EngineError, Result, KEY_SEPARATOR};

/// Upper-fence sentinel appended to range-value prefixes.
const HIGH_SENTINEL: char = '\u{FFFF}';

/// A parsed key condition.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub hash_attribute: String,
    pub hash_value: String,
    pub range: Option<RangeClause>,
}

/// The optional range clause of a key condition.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeClause {
    pub attribute: String,
    pub condition: RangeCondition,
}

/// Range operators of the key-condition grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeCondition {
    Eq(String),
    Lt(String),
    Le(String),
    Gt(String),
    Ge(String),
    Between(String, String),
    BeginsWith(String),
}

impl RangeCondition {
    /// Bounds over the encoded entry key (`range + NUL + item_key`).
    pub fn entry_bounds(&self) -> (Option<IterBound>, Option<IterBound>) {
        let floor = |v: &str| format!("{v}{KEY_SEPARATOR}");
        let ceiling = |v: &str| format!("{v}{KEY_SEPARATOR}{HIGH_SENTINEL}");
        match self {
            RangeCondition::Eq(v) => (
                Some(IterBound::inclusive(floor(v))),
                Some(IterBound::inclusive(ceiling(v))),
            ),
            RangeCondition::BeginsWith(v) => (
                Some(IterBound::inclusive(floor(v))),
                Some(IterBound::inclusive(floor(&format!("{v}{HIGH_SENTINEL}")))),
            ),
            RangeCondition::Between(a, b) => (
                Some(IterBound::inclusive(floor(a))),
                Some(IterBound::inclusive(ceiling(b))),
            ),
            RangeCondition::Gt(v) => (Some(IterBound::exclusive(ceiling(v))), None),
            RangeCondition::Ge(v) => (Some(IterBound::inclusive(floor(v))), None),
            RangeCondition::Lt(v) => (None, Some(IterBound::exclusive(floor(v)))),
            RangeCondition::Le(v) => (None, Some(IterBound::inclusive(ceiling(v)))),
        }
    }

    /// Whether a stored range value satisfies this condition. Used to
    /// sanity-check continuation keys.
    pub fn matches(&self, range_value: &str) -> bool {
        match self {
            RangeCondition::Eq(v) => range_value == v,
            RangeCondition::Lt(v) => range_value < v.as_str(),
            RangeCondition::Le(v) => range_value <= v.as_str(),
            RangeCondition::Gt(v) => range_value > v.as_str(),
            RangeCondition::Ge(v) => range_value >= v.as_str(),
            RangeCondition::Between(a, b) => {
                range_value >= a.as_str() && range_value <= b.as_str()
            }
            RangeCondition::BeginsWith(v) => range_value.starts_with(v.as_str()),
        }
    }
}

/// Parse a key-condition expression.
pub fn parse_key_condition(input: &str, ctx: &ExprContext) -> Result<KeyCondition> {
    let mut ts = TokenStream::lex(input)?;

    let hash_attribute = parse_key_attribute(&mut ts, ctx)?;
    if !ts.eat(&Token::Eq) {
        return Err(syntax_error(&ts));
    }
    let hash_value = parse_key_value(&mut ts, ctx)?;

    let range = if ts.eat_keyword("AND") {
        Some(parse_range_clause(&mut ts, ctx)?)
    } else {
        None
    };

    if !ts.is_empty() {
        return Err(syntax_error(&ts));
    }
    Ok(KeyCondition {
        hash_attribute,
        hash_value,
        range,
    })
}

fn parse_range_clause(ts: &mut TokenStream, ctx: &ExprContext) -> Result<RangeClause> {
    if ts.peek().is_some_and(|t| t.is_keyword("begins_with"))
        && ts.peek_second() == Some(&Token::LParen)
    {
        ts.next();
        ts.next();
        let attribute = parse_key_attribute(ts, ctx)?;
        if !ts.eat(&Token::Comma) {
            return Err(syntax_error(ts));
        }
        let prefix = parse_string_key_value(ts, ctx)?;
        if !ts.eat(&Token::RParen) {
            return Err(syntax_error(ts));
        }
        return Ok(RangeClause {
            attribute,
            condition: RangeCondition::BeginsWith(prefix),
        });
    }

    let attribute = parse_key_attribute(ts, ctx)?;

    if ts.eat_keyword("BETWEEN") {
        let low = parse_key_value(ts, ctx)?;
        if !ts.eat_keyword("AND") {
            return Err(syntax_error(ts));
        }
        let high = parse_key_value(ts, ctx)?;
        return Ok(RangeClause {
            attribute,
            condition: RangeCondition::Between(low, high),
        });
    }

    let condition = match ts.next() {
        Some(Token::Eq) => RangeCondition::Eq(parse_key_value(ts, ctx)?),
        Some(Token::Lt) => RangeCondition::Lt(parse_key_value(ts, ctx)?),
        Some(Token::Le) => RangeCondition::Le(parse_key_value(ts, ctx)?),
        Some(Token::Gt) => RangeCondition::Gt(parse_key_value(ts, ctx)?),
        Some(Token::Ge) => RangeCondition::Ge(parse_key_value(ts, ctx)?),
        _ => return Err(syntax_error_eof()),
    };
    Ok(RangeClause {
        attribute,
        condition,
    })
}

/// Key attributes are single bare identifiers or name placeholders; no
/// nesting.
fn parse_key_attribute(ts: &mut TokenStream, ctx: &ExprContext) -> Result<String> {
    match ts.next() {
        Some(Token::Ident(name)) => Ok(name),
        Some(Token::NamePlaceholder(token)) => Ok(ctx.resolve_name(&token)?.to_string()),
        other => {
            let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
            Err(EngineError::validation(format!(
                "Invalid KeyConditionExpression: Syntax error; token: \"{near}\""
            )))
        }
    }
}

/// Key values are literals or value placeholders, coerced to the string
/// the index stores.
fn parse_key_value(ts: &mut TokenStream, ctx: &ExprContext) -> Result<String> {
    let value = match ts.next() {
        Some(Token::StringLit(s)) => AttrValue::String(s),
        Some(Token::Number(n)) => AttrValue::Number(n),
        Some(Token::ValuePlaceholder(token)) => ctx.resolve_value(&token)?.clone(),
        other => {
            let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
            return Err(EngineError::validation(format!(
                "Invalid KeyConditionExpression: Syntax error; token: \"{near}\""
            )));
        }
    };
    coerce_key_string(&value)
}

fn parse_string_key_value(ts: &mut TokenStream, ctx: &ExprContext) -> Result<String> {
    let value = match ts.next() {
        Some(Token::StringLit(s)) => AttrValue::String(s),
        Some(Token::ValuePlaceholder(token)) => ctx.resolve_value(&token)?.clone(),
        other => {
            let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
            return Err(EngineError::validation(format!(
                "Invalid KeyConditionExpression: Syntax error; token: \"{near}\""
            )));
        }
    };
    match value {
        AttrValue::String(s) => Ok(s),
        other => Err(EngineError::validation(format!(
            "Invalid KeyConditionExpression: begins_with requires a string argument, got type {}",
            other.type_code()
        ))),
    }
}

fn coerce_key_string(value: &AttrValue) -> Result<String> {
    match value {
        AttrValue::String(s) => Ok(s.clone()),
        AttrValue::Number(n) => Ok(format_number(*n)),
        other => Err(EngineError::validation(format!(
            "Invalid KeyConditionExpression: key values must be strings or numbers, got type {}",
            other.type_code()
        ))),
    }
}

fn syntax_error(ts: &TokenStream) -> EngineError {
    EngineError::validation(format!(
        "Invalid KeyConditionExpression: Syntax error; token: \"{}\"",
        ts.describe_next()
    ))
}

fn syntax_error_eof() -> EngineError {
    EngineError::validation("Invalid KeyConditionExpression: Syntax error; token: \"<EOF>\"")
}
