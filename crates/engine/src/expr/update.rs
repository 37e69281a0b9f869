//! Update expressions
//!
//! Grammar (keywords case-insensitive): `SET ... [REMOVE ...]` or
//! `REMOVE ...`. SET assignments are comma-separated `path = rhs`, where
//! the rhs is a value token, top-level arithmetic `a + b` / `a - b`,
//! `if_not_exists(path, rhs)`, or `list_append(rhs, rhs)`.
//!
//! Application rules:
//! - Every rhs is evaluated against the item's state at expression start.
//! - SET requires the leaf's parent to exist; a missing intermediate step
//!   is a validation error.
//! - The primary-key attributes are immutable: SET on `PK`/`SK` is only
//!   tolerated as an identity no-op; REMOVE on them always fails.
//! - A list-index leaf may extend the list by exactly one position.
//! - REMOVE tolerates missing intermediate steps as a no-op.

use crate::expr::lexer::{Token, TokenStream};
use crate::expr::operand::{expect, parse_operand, parse_path};
use crate::expr::{ExprContext, Operand};
use dynamem_core::error::MSG_DOCUMENT_PATH_INVALID;
use dynamem_core::{
    AttrValue, DocPath, EngineError, Item, PathSegment, Result, PARTITION_KEY, SORT_KEY,
};

/// Right-hand side of a SET assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Operand(Operand),
    IfNotExists(DocPath, Box<SetValue>),
    ListAppend(Box<SetValue>, Box<SetValue>),
    Plus(Box<SetValue>, Box<SetValue>),
    Minus(Box<SetValue>, Box<SetValue>),
}

/// A parsed update expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub sets: Vec<(DocPath, SetValue)>,
    pub removes: Vec<DocPath>,
}

/// Parse an update expression.
pub fn parse_update(input: &str, ctx: &ExprContext) -> Result<UpdateExpression> {
    let mut ts = TokenStream::lex(input)?;
    let mut sets = Vec::new();
    let mut removes = Vec::new();

    if ts.eat_keyword("SET") {
        if ts.is_empty() || ts.peek().is_some_and(|t| t.is_keyword("REMOVE")) {
            return Err(empty_clause_error("SET"));
        }
        loop {
            let path = parse_path(&mut ts, ctx)?;
            expect(&mut ts, &Token::Eq)?;
            let value = parse_set_value(&mut ts, ctx)?;
            sets.push((path, value));
            if !ts.eat(&Token::Comma) {
                break;
            }
        }
        if ts.eat_keyword("REMOVE") {
            removes = parse_remove_list(&mut ts, ctx)?;
        }
    } else if ts.eat_keyword("REMOVE") {
        removes = parse_remove_list(&mut ts, ctx)?;
    } else {
        return Err(EngineError::validation(format!(
            "Invalid UpdateExpression: Syntax error; token: \"{}\"",
            ts.describe_next()
        )));
    }

    if !ts.is_empty() {
        return Err(EngineError::validation(format!(
            "Invalid UpdateExpression: Syntax error; token: \"{}\"",
            ts.describe_next()
        )));
    }
    Ok(UpdateExpression { sets, removes })
}

fn parse_remove_list(ts: &mut TokenStream, ctx: &ExprContext) -> Result<Vec<DocPath>> {
    if ts.is_empty() {
        return Err(empty_clause_error("REMOVE"));
    }
    let mut removes = Vec::new();
    loop {
        removes.push(parse_path(ts, ctx)?);
        if !ts.eat(&Token::Comma) {
            break;
        }
    }
    Ok(removes)
}

fn empty_clause_error(keyword: &str) -> EngineError {
    EngineError::validation(format!(
        "Invalid UpdateExpression: Syntax error; token: \"<EOF>\", near: \"{keyword}\""
    ))
}

fn parse_set_value(ts: &mut TokenStream, ctx: &ExprContext) -> Result<SetValue> {
    let left = parse_set_term(ts, ctx)?;
    if ts.eat(&Token::Plus) {
        let right = parse_set_term(ts, ctx)?;
        Ok(SetValue::Plus(Box::new(left), Box::new(right)))
    } else if ts.eat(&Token::Minus) {
        let right = parse_set_term(ts, ctx)?;
        Ok(SetValue::Minus(Box::new(left), Box::new(right)))
    } else {
        Ok(left)
    }
}

fn parse_set_term(ts: &mut TokenStream, ctx: &ExprContext) -> Result<SetValue> {
    if let Some(Token::Ident(name)) = ts.peek() {
        if ts.peek_second() == Some(&Token::LParen) {
            if name.eq_ignore_ascii_case("if_not_exists") {
                ts.next();
                ts.next();
                let path = parse_path(ts, ctx)?;
                expect(ts, &Token::Comma)?;
                let fallback = parse_set_value(ts, ctx)?;
                expect(ts, &Token::RParen)?;
                return Ok(SetValue::IfNotExists(path, Box::new(fallback)));
            }
            if name.eq_ignore_ascii_case("list_append") {
                ts.next();
                ts.next();
                let head = parse_set_value(ts, ctx)?;
                expect(ts, &Token::Comma)?;
                let tail = parse_set_value(ts, ctx)?;
                expect(ts, &Token::RParen)?;
                return Ok(SetValue::ListAppend(Box::new(head), Box::new(tail)));
            }
            if !name.eq_ignore_ascii_case("size") {
                return Err(EngineError::not_supported(
                    "update-expression",
                    name.to_string(),
                    format!("unsupported function: {name}"),
                ));
            }
        }
    }
    Ok(SetValue::Operand(parse_operand(ts, ctx)?))
}

impl SetValue {
    /// Evaluate against the item state at expression start.
    pub fn eval(&self, base: &Item) -> Result<AttrValue> {
        match self {
            SetValue::Operand(op) => op.eval(base).ok_or_else(|| {
                EngineError::validation(
                    "The provided expression refers to an attribute that does not exist in the item",
                )
            }),
            SetValue::IfNotExists(path, fallback) => match path.resolve(base) {
                Some(v) => Ok(v.clone()),
                None => fallback.eval(base),
            },
            SetValue::ListAppend(head, tail) => {
                match (head.eval(base)?, tail.eval(base)?) {
                    (AttrValue::List(mut h), AttrValue::List(t)) => {
                        h.extend(t);
                        Ok(AttrValue::List(h))
                    }
                    _ => Err(EngineError::validation(
                        "An operand in the update expression is not a list",
                    )),
                }
            }
            SetValue::Plus(a, b) => arith(a.eval(base)?, b.eval(base)?, |x, y| x + y),
            SetValue::Minus(a, b) => arith(a.eval(base)?, b.eval(base)?, |x, y| x - y),
        }
    }
}

fn arith(a: AttrValue, b: AttrValue, op: fn(f64, f64) -> f64) -> Result<AttrValue> {
    match (a, b) {
        (AttrValue::Number(x), AttrValue::Number(y)) => Ok(AttrValue::Number(op(x, y))),
        _ => Err(EngineError::validation(
            "An operand in the update expression is not a number",
        )),
    }
}

impl UpdateExpression {
    /// Apply to an item in place.
    ///
    /// All SET right-hand sides are evaluated against the state at entry,
    /// then assignments and removals are applied in listed order.
    pub fn apply_to(&self, item: &mut Item) -> Result<()> {
        let base = item.clone();
        for (path, value) in &self.sets {
            let resolved = value.eval(&base)?;
            set_at_path(item, path, resolved)?;
        }
        for path in &self.removes {
            remove_at_path(item, path)?;
        }
        Ok(())
    }
}

fn is_key_attribute(name: &str) -> bool {
    name == PARTITION_KEY || name == SORT_KEY
}

/// SET semantics: the leaf's parent must exist; list leaves may extend by
/// exactly one slot; primary-key attributes are immutable.
pub fn set_at_path(item: &mut Item, path: &DocPath, value: AttrValue) -> Result<()> {
    let root = path.root();
    if is_key_attribute(root) {
        // The identity assignment is a tolerated no-op.
        if path.is_top_level() && item.get(root) == Some(&value) {
            return Ok(());
        }
        return Err(EngineError::key_attribute(root));
    }

    let segments = path.segments();
    if segments.len() == 1 {
        item.insert(root.to_string(), value);
        return Ok(());
    }

    let mut current = item
        .get_mut(root)
        .ok_or_else(|| EngineError::validation(MSG_DOCUMENT_PATH_INVALID))?;
    for segment in &segments[1..segments.len() - 1] {
        current = match (segment, current) {
            (PathSegment::Attr(name), AttrValue::Map(m)) => m
                .get_mut(name)
                .ok_or_else(|| EngineError::validation(MSG_DOCUMENT_PATH_INVALID))?,
            (PathSegment::Index(i), AttrValue::List(l)) => l
                .get_mut(*i)
                .ok_or_else(|| EngineError::validation(MSG_DOCUMENT_PATH_INVALID))?,
            _ => return Err(EngineError::validation(MSG_DOCUMENT_PATH_INVALID)),
        };
    }

    match (segments.last().expect("nonempty path"), current) {
        (PathSegment::Attr(name), AttrValue::Map(m)) => {
            m.insert(name.clone(), value);
            Ok(())
        }
        (PathSegment::Index(i), AttrValue::List(l)) => {
            if *i < l.len() {
                l[*i] = value;
                Ok(())
            } else if *i == l.len() {
                l.push(value);
                Ok(())
            } else {
                Err(EngineError::validation(MSG_DOCUMENT_PATH_INVALID))
            }
        }
        _ => Err(EngineError::validation(MSG_DOCUMENT_PATH_INVALID)),
    }
}

/// REMOVE semantics: missing steps are a tolerated no-op; primary-key
/// attributes cannot be removed.
pub fn remove_at_path(item: &mut Item, path: &DocPath) -> Result<()> {
    let root = path.root();
    if is_key_attribute(root) {
        return Err(EngineError::key_attribute(root));
    }

    let segments = path.segments();
    if segments.len() == 1 {
        item.remove(root);
        return Ok(());
    }

    let Some(mut current) = item.get_mut(root) else {
        return Ok(());
    };
    for segment in &segments[1..segments.len() - 1] {
        current = match (segment, current) {
            (PathSegment::Attr(name), AttrValue::Map(m)) => match m.get_mut(name) {
                Some(next) => next,
                None => return Ok(()),
            },
            (PathSegment::Index(i), AttrValue::List(l)) => match l.get_mut(*i) {
                Some(next) => next,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
    }

    match (segments.last().expect("nonempty path"), current) {
        (PathSegment::Attr(name), AttrValue::Map(m)) => {
            m.remove(name);
        }
        (PathSegment::Index(i), AttrValue::List(l)) => {
            if *i < l.len() {
                l.remove(*i);
            }
        }
        _ => {}
    }
    Ok(())
}
