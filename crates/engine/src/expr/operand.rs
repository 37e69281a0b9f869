//! Operands: the value tokens shared by every expression surface
//!
//! An operand is a literal, a resolved value placeholder, a document path,
//! or `size(path)`. Paths and `size()` evaluate against the current item;
//! evaluation returns `None` for the MISSING sentinel.

use crate::expr::lexer::{Token, TokenStream};
use crate::expr::ExprContext;
use dynamem_core::{AttrValue, DocPath, EngineError, Item, PathSegment, Result};

/// A parsed operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal or resolved value placeholder
    Value(AttrValue),
    /// Document path, resolved against the current item
    Path(DocPath),
    /// `size(path)`
    Size(DocPath),
}

impl Operand {
    /// Evaluate against the current item. `None` is the MISSING sentinel.
    pub fn eval(&self, item: &Item) -> Option<AttrValue> {
        match self {
            Operand::Value(v) => Some(v.clone()),
            Operand::Path(path) => path.resolve(item).cloned(),
            Operand::Size(path) => path
                .resolve(item)?
                .size_of()
                .map(|n| AttrValue::Number(n as f64)),
        }
    }

    /// The path inside this operand, if it is path-shaped.
    pub fn as_path(&self) -> Option<&DocPath> {
        match self {
            Operand::Path(p) | Operand::Size(p) => Some(p),
            Operand::Value(_) => None,
        }
    }
}

/// Parse one operand from the stream.
pub fn parse_operand(ts: &mut TokenStream, ctx: &ExprContext) -> Result<Operand> {
    match ts.peek() {
        Some(Token::Number(_)) => {
            let Some(Token::Number(n)) = ts.next() else {
                unreachable!("peeked Number")
            };
            Ok(Operand::Value(AttrValue::Number(n)))
        }
        Some(Token::StringLit(_)) => {
            let Some(Token::StringLit(s)) = ts.next() else {
                unreachable!("peeked StringLit")
            };
            Ok(Operand::Value(AttrValue::String(s)))
        }
        Some(Token::ValuePlaceholder(_)) => {
            let Some(Token::ValuePlaceholder(token)) = ts.next() else {
                unreachable!("peeked ValuePlaceholder")
            };
            Ok(Operand::Value(ctx.resolve_value(&token)?.clone()))
        }
        Some(Token::Ident(ident)) => {
            if ident.eq_ignore_ascii_case("true") {
                ts.next();
                Ok(Operand::Value(AttrValue::Bool(true)))
            } else if ident.eq_ignore_ascii_case("false") {
                ts.next();
                Ok(Operand::Value(AttrValue::Bool(false)))
            } else if ident.eq_ignore_ascii_case("null") {
                ts.next();
                Ok(Operand::Value(AttrValue::Null))
            } else if ident.eq_ignore_ascii_case("size")
                && ts.peek_second() == Some(&Token::LParen)
            {
                ts.next();
                ts.next();
                let path = parse_path(ts, ctx)?;
                expect(ts, &Token::RParen)?;
                Ok(Operand::Size(path))
            } else {
                Ok(Operand::Path(parse_path(ts, ctx)?))
            }
        }
        Some(Token::NamePlaceholder(_)) => Ok(Operand::Path(parse_path(ts, ctx)?)),
        _ => Err(EngineError::validation(format!(
            "Syntax error; token: \"{}\"",
            ts.describe_next()
        ))),
    }
}

/// Parse a document path: `segment ([N])* (. segment ([N])*)*` where a
/// segment is a bare identifier or a name placeholder.
pub fn parse_path(ts: &mut TokenStream, ctx: &ExprContext) -> Result<DocPath> {
    let mut segments = Vec::new();
    loop {
        let attr = match ts.next() {
            Some(Token::Ident(name)) => name,
            Some(Token::NamePlaceholder(token)) => ctx.resolve_name(&token)?.to_string(),
            other => {
                let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
                return Err(EngineError::validation(format!(
                    "Syntax error; token: \"{near}\""
                )));
            }
        };
        segments.push(PathSegment::Attr(attr));

        while ts.eat(&Token::LBracket) {
            let index = match ts.next() {
                Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                other => {
                    let near = other.map_or_else(|| "<EOF>".to_string(), |t| t.to_string());
                    return Err(EngineError::validation(format!(
                        "Syntax error; list index must be a nonnegative integer; token: \"{near}\""
                    )));
                }
            };
            expect(ts, &Token::RBracket)?;
            segments.push(PathSegment::Index(index));
        }

        if !ts.eat(&Token::Dot) {
            break;
        }
    }
    Ok(DocPath::new(segments))
}

pub(crate) fn expect(ts: &mut TokenStream, token: &Token) -> Result<()> {
    if ts.eat(token) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "Syntax error; token: \"{}\", expected: \"{token}\"",
            ts.describe_next()
        )))
    }
}
