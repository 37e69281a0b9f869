//! Expression engine
//!
//! Parses and evaluates the four expression surfaces:
//!
//! - key-condition expressions ([`key_condition`])
//! - condition / filter expressions ([`condition`])
//! - update expressions ([`update`])
//!
//! All of them share one tokenizer ([`lexer`]) and one operand layer
//! ([`operand`]) covering literals, placeholders, document paths, and
//! `size()`.
//!
//! Placeholders resolve through the caller-supplied [`ExprContext`] at
//! parse time, so a missing `#name`/`:value` fails before anything is
//! evaluated, matching the hosted service, which validates expressions
//! up front.

pub mod condition;
pub mod key_condition;
pub mod lexer;
pub mod operand;
pub mod update;

pub use condition::{parse_condition, CondExpr};
pub use key_condition::{parse_key_condition, KeyCondition, RangeCondition};
pub use operand::Operand;
pub use update::{parse_update, UpdateExpression};

use dynamem_core::error::{msg_undefined_name, msg_undefined_value};
use dynamem_core::{AttrValue, EngineError, Result};
use std::collections::BTreeMap;

/// Placeholder resolution maps for one expression evaluation.
#[derive(Debug, Default)]
pub struct ExprContext {
    names: BTreeMap<String, String>,
    values: BTreeMap<String, AttrValue>,
}

impl ExprContext {
    pub fn new(names: BTreeMap<String, String>, values: BTreeMap<String, AttrValue>) -> Self {
        Self { names, values }
    }

    /// Resolve a `#name` token to the substituted attribute name.
    pub fn resolve_name(&self, token: &str) -> Result<&str> {
        self.names
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| EngineError::validation(msg_undefined_name(token)))
    }

    /// Resolve a `:value` token to the supplied value.
    pub fn resolve_value(&self, token: &str) -> Result<&AttrValue> {
        self.values
            .get(token)
            .ok_or_else(|| EngineError::validation(msg_undefined_value(token)))
    }
}
