//! Error types for the dynamem engine
//!
//! All operational errors fall into four kinds:
//!
//! - **NotSupported**: the input uses a parameter, method, or expression
//!   feature outside the emulated subset. Raised by the surface manifest and
//!   the expression engine; the operation surface rewrites expression-level
//!   `NotSupported` into `Validation` so callers see the hosted service's
//!   error shape.
//! - **Validation**: malformed input (bad key shapes, bad expressions,
//!   duplicate batch keys, bad limits).
//! - **ConditionalCheckFailed**: a condition expression evaluated false.
//! - **TransactionCanceled**: any failure inside a transact-write; carries
//!   the per-entry cancellation reasons mirror.
//!
//! Validation and NotSupported errors never mutate state. A failed
//! condition on a single operation mutates nothing. A failed transaction
//! rolls back every mutation it performed before raising.
//!
//! ## Message compatibility
//!
//! Several messages interchange with a wire-compatible hosted service and
//! are part of the external interface. They are hard-coded here, byte for
//! byte, rather than scattered across call sites.

use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

// =============================================================================
// Wire-compatible message fragments (frozen)
// =============================================================================

/// Query/scan `ExclusiveStartKey` rejection.
pub const MSG_STARTING_KEY_INVALID: &str = "The provided starting key is invalid";

/// `ConsistentRead = true` against any GSI.
pub const MSG_CONSISTENT_READ_ON_GSI: &str =
    "Consistent reads are not supported on global secondary indexes";

/// SET through a missing intermediate path step.
pub const MSG_DOCUMENT_PATH_INVALID: &str =
    "The document path provided in the update expression is invalid for update";

/// Two transact-write entries addressing the same (table, PK, SK).
pub const MSG_TRANSACTION_DUPLICATE_ITEM: &str =
    "Transaction request cannot include multiple operations on one item";

/// A value placeholder referenced by an expression but absent from
/// `ExpressionAttributeValues`.
pub fn msg_undefined_value(token: &str) -> String {
    format!("An expression attribute value used in expression is not defined; attribute value: {token}")
}

/// A name placeholder referenced by a document path but absent from
/// `ExpressionAttributeNames`.
pub fn msg_undefined_name(token: &str) -> String {
    format!("An expression attribute name used in the document path is not defined; attribute name: {token}")
}

// =============================================================================
// Cancellation reasons
// =============================================================================

/// Per-entry cancellation reason inside a canceled transact-write.
///
/// The reasons list mirrors the transaction's entries: the failing entry
/// carries its failure kind, every other entry reads `None`. A key-attribute
/// validation failure collapses the mirror to a single `ValidationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Entry did not cause the cancellation
    None,
    /// Entry's condition expression evaluated false
    ConditionalCheckFailed,
    /// Entry failed key-attribute validation
    ValidationError,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::None => "None",
            CancelReason::ConditionalCheckFailed => "ConditionalCheckFailed",
            CancelReason::ValidationError => "ValidationError",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn format_reasons(reasons: &[CancelReason]) -> String {
    let inner: Vec<&str> = reasons.iter().map(CancelReason::as_str).collect();
    format!("[{}]", inner.join(", "))
}

// =============================================================================
// EngineError
// =============================================================================

/// Unified error type for all engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Parameter, method, or expression feature outside the emulated subset
    #[error("{method} does not support {feature}: {reason}")]
    NotSupported {
        /// Method the caller invoked
        method: String,
        /// Offending parameter or feature path
        feature: String,
        /// Why it is out of scope
        reason: String,
    },

    /// Malformed input
    #[error("{message}")]
    Validation {
        /// Wire-compatible message
        message: String,
    },

    /// SET or REMOVE addressed a primary-key attribute
    #[error("One or more parameter values were invalid: Cannot update attribute {attribute}. This attribute is part of the key")]
    KeyAttributeViolation {
        /// The key attribute the expression tried to mutate
        attribute: String,
    },

    /// A condition expression evaluated false
    #[error("The conditional request failed")]
    ConditionalCheckFailed,

    /// A transact-write aborted and rolled back
    #[error("Transaction cancelled, please refer cancellation reasons for specific reasons {}", format_reasons(.reasons))]
    TransactionCanceled {
        /// Per-entry reasons mirror
        reasons: Vec<CancelReason>,
    },
}

impl EngineError {
    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    /// Create a NotSupported error
    pub fn not_supported(
        method: impl Into<String>,
        feature: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::NotSupported {
            method: method.into(),
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// Create a KeyAttributeViolation error
    pub fn key_attribute(attribute: impl Into<String>) -> Self {
        EngineError::KeyAttributeViolation {
            attribute: attribute.into(),
        }
    }

    /// Create a TransactionCanceled error
    pub fn transaction_canceled(reasons: Vec<CancelReason>) -> Self {
        EngineError::TransactionCanceled { reasons }
    }

    /// Check if this is a validation-tier error
    ///
    /// Key-attribute violations are validation errors with a dedicated
    /// variant so the transaction processor can map them to
    /// `[ValidationError]`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation { .. } | EngineError::KeyAttributeViolation { .. }
        )
    }

    /// Check if this is a NotSupported error
    pub fn is_not_supported(&self) -> bool {
        matches!(self, EngineError::NotSupported { .. })
    }

    /// Check if this is a failed condition
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, EngineError::ConditionalCheckFailed)
    }

    /// Check if this is a canceled transaction
    pub fn is_transaction_canceled(&self) -> bool {
        matches!(self, EngineError::TransactionCanceled { .. })
    }

    /// Rewrite expression-level NotSupported into Validation, keeping the
    /// rendered message.
    ///
    /// The hosted service reports unsupported expression constructs as
    /// validation failures; the operation surface applies this before
    /// returning expression errors to callers.
    pub fn into_validation(self) -> Self {
        match self {
            EngineError::NotSupported { .. } => {
                let message = self.to_string();
                EngineError::Validation { message }
            }
            other => other,
        }
    }
}
