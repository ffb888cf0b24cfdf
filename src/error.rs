//! Error taxonomy for the evaluator core.
//!
//! Runtime and static-analysis failures are modeled as `EvalError` variants,
//! one per kind named in the error taxonomy. Non-local control flow
//! (`break`/`goto`/`return`) is deliberately *not* represented here — see
//! `eval::Flow` — those are ordinary outcomes of evaluation, not errors.

use crate::ast::Location;
use thiserror::Error;

/// Result alias used throughout the evaluator.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// An operand did not satisfy a coercion precondition (weak-int,
    /// weak-double, weak-bool, as-string, from-string-to-number).
    #[error("bad type: {0}")]
    BadType(String),

    /// Dot/subscript access on a non-table, non-userdata value.
    #[error("attempt to index a {type_name} value")]
    BadDotAccess { type_name: &'static str },

    /// Indexing a Nil value specifically.
    #[error("attempt to index a nil value")]
    NilDot,

    /// Calling a value that is not a function.
    #[error("attempt to call a {type_name} value")]
    BadCall { type_name: &'static str },

    /// Generic `for` with an empty or malformed iterator expression list.
    #[error("bad 'for' iterator: {0}")]
    BadForIn(String),

    /// Generic `for` whose iterator expression is not a function.
    #[error("attempt to call a {type_name} value (for iterator)")]
    ForInBadType { type_name: &'static str },

    /// `goto` crosses a local declared between the goto and its label.
    #[error("goto crosses local '{local}' (at {loc})")]
    CrossedLocal { local: String, loc: Location },

    /// No eligible label found anywhere in the enclosing scope.
    #[error("no visible label '{label}' for goto (at {loc})")]
    InvisibleLabel { label: String, loc: Location },

    /// The same label declared twice in one block.
    #[error("label '{label}' already defined in this block")]
    LabelAlreadyDefined { label: String },

    /// `break` used outside of any enclosing loop block.
    #[error("break outside a loop (at {loc})")]
    LonelyBreak { loc: Location },

    /// `ensure_value_type` value mismatch.
    #[error("value-equality-expected: {0}")]
    ValueEqualityExpected(String),

    /// `ensure_value_type` type mismatch.
    #[error("type-equality-expected: {0}")]
    TypeEqualityExpected(String),

    /// A host-registered function reported a failure.
    #[error("host function error: {0}")]
    Host(String),
}

impl EvalError {
    pub fn bad_type(msg: impl Into<String>) -> Self {
        EvalError::BadType(msg.into())
    }
}
