//! The tree-walking evaluator (spec §4.6-§4.8): expression evaluation,
//! statement execution, and the function call protocol.

mod call;
mod expr;
mod stmt;

pub use call::call_value;
pub use expr::eval_multi as eval_expression;

use crate::activation::Activation;
use crate::ast::{Chunk, Location};
use crate::error::{EvalError, EvalResult};
use crate::options::EvalOptions;
use crate::value::Value;

/// The non-local control-flow outcomes of executing a statement or block
/// (spec §9's design note: modeled as a return value, not a Rust
/// exception/panic).
#[derive(Debug, Clone)]
pub enum Flow {
    /// Fell off the end normally.
    Normal,
    /// `break` is unwinding to the nearest enclosing loop.
    Break,
    /// `goto` is unwinding looking for its label.
    Goto(String, Location),
    /// `return` is unwinding to the calling function with its values.
    Return(Vec<Value>),
}

/// Everything the evaluator threads through a run: the live bindings and
/// the active configuration.
pub struct EvalContext {
    pub activation: Activation,
    pub options: EvalOptions,
}

impl EvalContext {
    pub fn new(options: EvalOptions) -> Self {
        EvalContext {
            activation: Activation::new(),
            options,
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(EvalOptions::default())
    }
}

/// Run a whole chunk as the body of an implicit vararg function, returning
/// whatever it returns (spec §4.8: a chunk is evaluated like a call).
///
/// The scope analyzer's pre-pass (C4) runs first: a chunk with a lonely
/// `break`, a `goto` crossing a local, or an unresolvable label is rejected
/// before any statement executes, not discovered mid-run.
pub fn run_chunk(chunk: &Chunk, ctx: &mut EvalContext) -> EvalResult<Vec<Value>> {
    crate::scope::analyze(chunk)?;
    match stmt::eval_block_in_place(&chunk.block, ctx)? {
        Flow::Return(values) => Ok(values),
        Flow::Normal => Ok(Vec::new()),
        Flow::Break => Err(EvalError::LonelyBreak { loc: Location::unknown() }),
        Flow::Goto(label, loc) => Err(EvalError::InvisibleLabel { label, loc }),
    }
}
