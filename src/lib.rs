//! A tree-walking evaluator core for a Lua 5.3-like scripting language.
//!
//! This crate covers the value/table model, the scope analyzer, and the
//! statement/expression evaluator. It never parses source text — callers
//! build an [`ast::Chunk`] (by hand, via [`ast::build`], or with their own
//! parser) and hand it to [`eval::run_chunk`].

pub mod activation;
pub mod ast;
pub mod cell;
pub mod error;
pub mod eval;
pub mod function;
pub mod harness;
pub mod host;
pub mod options;
pub mod scope;
pub mod table;
pub mod value;

pub use error::{EvalError, EvalResult};
pub use eval::{run_chunk, EvalContext};
pub use options::EvalOptions;
pub use value::Value;
