//! Function objects (spec §3.4): formal parameters, body, and a closure
//! capturing the Cells live in the enclosing blocks at definition time.

use crate::ast::FunctionDefinition;
use crate::cell::Cell;
use crate::error::EvalResult;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Sentinel parameter name bound to the packed varargs, matching the
/// convention the spec names for `...` (§3.4).
pub const VARARG_NAME: &str = "...";

/// A native function registered by the host (spec §6, "Host-language
/// function interface") or by the test-instrumentation surface (§6).
pub type NativeFn = Rc<dyn Fn(&[Value]) -> EvalResult<Vec<Value>>>;

pub enum FunctionBody {
    /// A Lua function: formal parameters plus an AST body.
    Lua {
        def: Rc<FunctionDefinition>,
        /// Captured local names to the Cells they referred to at
        /// definition time (spec §3.4). By-Cell, not by-value: later
        /// mutation of the captured local is visible through the closure.
        closure: HashMap<String, Cell>,
    },
    /// A function supplied by the host or test harness.
    Native(NativeFn),
}

pub struct Function {
    pub body: FunctionBody,
}

impl Function {
    pub fn lua(def: Rc<FunctionDefinition>, closure: HashMap<String, Cell>) -> Self {
        Function {
            body: FunctionBody::Lua { def, closure },
        }
    }

    pub fn native(f: NativeFn) -> Self {
        Function {
            body: FunctionBody::Native(f),
        }
    }

    pub fn is_vararg(&self) -> bool {
        match &self.body {
            FunctionBody::Lua { def, .. } => def.is_vararg,
            FunctionBody::Native(_) => true,
        }
    }
}

/// Reference-typed handle to a heap-allocated function (spec §3.1).
#[derive(Clone)]
pub struct FunctionRef(pub Rc<Function>);

impl FunctionRef {
    pub fn new(f: Function) -> Self {
        FunctionRef(Rc::new(f))
    }

    pub fn as_ptr(&self) -> *const Function {
        Rc::as_ptr(&self.0)
    }

    pub fn identity(&self) -> usize {
        self.as_ptr() as usize
    }
}

impl std::fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function@{:p}", self.as_ptr())
    }
}
