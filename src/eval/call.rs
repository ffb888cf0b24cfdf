//! The function call protocol (spec §4.8): frame push, parameter binding,
//! vararg packing, closure installation, and unwinding a `return`.

use super::stmt::eval_block_in_place;
use super::{EvalContext, Flow};
use crate::ast::FunctionDefinition;
use crate::cell::Cell;
use crate::error::{EvalError, EvalResult};
use crate::function::{Function, FunctionBody, FunctionRef, VARARG_NAME};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Build a closure `Value` for a function literal evaluated right now,
/// capturing every `Cell` currently live (spec §3.4/§4.7).
pub fn make_closure(def: FunctionDefinition, closure: HashMap<String, Cell>) -> Value {
    let f = Function::lua(Rc::new(def), closure);
    Value::Function(FunctionRef::new(f))
}

/// Call a value with the given arguments, enforcing that it is callable
/// and running the full call protocol for Lua functions.
pub fn call_value(callee: &Value, args: &[Value], ctx: &mut EvalContext) -> EvalResult<Vec<Value>> {
    match callee {
        Value::Function(f) => match &f.0.body {
            FunctionBody::Native(native) => native(args),
            FunctionBody::Lua { def, closure } => call_lua(def, closure, args, ctx),
        },
        other => Err(EvalError::BadCall {
            type_name: other.type_name(),
        }),
    }
}

fn call_lua(
    def: &Rc<FunctionDefinition>,
    closure: &HashMap<String, Cell>,
    args: &[Value],
    ctx: &mut EvalContext,
) -> EvalResult<Vec<Value>> {
    ctx.activation.push_frame(closure.clone());

    for (i, name) in def.params.iter().enumerate() {
        let v = args.get(i).cloned().unwrap_or(Value::Nil);
        ctx.activation.declare_local(name, v);
    }
    if def.is_vararg {
        let extra = if args.len() > def.params.len() {
            args[def.params.len()..].to_vec()
        } else {
            Vec::new()
        };
        ctx.activation
            .declare_local(VARARG_NAME, Value::Ellipsis(Rc::new(extra)));
    }

    let result = eval_block_in_place(&def.body, ctx);
    ctx.activation.pop_frame();

    match result? {
        Flow::Return(values) => Ok(values),
        _ => Ok(Vec::new()),
    }
}
