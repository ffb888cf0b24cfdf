//! Test-instrumentation surface (spec §6): the small, fixed set of
//! intrinsics a test script calls to make assertions and inspect
//! evaluator state. Intercepted by name before normal call dispatch,
//! since several of them (`locals`, `globals`, `memory`) need direct
//! access to the evaluator context that an ordinary [`crate::host::NativeFn`]
//! does not get.
//!
//! Deliberately not a standard library: no `string`/`table`/`math`
//! helpers live here, only what the scenarios in spec §8 exercise.

use crate::ast::Expression;
use crate::eval::{eval_expression, EvalContext};
use crate::error::EvalError;
use crate::table::TableRef;
use crate::value::{lua_str, Value};

const INTRINSICS: &[&str] = &[
    "ensure_value_type",
    "expect_failure",
    "print",
    "globals",
    "locals",
    "memory",
];

pub fn is_intrinsic(name: &str) -> bool {
    INTRINSICS.contains(&name)
}

/// Dispatch a call to one of the named intrinsics, returning `None` if
/// `name` is not one of them (the caller falls back to ordinary call
/// resolution, so a script is free to shadow these with its own global).
///
/// `expect_failure` is not handled here — it needs to intercept its
/// argument *before* evaluation, see [`expect_failure_raw`].
pub fn try_dispatch(
    name: &str,
    args: &[Value],
    ctx: &mut EvalContext,
) -> Option<crate::error::EvalResult<Vec<Value>>> {
    match name {
        "ensure_value_type" => Some(ensure_value_type(args)),
        "print" => Some(print_values(args)),
        "globals" => Some(globals(ctx)),
        "locals" => Some(locals(ctx)),
        "memory" => Some(memory(args)),
        _ => None,
    }
}

fn ensure_value_type(args: &[Value]) -> crate::error::EvalResult<Vec<Value>> {
    let actual = args.first().unwrap_or(&Value::Nil);
    let expected = args.get(1).unwrap_or(&Value::Nil);
    let expected_type_name = match args.get(2) {
        Some(Value::Str(s)) => String::from_utf8_lossy(s).into_owned(),
        _ => {
            return Err(EvalError::Host(
                "ensure_value_type: missing expected type name argument".to_string(),
            ))
        }
    };
    if actual.type_name() != expected_type_name {
        return Err(EvalError::TypeEqualityExpected(format!(
            "expected a {}, got a {}",
            expected_type_name,
            actual.type_name()
        )));
    }
    if actual != expected {
        return Err(EvalError::ValueEqualityExpected(format!(
            "expected {}, got {}",
            expected, actual
        )));
    }
    Ok(Vec::new())
}

/// `expect_failure(expr)` (spec §6): succeeds iff evaluating `expr` raises
/// a `bad-type` error; otherwise fails. Intercepted ahead of normal
/// argument evaluation so that a `bad-type` error raised while evaluating
/// the argument itself is the success case, not an abort of the whole call.
pub fn expect_failure_raw(
    args: &[Expression],
    ctx: &mut EvalContext,
) -> crate::error::EvalResult<Vec<Value>> {
    let expr = args
        .first()
        .ok_or_else(|| EvalError::Host("expect_failure: missing expression argument".to_string()))?;
    match eval_expression(expr, ctx) {
        Ok(_) => Err(EvalError::Host(
            "expect_failure: evaluation succeeded but a bad-type failure was expected".to_string(),
        )),
        Err(EvalError::BadType(_)) => Ok(Vec::new()),
        Err(other) => Err(EvalError::Host(format!(
            "expect_failure: expected a bad-type error, got: {}",
            other
        ))),
    }
}

fn print_values(args: &[Value]) -> crate::error::EvalResult<Vec<Value>> {
    let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join("\t"));
    Ok(Vec::new())
}

fn globals(ctx: &mut EvalContext) -> crate::error::EvalResult<Vec<Value>> {
    let table = TableRef::new();
    for (name, value) in ctx.activation.globals_snapshot() {
        table.set(Value::Str(lua_str(&name)), value)?;
    }
    Ok(vec![Value::Table(table)])
}

fn locals(ctx: &mut EvalContext) -> crate::error::EvalResult<Vec<Value>> {
    let table = TableRef::new();
    for (name, cell) in ctx.activation.live_locals() {
        table.set(Value::Str(lua_str(&name)), cell.borrow().clone())?;
    }
    Ok(vec![Value::Table(table)])
}

fn memory(args: &[Value]) -> crate::error::EvalResult<Vec<Value>> {
    let refcount = match args.first() {
        Some(Value::Table(t)) => std::rc::Rc::strong_count(&t.0),
        Some(Value::Function(f)) => std::rc::Rc::strong_count(&f.0),
        Some(Value::Userdata(u)) => std::rc::Rc::strong_count(&u.0),
        Some(other) => {
            return Err(EvalError::bad_type(format!(
                "memory: {} is not a heap-allocated value",
                other.type_name()
            )))
        }
        None => return Err(EvalError::Host("memory: missing argument".to_string())),
    };
    Ok(vec![Value::Int(refcount as i64)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalContext;

    #[test]
    fn ensure_value_type_passes_on_match() {
        let mut ctx = EvalContext::default();
        let r = try_dispatch(
            "ensure_value_type",
            &[Value::Int(1), Value::Int(1), Value::Str(lua_str("int"))],
            &mut ctx,
        )
        .unwrap();
        assert!(r.is_ok());
    }

    #[test]
    fn ensure_value_type_rejects_type_mismatch() {
        let mut ctx = EvalContext::default();
        let r = try_dispatch(
            "ensure_value_type",
            &[Value::Int(1), Value::Double(1.0), Value::Str(lua_str("double"))],
            &mut ctx,
        )
        .unwrap();
        assert!(matches!(r, Err(EvalError::TypeEqualityExpected(_))));
    }

    #[test]
    fn expect_failure_succeeds_when_evaluation_raises_bad_type() {
        use crate::ast::build::{int, un};
        use crate::ast::UnaryOp;

        let mut ctx = EvalContext::default();
        let raising = un(UnaryOp::Len, int(1));
        let r = expect_failure_raw(&[raising], &mut ctx).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn expect_failure_fails_when_evaluation_succeeds() {
        use crate::ast::build::int;

        let mut ctx = EvalContext::default();
        let err = expect_failure_raw(&[int(1)], &mut ctx).unwrap_err();
        assert!(matches!(err, EvalError::Host(_)));
    }

    #[test]
    fn memory_reports_table_refcount() {
        let t = TableRef::new();
        let extra = t.clone();
        let expected = std::rc::Rc::strong_count(&extra.0) as i64;
        let r = memory(&[Value::Table(t)]).unwrap();
        assert_eq!(r[0], Value::Int(expected));
    }
}
