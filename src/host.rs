//! Host-language function interface (spec §6): how a Rust caller exposes
//! a native function to evaluated code, and how argument/result values
//! convert to and from native Rust types.

use crate::error::{EvalError, EvalResult};
use crate::function::{Function, FunctionRef, NativeFn};
use crate::value::{lua_str, Value};
use std::rc::Rc;

/// Converts between `Value` and a native Rust type at a host function's
/// boundary. Implemented for the primitive types a host function
/// typically wants; anything else stays a `Value` and is matched by hand.
pub trait Converter: Sized {
    fn from_value(v: &Value) -> EvalResult<Self>;
    fn into_value(self) -> Value;
}

impl Converter for i64 {
    fn from_value(v: &Value) -> EvalResult<Self> {
        v.weak_int(true)
    }
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl Converter for f64 {
    fn from_value(v: &Value) -> EvalResult<Self> {
        v.weak_double()
    }
    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl Converter for bool {
    fn from_value(v: &Value) -> EvalResult<Self> {
        Ok(v.weak_bool())
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Converter for String {
    fn from_value(v: &Value) -> EvalResult<Self> {
        let s = v.as_string()?;
        Ok(String::from_utf8_lossy(&s).into_owned())
    }
    fn into_value(self) -> Value {
        Value::Str(lua_str(&self))
    }
}

/// Build a callable [`Value`] from a Rust closure, for a host embedding
/// evaluated code (spec §6). The harness in [`crate::harness`] uses the
/// same constructor for its test-instrumentation intrinsics.
pub fn native_function<F>(f: F) -> Value
where
    F: Fn(&[Value]) -> EvalResult<Vec<Value>> + 'static,
{
    let native: NativeFn = Rc::new(f);
    Value::Function(FunctionRef::new(Function::native(native)))
}

/// Fetch the `n`th argument, converting it, or fail with a host error
/// naming which argument was missing or of the wrong type.
pub fn arg<T: Converter>(args: &[Value], n: usize, fn_name: &str) -> EvalResult<T> {
    let v = args
        .get(n)
        .ok_or_else(|| EvalError::Host(format!("{}: missing argument {}", fn_name, n + 1)))?;
    T::from_value(v).map_err(|e| EvalError::Host(format!("{}: argument {}: {}", fn_name, n + 1, e)))
}
