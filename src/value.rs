//! The tagged value type, numeric/string coercions, and value-level
//! operators (spec §3.1, §4.1).

use crate::cell::Cell;
use crate::error::{EvalError, EvalResult};
use crate::function::FunctionRef;
use crate::table::TableRef;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An immutable byte sequence. Cheap to clone (an `Rc` bump); compared by
/// content, matching spec §3.1 ("String ... equality by content").
pub type LuaStr = Rc<[u8]>;

pub fn lua_str(s: &str) -> LuaStr {
    Rc::from(s.as_bytes())
}

/// Opaque host-owned data (spec §3.1 Userdata). Reference type, identity
/// equality.
#[derive(Clone)]
pub struct UserdataRef(pub Rc<RefCell<Box<dyn std::any::Any>>>);

impl fmt::Debug for UserdataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata@{:p}", Rc::as_ptr(&self.0))
    }
}

impl UserdataRef {
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// The tagged value. Nil/Bool/Int/Double/Str/Ellipsis are value types
/// (content equality, no allocation for Nil/Bool/Int/Double per spec's
/// singleton invariant); Table/Function/Userdata are reference types
/// (identity equality), via `Rc`.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(LuaStr),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
    /// A packed `...` sequence. First-class only in specific expression
    /// positions (spec §3.1); elsewhere it must be resolved to a single
    /// value or spliced, never stored in a Cell.
    Ellipsis(Rc<Vec<Value>>),
}

/// Ulp-style tolerance used when comparing two doubles for `==`.
const EQ_EPSILON: f64 = 1e-9;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
            Value::Ellipsis(_) => "ellipsis",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// *weak-bool*: false for Nil and Bool(false), true otherwise (spec
    /// §4.1).
    pub fn weak_bool(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// *weak-int*: Int unchanged; Double with zero fractional part
    /// truncates; String parsed as integer, falling back to a
    /// zero-fractional double. `allow_double_to_int` gates the Double path
    /// per spec §9(b)/EvalOptions.
    pub fn weak_int(&self, allow_double_to_int: bool) -> EvalResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Double(d) if allow_double_to_int && d.fract() == 0.0 => Ok(*d as i64),
            Value::Str(s) => {
                let text = std::str::from_utf8(s)
                    .map_err(|_| EvalError::bad_type("string is not valid UTF-8"))?
                    .trim();
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(i);
                }
                let d: f64 = text
                    .parse()
                    .map_err(|_| EvalError::bad_type(format!("cannot convert '{}' to int", text)))?;
                if d.fract() == 0.0 {
                    Ok(d as i64)
                } else {
                    Err(EvalError::bad_type(format!(
                        "string '{}' has no integer representation",
                        text
                    )))
                }
            }
            other => Err(EvalError::bad_type(format!(
                "cannot coerce {} to int",
                other.type_name()
            ))),
        }
    }

    /// *weak-double*: Double unchanged; Int widens; String parsed via
    /// canonical text-to-double.
    pub fn weak_double(&self) -> EvalResult<f64> {
        match self {
            Value::Double(d) => Ok(*d),
            Value::Int(i) => Ok(*i as f64),
            Value::Str(s) => {
                let text = std::str::from_utf8(s)
                    .map_err(|_| EvalError::bad_type("string is not valid UTF-8"))?
                    .trim();
                text.parse::<f64>()
                    .map_err(|_| EvalError::bad_type(format!("cannot convert '{}' to number", text)))
            }
            other => Err(EvalError::bad_type(format!(
                "cannot coerce {} to number",
                other.type_name()
            ))),
        }
    }

    /// *as-string*: used by `..` and `tostring`-style conversions.
    pub fn as_string(&self) -> EvalResult<LuaStr> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(i) => Ok(lua_str(&i.to_string())),
            Value::Double(d) => Ok(lua_str(&format_double(*d))),
            Value::Nil => Ok(lua_str("nil")),
            Value::Bool(b) => Ok(lua_str(if *b { "true" } else { "false" })),
            Value::Table(t) => Ok(lua_str(&format!("table: {:p}", t.as_ptr()))),
            Value::Function(f) => Ok(lua_str(&format!("function: {:p}", f.as_ptr()))),
            Value::Userdata(u) => Ok(lua_str(&format!("userdata: {:#x}", u.identity()))),
            Value::Ellipsis(_) => Err(EvalError::bad_type("cannot convert '...' to a string")),
        }
    }

    /// *from-string-to-number*: parse as Int first (unless `force_double`),
    /// then Double.
    pub fn from_string_to_number(text: &str, force_double: bool) -> EvalResult<Value> {
        let text = text.trim();
        if !force_double {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
        }
        text.parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::bad_type(format!("'{}' is not a number", text)))
    }
}

fn format_double(d: f64) -> String {
    if d.is_infinite() {
        return if d > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if d.is_nan() {
        return "nan".to_string();
    }
    if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Ok(s) => write!(f, "{}", String::from_utf8_lossy(&s)),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Table(a), Table(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Function(a), Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Userdata(a), Userdata(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Bool(a), other) => *a == other.weak_bool(),
            (other, Bool(b)) => other.weak_bool() == *b,
            (Int(a), Int(b)) => a == b,
            (Double(a), Double(b)) => (a - b).abs() <= EQ_EPSILON * f64_max(1.0, a.abs(), b.abs()),
            (Int(a), Double(b)) | (Double(b), Int(a)) => {
                let a = *a as f64;
                (a - b).abs() <= EQ_EPSILON * f64_max(1.0, a.abs(), b.abs())
            }
            (Str(a), Str(b)) => a == b,
            _ => false,
        }
    }
}

fn f64_max(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).max(c)
}

/// An assignable location (spec §4.6's `Var::LValue`). Both a local/global
/// binding and a table field resolve to a `Cell` — `TableRef::dot`/
/// `subscript` already hand back the field's storage cell directly, so a
/// single wrapper covers both cases uniformly.
#[derive(Clone)]
pub struct LValue(pub Cell);

impl LValue {
    pub fn read(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn write(&self, value: Value) -> EvalResult<()> {
        *self.0.borrow_mut() = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_bool_matches_spec() {
        assert!(!Value::Nil.weak_bool());
        assert!(!Value::Bool(false).weak_bool());
        assert!(Value::Bool(true).weak_bool());
        assert!(Value::Int(0).weak_bool());
        assert!(Value::Str(lua_str("")).weak_bool());
    }

    #[test]
    fn string_to_double_coercion() {
        let v = Value::Str(lua_str("3.5"));
        assert_eq!(v.weak_double().unwrap(), 3.5);
    }

    #[test]
    fn int_double_equality_crosses() {
        assert_eq!(Value::Int(2), Value::Double(2.0));
    }

    #[test]
    fn string_equality_is_by_content() {
        assert_eq!(Value::Str(lua_str("hi")), Value::Str(lua_str("hi")));
    }
}
