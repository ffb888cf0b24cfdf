//! Expression evaluation (spec §4.6): the `Var` union of r-value/l-value/
//! list results, operator dispatch, and table-constructor evaluation.

use super::{call_value, EvalContext};
use crate::ast::{BinaryOp, Expression, FunctionCall, NumberLiteral, TableField, UnaryOp, Variable};
use crate::error::{EvalError, EvalResult};
use crate::table::TableRef;
use crate::value::{lua_str, LValue, Value};

/// Evaluate an expression, collapsing any multi-value result (a call or
/// `...`) down to its first value, or Nil if it produced none — the
/// adjustment every non-final position in an expression list applies.
pub fn eval_single(expr: &Expression, ctx: &mut EvalContext) -> EvalResult<Value> {
    Ok(eval_multi(expr, ctx)?.into_iter().next().unwrap_or(Value::Nil))
}

/// Evaluate an expression keeping every value it can produce: a call's
/// full return list, `...`'s full pack, or a single-element vec for
/// anything else.
pub fn eval_multi(expr: &Expression, ctx: &mut EvalContext) -> EvalResult<Vec<Value>> {
    match expr {
        Expression::Call(call) => eval_call(call, ctx),
        Expression::Vararg => match ctx.activation.read_name(crate::function::VARARG_NAME) {
            Value::Ellipsis(values) => Ok((*values).clone()),
            _ => Ok(Vec::new()),
        },
        other => Ok(vec![eval_one(other, ctx)?]),
    }
}

fn eval_one(expr: &Expression, ctx: &mut EvalContext) -> EvalResult<Value> {
    match expr {
        Expression::Nil => Ok(Value::Nil),
        Expression::Boolean(b) => Ok(Value::Bool(*b)),
        Expression::Number(NumberLiteral::Int(i)) => Ok(Value::Int(*i)),
        Expression::Number(NumberLiteral::Float(f)) => Ok(Value::Double(*f)),
        Expression::Str(s) => Ok(Value::Str(s.clone())),
        Expression::Vararg => unreachable!("handled in eval_multi"),
        Expression::Variable(Variable::Name(name)) => Ok(ctx.activation.read_name(name)),
        Expression::Variable(Variable::Index { object, key }) => {
            let obj = eval_single(object, ctx)?;
            let key = eval_single(key, ctx)?;
            index_read(&obj, &key)
        }
        Expression::Call(call) => Ok(eval_call(call, ctx)?.into_iter().next().unwrap_or(Value::Nil)),
        Expression::BinaryOp { op, left, right } => eval_binary(*op, left, right, ctx),
        Expression::UnaryOp { op, operand } => eval_unary(*op, operand, ctx),
        Expression::Function(def) => {
            let closure = ctx.activation.live_locals();
            Ok(super::call::make_closure(def.clone(), closure))
        }
        Expression::Table(fields) => table_constructor(fields, ctx),
    }
}

fn index_read(obj: &Value, key: &Value) -> EvalResult<Value> {
    match obj {
        Value::Table(t) => Ok(t.get(key)),
        Value::Nil => Err(EvalError::NilDot),
        other => Err(EvalError::BadDotAccess {
            type_name: other.type_name(),
        }),
    }
}

/// Resolve a `Variable` to its assignable `Cell` (spec §4.6's
/// `Var::LValue`).
pub fn eval_lvalue(var: &Variable, ctx: &mut EvalContext) -> EvalResult<LValue> {
    match var {
        Variable::Name(name) => Ok(LValue(ctx.activation.lvalue_cell(name))),
        Variable::Index { object, key } => {
            let obj = eval_single(object, ctx)?;
            let key = eval_single(key, ctx)?;
            match &obj {
                Value::Table(t) => Ok(LValue(t.subscript(&key, true))),
                Value::Nil => Err(EvalError::NilDot),
                other => Err(EvalError::BadDotAccess {
                    type_name: other.type_name(),
                }),
            }
        }
    }
}

/// Evaluate an expression list with Lua's adjustment rule: every element
/// but the last is collapsed to one value, the last is expanded fully.
pub fn eval_expr_list_adjusted(exprs: &[Expression], ctx: &mut EvalContext) -> EvalResult<Vec<Value>> {
    let mut out = Vec::with_capacity(exprs.len());
    for (i, e) in exprs.iter().enumerate() {
        if i + 1 == exprs.len() {
            out.extend(eval_multi(e, ctx)?);
        } else {
            out.push(eval_single(e, ctx)?);
        }
    }
    Ok(out)
}

pub fn eval_call(call: &FunctionCall, ctx: &mut EvalContext) -> EvalResult<Vec<Value>> {
    if let Expression::Variable(Variable::Name(name)) = call.callee.as_ref() {
        if name == "expect_failure" {
            return crate::harness::expect_failure_raw(&call.args, ctx);
        }
        if crate::harness::is_intrinsic(name) {
            let args = eval_expr_list_adjusted(&call.args, ctx)?;
            if let Some(result) = crate::harness::try_dispatch(name, &args, ctx) {
                return result;
            }
        }
    }
    let callee = eval_single(&call.callee, ctx)?;
    let args = eval_expr_list_adjusted(&call.args, ctx)?;
    call_value(&callee, &args, ctx)
}

fn table_constructor(fields: &[TableField], ctx: &mut EvalContext) -> EvalResult<Value> {
    let table = TableRef::new();
    let mut next_index: i64 = 1;
    for (i, field) in fields.iter().enumerate() {
        match field {
            TableField::Positional(e) => {
                if i + 1 == fields.len() {
                    for v in eval_multi(e, ctx)? {
                        table.set(Value::Int(next_index), v)?;
                        next_index += 1;
                    }
                } else {
                    let v = eval_single(e, ctx)?;
                    table.set(Value::Int(next_index), v)?;
                    next_index += 1;
                }
            }
            TableField::Named { key, value } => {
                let v = eval_single(value, ctx)?;
                table.set(Value::Str(lua_str(key)), v)?;
            }
            TableField::Keyed { key, value } => {
                let k = eval_single(key, ctx)?;
                let v = eval_single(value, ctx)?;
                table.set(k, v)?;
            }
        }
    }
    Ok(Value::Table(table))
}

fn eval_binary(
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    ctx: &mut EvalContext,
) -> EvalResult<Value> {
    // `and`/`or` short-circuit and preserve the operand's own identity
    // rather than coercing through Bool (spec §4.1).
    match op {
        BinaryOp::And => {
            let l = eval_single(left, ctx)?;
            return if !l.weak_bool() { Ok(l) } else { eval_single(right, ctx) };
        }
        BinaryOp::Or => {
            let l = eval_single(left, ctx)?;
            return if l.weak_bool() { Ok(l) } else { eval_single(right, ctx) };
        }
        _ => {}
    }

    let l = eval_single(left, ctx)?;
    let r = eval_single(right, ctx)?;
    let allow = ctx.options.allow_double_to_int_coercion;

    match op {
        BinaryOp::Add => arith(&l, &r, |a, b| a.wrapping_add(b), |a, b| a + b),
        BinaryOp::Sub => arith(&l, &r, |a, b| a.wrapping_sub(b), |a, b| a - b),
        BinaryOp::Mul => arith(&l, &r, |a, b| a.wrapping_mul(b), |a, b| a * b),
        BinaryOp::Mod => {
            if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                if *b == 0 {
                    return Err(EvalError::bad_type("attempt to perform 'n%0'"));
                }
                return Ok(Value::Int(lua_int_mod(*a, *b)));
            }
            Ok(Value::Double(lua_float_mod(l.weak_double()?, r.weak_double()?)))
        }
        BinaryOp::Div => Ok(Value::Double(l.weak_double()? / r.weak_double()?)),
        BinaryOp::Pow => Ok(Value::Double(l.weak_double()?.powf(r.weak_double()?))),
        BinaryOp::FloorDiv => {
            if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
                if *b == 0 {
                    return Err(EvalError::bad_type("attempt to perform 'n//0'"));
                }
                return Ok(Value::Int(lua_int_floor_div(*a, *b)));
            }
            Ok(Value::Double((l.weak_double()? / r.weak_double()?).floor()))
        }
        BinaryOp::Concat => {
            let mut bytes = l.as_string()?.to_vec();
            bytes.extend_from_slice(&r.as_string()?);
            Ok(Value::Str(bytes.into()))
        }
        BinaryOp::Less => compare(&l, &r, |o| o.is_lt()),
        BinaryOp::LessEqual => compare(&l, &r, |o| o.is_le()),
        BinaryOp::Greater => compare(&l, &r, |o| o.is_gt()),
        BinaryOp::GreaterEqual => compare(&l, &r, |o| o.is_ge()),
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::NotEqual => Ok(Value::Bool(l != r)),
        BinaryOp::BitAnd => bitwise(&l, &r, allow, |a, b| a & b),
        BinaryOp::BitOr => bitwise(&l, &r, allow, |a, b| a | b),
        BinaryOp::BitXor => bitwise(&l, &r, allow, |a, b| a ^ b),
        BinaryOp::ShiftLeft => bitwise(&l, &r, allow, |a, b| shift(a, b)),
        BinaryOp::ShiftRight => bitwise(&l, &r, allow, |a, b| shift(a, -b)),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn arith(
    l: &Value,
    r: &Value,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        return Ok(Value::Int(int_op(*a, *b)));
    }
    Ok(Value::Double(float_op(l.weak_double()?, r.weak_double()?)))
}

/// Lua's `//` floors toward negative infinity, not toward zero — distinct
/// from both Rust's `/` (truncating) and `div_euclid` (remainder-sign-fixed).
fn lua_int_floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn lua_int_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn lua_float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn compare(l: &Value, r: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> EvalResult<Value> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(test(a.cmp(b)))),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(test(a.cmp(b)))),
        _ if is_number(l) && is_number(r) => {
            let a = l.weak_double()?;
            let b = r.weak_double()?;
            a.partial_cmp(&b)
                .map(|o| Value::Bool(test(o)))
                .ok_or_else(|| EvalError::bad_type("cannot compare NaN"))
        }
        _ => Err(EvalError::bad_type(format!(
            "attempt to compare {} with {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Double(_))
}

fn bitwise(l: &Value, r: &Value, allow: bool, op: impl Fn(i64, i64) -> i64) -> EvalResult<Value> {
    Ok(Value::Int(op(l.weak_int(allow)?, r.weak_int(allow)?)))
}

fn shift(a: i64, by: i64) -> i64 {
    if by <= -64 || by >= 64 {
        0
    } else if by >= 0 {
        ((a as u64) << by) as i64
    } else {
        ((a as u64) >> (-by)) as i64
    }
}

fn eval_unary(op: UnaryOp, operand: &Expression, ctx: &mut EvalContext) -> EvalResult<Value> {
    let v = eval_single(operand, ctx)?;
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.weak_bool())),
        UnaryOp::Neg => match v {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            other => Ok(Value::Double(-other.weak_double()?)),
        },
        UnaryOp::Len => match v {
            Value::Str(s) => Ok(Value::Int(s.len() as i64)),
            Value::Table(t) => Ok(Value::Int(t.border())),
            other => Err(EvalError::bad_type(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        },
        UnaryOp::BitNot => Ok(Value::Int(!v.weak_int(ctx.options.allow_double_to_int_coercion)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_div_rounds_toward_negative_infinity() {
        assert_eq!(lua_int_floor_div(7, 2), 3);
        assert_eq!(lua_int_floor_div(7, -2), -4);
        assert_eq!(lua_int_floor_div(-7, 2), -4);
        assert_eq!(lua_int_floor_div(-7, -2), 3);
    }

    #[test]
    fn int_mod_takes_the_divisors_sign() {
        assert_eq!(lua_int_mod(7, -2), -1);
        assert_eq!(lua_int_mod(-7, 2), 1);
        assert_eq!(lua_int_mod(7, 2), 1);
    }
}
