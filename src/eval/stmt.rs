//! Statement execution (spec §4.7).

use super::expr::{eval_expr_list_adjusted, eval_lvalue, eval_single};
use super::{call_value, EvalContext, Flow};
use crate::ast::{Block, Statement};
use crate::error::EvalResult;
use crate::value::Value;

/// Execute a block in a fresh child block scope, popping it (and
/// releasing its locals) on every exit path.
pub fn eval_block(block: &Block, ctx: &mut EvalContext) -> EvalResult<Flow> {
    ctx.activation.push_block();
    let result = eval_block_in_place(block, ctx);
    ctx.activation.pop_block();
    result
}

/// Execute a block's statements and trailing return directly in the
/// current (already-pushed) block scope. Used for the chunk's implicit
/// outermost block and a function body's parameter block, both of which
/// already have a block frame supplied by their caller.
pub fn eval_block_in_place(block: &Block, ctx: &mut EvalContext) -> EvalResult<Flow> {
    let mut idx = 0;
    while idx < block.statements.len() {
        match eval_statement(&block.statements[idx], ctx)? {
            Flow::Normal => idx += 1,
            Flow::Goto(label, loc) => match find_label(block, &label) {
                Some(target) => idx = target + 1,
                None => return Ok(Flow::Goto(label, loc)),
            },
            other => return Ok(other),
        }
    }
    if let Some(ret) = &block.return_stmt {
        let values = eval_expr_list_adjusted(&ret.values, ctx)?;
        return Ok(Flow::Return(values));
    }
    Ok(Flow::Normal)
}

fn find_label(block: &Block, label: &str) -> Option<usize> {
    block.statements.iter().position(|s| matches!(s, Statement::Label(l) if l == label))
}

fn eval_statement(stmt: &Statement, ctx: &mut EvalContext) -> EvalResult<Flow> {
    match stmt {
        Statement::Empty | Statement::Label(_) => Ok(Flow::Normal),

        Statement::Break(_) => Ok(Flow::Break),

        Statement::Goto { label, loc } => Ok(Flow::Goto(label.clone(), *loc)),

        Statement::Local(decl) => {
            if decl.attribs.iter().any(Option::is_some) && ctx.options.warn_on_ignored_attributes {
                tracing::warn!(loc = %decl.loc, "local attribute accepted but has no runtime effect");
            }
            let values = eval_expr_list_adjusted(&decl.values, ctx)?;
            for (i, name) in decl.names.iter().enumerate() {
                let v = values.get(i).cloned().unwrap_or(Value::Nil);
                ctx.activation.declare_local(name, v);
            }
            Ok(Flow::Normal)
        }

        Statement::LocalFunction { name, func } => {
            // Pre-declare the name so the function body can see its own
            // cell and recurse by name (spec §4.7).
            let cell = ctx.activation.declare_local(name, Value::Nil);
            let closure = ctx.activation.live_locals();
            let f = super::call::make_closure(func.clone(), closure);
            *cell.borrow_mut() = f;
            Ok(Flow::Normal)
        }

        Statement::FunctionDecl(fstmt) => {
            let closure = ctx.activation.live_locals();
            let f = super::call::make_closure(fstmt.func.clone(), closure);
            assign_function_name(&fstmt.name, f, ctx)?;
            Ok(Flow::Normal)
        }

        Statement::Assignment(a) => {
            let cells: Vec<_> = a
                .vars
                .iter()
                .map(|v| eval_lvalue(v, ctx))
                .collect::<EvalResult<_>>()?;
            let values = eval_expr_list_adjusted(&a.values, ctx)?;
            for (i, cell) in cells.into_iter().enumerate() {
                let v = values.get(i).cloned().unwrap_or(Value::Nil);
                cell.write(v)?;
            }
            Ok(Flow::Normal)
        }

        Statement::Call(call) => {
            super::expr::eval_call(call, ctx)?;
            Ok(Flow::Normal)
        }

        Statement::Do(body) => eval_block(body, ctx),

        Statement::While { condition, body } => loop {
            if !eval_single(condition, ctx)?.weak_bool() {
                return Ok(Flow::Normal);
            }
            match eval_block(body, ctx)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal => {}
                other => return Ok(other),
            }
        },

        Statement::Repeat { body, condition } => loop {
            // `until` sees locals from the loop body (spec): evaluate it
            // inside the same block scope rather than via `eval_block`.
            ctx.activation.push_block();
            let outcome = eval_repeat_iteration(body, condition, ctx);
            ctx.activation.pop_block();
            match outcome? {
                RepeatOutcome::Again => {}
                RepeatOutcome::Done => return Ok(Flow::Normal),
                RepeatOutcome::Escape(flow) => return Ok(flow),
            }
        },

        Statement::If(ifs) => {
            if eval_single(&ifs.condition, ctx)?.weak_bool() {
                return eval_block(&ifs.then_block, ctx);
            }
            for (cond, b) in &ifs.elseif_branches {
                if eval_single(cond, ctx)?.weak_bool() {
                    return eval_block(b, ctx);
                }
            }
            if let Some(eb) = &ifs.else_block {
                return eval_block(eb, ctx);
            }
            Ok(Flow::Normal)
        }

        Statement::NumericFor {
            var,
            start,
            end,
            step,
            body,
        } => eval_numeric_for(var, start, end, step.as_ref(), body, ctx),

        Statement::GenericFor { names, exprs, body } => eval_generic_for(names, exprs, body, ctx),
    }
}

fn assign_function_name(
    name: &crate::ast::FunctionName,
    value: Value,
    ctx: &mut EvalContext,
) -> EvalResult<()> {
    if name.path.is_empty() {
        ctx.activation.lvalue_cell(&name.base).replace(value);
        return Ok(());
    }
    let mut current = ctx.activation.read_name(&name.base);
    for seg in &name.path[..name.path.len() - 1] {
        current = table_get_checked(&current, seg)?;
    }
    let last = name.path.last().unwrap();
    set_table_field(&current, last, value)
}

fn table_get_checked(v: &Value, field: &str) -> EvalResult<Value> {
    match v {
        Value::Table(t) => Ok(t.get(&Value::Str(crate::value::lua_str(field)))),
        Value::Nil => Err(crate::error::EvalError::NilDot),
        other => Err(crate::error::EvalError::BadDotAccess {
            type_name: other.type_name(),
        }),
    }
}

fn set_table_field(v: &Value, field: &str, value: Value) -> EvalResult<()> {
    match v {
        Value::Table(t) => t.set(Value::Str(crate::value::lua_str(field)), value),
        Value::Nil => Err(crate::error::EvalError::NilDot),
        other => Err(crate::error::EvalError::BadDotAccess {
            type_name: other.type_name(),
        }),
    }
}

enum RepeatOutcome {
    Again,
    Done,
    Escape(Flow),
}

fn eval_repeat_iteration(
    body: &Block,
    condition: &crate::ast::Expression,
    ctx: &mut EvalContext,
) -> EvalResult<RepeatOutcome> {
    match eval_block_in_place(body, ctx)? {
        Flow::Normal => {
            if eval_single(condition, ctx)?.weak_bool() {
                Ok(RepeatOutcome::Done)
            } else {
                Ok(RepeatOutcome::Again)
            }
        }
        Flow::Break => Ok(RepeatOutcome::Done),
        other => Ok(RepeatOutcome::Escape(other)),
    }
}

fn eval_numeric_for(
    var: &str,
    start: &crate::ast::Expression,
    end: &crate::ast::Expression,
    step: Option<&crate::ast::Expression>,
    body: &Block,
    ctx: &mut EvalContext,
) -> EvalResult<Flow> {
    let start = eval_single(start, ctx)?.weak_double()?;
    let limit = eval_single(end, ctx)?.weak_double()?;
    let step_v = match step {
        Some(e) => eval_single(e, ctx)?.weak_double()?,
        None => 1.0,
    };
    if step_v == 0.0 {
        return Err(crate::error::EvalError::bad_type("'for' step is zero"));
    }
    let integral = start.fract() == 0.0 && limit.fract() == 0.0 && step_v.fract() == 0.0;
    let mut i = start;
    loop {
        if (step_v > 0.0 && i > limit) || (step_v < 0.0 && i < limit) {
            return Ok(Flow::Normal);
        }
        ctx.activation.push_block();
        let v = if integral {
            Value::Int(i as i64)
        } else {
            Value::Double(i)
        };
        ctx.activation.declare_local(var, v);
        let flow = eval_block_in_place(body, ctx);
        ctx.activation.pop_block();
        match flow? {
            Flow::Break => return Ok(Flow::Normal),
            Flow::Normal => {}
            other => return Ok(other),
        }
        i += step_v;
    }
}

fn eval_generic_for(
    names: &[String],
    exprs: &[crate::ast::Expression],
    body: &Block,
    ctx: &mut EvalContext,
) -> EvalResult<Flow> {
    let mut control = eval_expr_list_adjusted(exprs, ctx)?;
    if control.is_empty() {
        return Err(crate::error::EvalError::BadForIn(
            "'for' iterator list yields no values".to_string(),
        ));
    }
    control.resize(3, Value::Nil);
    let iterator = control[0].clone();
    if !matches!(iterator, Value::Function(_)) {
        return Err(crate::error::EvalError::ForInBadType {
            type_name: iterator.type_name(),
        });
    }
    let state = control[1].clone();
    let mut control_var = control[2].clone();

    loop {
        let results = call_value(&iterator, &[state.clone(), control_var.clone()], ctx)?;
        let first = results.first().cloned().unwrap_or(Value::Nil);
        if first.is_nil() {
            return Ok(Flow::Normal);
        }
        control_var = first.clone();

        ctx.activation.push_block();
        for (i, name) in names.iter().enumerate() {
            let v = results.get(i).cloned().unwrap_or(Value::Nil);
            ctx.activation.declare_local(name, v);
        }
        let flow = eval_block_in_place(body, ctx);
        ctx.activation.pop_block();
        match flow? {
            Flow::Break => return Ok(Flow::Normal),
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
}
