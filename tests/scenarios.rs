//! End-to-end scenarios built directly against the AST node shapes (this
//! crate has no parser — see `src/lib.rs`), exercising the evaluator the
//! way a script built by an external front end would.

use lua_treewalk::ast::build::*;
use lua_treewalk::ast::*;
use lua_treewalk::eval::{run_chunk, EvalContext};
use lua_treewalk::{host, scope, EvalOptions, Value};

fn call_stmt(callee: &str, args: Vec<Expression>) -> Statement {
    Statement::Call(FunctionCall {
        callee: Box::new(name(callee)),
        args,
    })
}

fn run(stmts: Vec<Statement>) -> Result<Vec<Value>, lua_treewalk::EvalError> {
    let c = chunk(block(stmts, None));
    let mut ctx = EvalContext::new(EvalOptions::default());
    run_chunk(&c, &mut ctx)
}

/// Scenario 1: a local's declared value round-trips through `ensure_value_type`.
#[test]
fn local_assignment_type_check() {
    let stmts = vec![
        local(&["x"], vec![int(10)]),
        call_stmt("ensure_value_type", vec![name("x"), int(10), str_lit("int")]),
    ];
    run(stmts).expect("assignment should preserve the int type and value");
}

/// Scenario 2: swapping two locals via a single multi-assignment.
#[test]
fn swap_via_multi_assignment() {
    let stmts = vec![
        local(&["a", "b"], vec![int(1), int(2)]),
        assign(
            vec![Variable::Name("a".into()), Variable::Name("b".into())],
            vec![name("b"), name("a")],
        ),
        call_stmt("ensure_value_type", vec![name("a"), int(2), str_lit("int")]),
        call_stmt("ensure_value_type", vec![name("b"), int(1), str_lit("int")]),
    ];
    run(stmts).expect("a and b should have swapped");
}

/// Scenario 3: a numeric string promotes to Double when added to a Double.
#[test]
fn string_promotes_to_double_in_addition() {
    let stmts = vec![
        local(&["x"], vec![bin(BinaryOp::Add, str_lit("3"), float(2.5))]),
        call_stmt("ensure_value_type", vec![name("x"), float(5.5), str_lit("double")]),
    ];
    run(stmts).expect("'3' + 2.5 should be the double 5.5");
}

/// Scenario 4: floor division distinguishes an all-Int operand pair (which
/// stays Int) from one involving a coerced string (which becomes Double).
#[test]
fn floor_div_distinguishes_int_from_coerced_string() {
    let stmts = vec![
        local(&["a"], vec![bin(BinaryOp::FloorDiv, int(7), int(2))]),
        call_stmt("ensure_value_type", vec![name("a"), int(3), str_lit("int")]),
        local(&["b"], vec![bin(BinaryOp::FloorDiv, str_lit("7"), int(2))]),
        call_stmt("ensure_value_type", vec![name("b"), float(3.0), str_lit("double")]),
    ];
    run(stmts).expect("7 // 2 is Int(3), '7' // 2 is Double(3.0)");
}

/// Scenario 5: a closure captures its defining function's parameter by
/// Cell, so `f(10)(5) == 15`.
#[test]
fn closure_captures_enclosing_parameter() {
    let inner = FunctionDefinition {
        params: vec!["x".to_string()],
        is_vararg: false,
        body: Box::new(block(vec![], Some(vec![bin(BinaryOp::Add, name("a"), name("x"))]))),
    };
    let outer = FunctionDefinition {
        params: vec!["a".to_string()],
        is_vararg: false,
        body: Box::new(block(
            vec![local(&["b"], vec![int(13)])],
            Some(vec![Expression::Function(inner)]),
        )),
    };
    let stmts = vec![
        local(&["f"], vec![Expression::Function(outer)]),
        local(&["g"], vec![call(name("f"), vec![int(10)])]),
        local(&["r"], vec![call(name("g"), vec![int(5)])]),
        call_stmt("ensure_value_type", vec![name("r"), int(15), str_lit("int")]),
    ];
    run(stmts).expect("f(10)(5) should be 15");
}

/// Scenario 6: a generic `for` drives a host-supplied iterator that
/// terminates by returning no values (Nil control variable).
#[test]
fn generic_for_terminates_on_nil_from_iterator() {
    let c = chunk(block(
        vec![
            local(&["sum"], vec![int(0)]),
            Statement::GenericFor {
                names: vec!["v".to_string()],
                exprs: vec![name("counter"), Expression::Nil, int(0)],
                body: Box::new(block(
                    vec![assign(
                        vec![Variable::Name("sum".into())],
                        vec![bin(BinaryOp::Add, name("sum"), name("v"))],
                    )],
                    None,
                )),
            },
            call_stmt("ensure_value_type", vec![name("sum"), int(15), str_lit("int")]),
        ],
        None,
    ));
    let mut ctx = EvalContext::new(EvalOptions::default());
    let counter = host::native_function(|args: &[Value]| {
        let control = match args.get(1) {
            Some(Value::Int(i)) => *i,
            _ => 0,
        };
        if control >= 5 {
            Ok(Vec::new())
        } else {
            Ok(vec![Value::Int(control + 1)])
        }
    });
    *ctx.activation.lvalue_cell("counter").borrow_mut() = counter;
    run_chunk(&c, &mut ctx).expect("loop should sum 1..=5");
}

/// A generic `for` whose iterator expression list yields nothing is a
/// static `bad 'for' iterator` error, not a swallowed no-op loop.
#[test]
fn generic_for_with_no_iterator_values_is_bad_for_in() {
    let stmts = vec![Statement::GenericFor {
        names: vec!["v".to_string()],
        exprs: vec![],
        body: Box::new(block(vec![], None)),
    }];
    let err = run(stmts).unwrap_err();
    assert!(matches!(err, lua_treewalk::EvalError::BadForIn(_)));
}

/// A generic `for` whose iterator value isn't callable raises
/// `for-in-bad-type` rather than panicking on the first call attempt.
#[test]
fn generic_for_with_non_function_iterator_is_for_in_bad_type() {
    let stmts = vec![Statement::GenericFor {
        names: vec!["v".to_string()],
        exprs: vec![int(1)],
        body: Box::new(block(vec![], None)),
    }];
    let err = run(stmts).unwrap_err();
    assert!(matches!(err, lua_treewalk::EvalError::ForInBadType { .. }));
}

/// `expect_failure` succeeds exactly when its argument expression raises a
/// bad-type error, and the error never escapes to abort the enclosing call.
#[test]
fn expect_failure_succeeds_on_bad_type_and_fails_otherwise() {
    let stmts = vec![call_stmt(
        "expect_failure",
        vec![un(UnaryOp::Len, int(1))],
    )];
    run(stmts).expect("#1 should raise bad-type, which expect_failure should catch");

    let stmts = vec![call_stmt("expect_failure", vec![int(1)])];
    run(stmts).expect_err("a successful evaluation should make expect_failure fail");
}

/// Scenario 7: a forward `goto` that crosses a local declaration is
/// rejected statically, before any evaluation happens.
#[test]
fn goto_crossing_a_local_is_rejected_statically() {
    let c = chunk(block(
        vec![
            Statement::Goto {
                label: "done".to_string(),
                loc: Location::unknown(),
            },
            local(&["x"], vec![int(1)]),
            Statement::Label("done".to_string()),
        ],
        None,
    ));
    let err = scope::analyze(&c).unwrap_err();
    assert!(matches!(err, lua_treewalk::EvalError::CrossedLocal { .. }));
}

/// Scenario 8: `break` outside any loop is rejected statically.
#[test]
fn break_outside_loop_is_rejected_statically() {
    let c = chunk(block(vec![Statement::Break(Location::unknown())], None));
    let err = scope::analyze(&c).unwrap_err();
    assert!(matches!(err, lua_treewalk::EvalError::LonelyBreak { .. }));
}

/// Law: Int + Int always stays Int (never silently widens to Double).
#[test]
fn int_plus_int_stays_int() {
    for (a, b) in [(1, 2), (-5, 5), (0, 0), (1_000_000, 2_000_000)] {
        let stmts = vec![
            local(&["r"], vec![bin(BinaryOp::Add, int(a), int(b))]),
            call_stmt("ensure_value_type", vec![name("r"), int(a + b), str_lit("int")]),
        ];
        run(stmts).unwrap_or_else(|e| panic!("{} + {} should stay Int: {}", a, b, e));
    }
}

/// Law: concatenation stringifies non-string operands the same way
/// `tostring`/`as_string` do.
#[test]
fn concat_stringifies_like_as_string() {
    let stmts = vec![
        local(&["s"], vec![bin(BinaryOp::Concat, int(1), str_lit(""))]),
        call_stmt("ensure_value_type", vec![name("s"), str_lit("1"), str_lit("string")]),
    ];
    run(stmts).expect("1 .. '' should stringify to '1'");
}

/// Law: `or`'s short-circuit returns the left operand itself (identity
/// preserved), not a coerced boolean.
#[test]
fn short_circuit_or_preserves_operand_identity() {
    let stmts = vec![
        local(&["t"], vec![Expression::Table(vec![])]),
        local(
            &["r"],
            vec![bin(BinaryOp::Or, Expression::Boolean(false), name("t"))],
        ),
        call_stmt("ensure_value_type", vec![name("r"), name("t"), str_lit("table")]),
    ];
    run(stmts).expect("false or t should yield t itself");
}

/// Law: `#t` (the border) matches the dense run of integer keys a table
/// constructor lays down.
#[test]
fn table_length_matches_constructed_run() {
    let stmts = vec![
        local(
            &["t"],
            vec![Expression::Table(vec![
                TableField::Positional(int(1)),
                TableField::Positional(int(2)),
                TableField::Positional(int(3)),
            ])],
        ),
        local(&["n"], vec![un(UnaryOp::Len, name("t"))]),
        call_stmt("ensure_value_type", vec![name("n"), int(3), str_lit("int")]),
    ];
    run(stmts).expect("#{1,2,3} should be 3");
}
