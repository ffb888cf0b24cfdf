//! Smoke-test CLI: builds a small fixed chunk with the `ast::build`
//! helpers (there is no parser in this crate — see `lib.rs`) and runs it
//! through the evaluator, printing whatever it returns.

use lua_treewalk::ast::build::*;
use lua_treewalk::ast::BinaryOp;
use lua_treewalk::eval::{run_chunk, EvalContext};
use lua_treewalk::EvalOptions;

#[cfg(feature = "cli-tracing")]
fn install_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[cfg(not(feature = "cli-tracing"))]
fn install_tracing() {}

/// `local x = 1 + 2; return x`
fn demo_chunk() -> lua_treewalk::ast::Chunk {
    let body = block(
        vec![local(&["x"], vec![bin(BinaryOp::Add, int(1), int(2))])],
        Some(vec![name("x")]),
    );
    chunk(body)
}

fn main() {
    install_tracing();

    let mut ctx = EvalContext::new(EvalOptions::default());
    match run_chunk(&demo_chunk(), &mut ctx) {
        Ok(values) => {
            for v in values {
                println!("{}", v);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

