//! Error-path properties: builtins never panic on bad arity or types, deep
//! recursion raises `StackOverflow` rather than blowing the Rust stack, and a
//! flipped cancellation handle stops a running program between instructions.

use std::sync::atomic::Ordering;

use quark::{Context, QuarkError, RuntimeError};

#[test]
fn builtin_wrong_arity_is_a_typed_error_not_a_panic() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "length(1, 2)\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::WrongArity { .. })));
}

#[test]
fn builtin_wrong_type_is_a_type_error() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "length(1)\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::TypeError(_))));
}

#[test]
fn calling_a_non_callable_value_is_a_type_error() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "x = 1\nx()\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::TypeError(_))));
}

#[test]
fn division_by_zero_is_reported_not_panicked() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "export 1 / 0\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::TypeError(_))));
}

#[test]
fn unbounded_recursion_raises_stack_overflow_not_a_rust_panic() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "fn loop_forever(n){ return loop_forever(n+1) }\nloop_forever(0)\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::StackOverflow)));
}

#[test]
fn cancellation_handle_stops_a_running_program() {
    let mut ctx = Context::new();
    let abort = ctx.cancellation_handle();
    abort.store(true, Ordering::Relaxed);
    let err = ctx.run_source("<test>", "export 1\n").unwrap_err();
    assert!(matches!(err, QuarkError::Runtime(RuntimeError::Cancelled)));
}

#[test]
fn undeclared_identifier_is_a_compile_error() {
    let mut ctx = Context::new();
    let err = ctx.run_source("<test>", "export undeclared_name\n").unwrap_err();
    assert!(matches!(err, QuarkError::Compile(_)));
}
