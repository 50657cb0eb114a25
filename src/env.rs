use std::{cell::RefCell, ffi::OsStr};

use crate::runtime::MAX_INSTRUCTIONS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Env {
    /// Print every executed instruction to stderr
    trace: bool,
    /// Step guard for run mode
    max_steps: usize,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `POLYASM_TRACE` and `POLYASM_MAX_STEPS`. Call once, before anything runs.
pub fn init() {
    set_env(from_vars());
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace)
}

pub fn max_steps() -> usize {
    with_env(|env| env.max_steps)
}

fn from_vars() -> Env {
    let max_steps = std::env::var("POLYASM_MAX_STEPS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|steps| *steps > 0)
        .unwrap_or(MAX_INSTRUCTIONS);
    Env {
        trace: var_is("POLYASM_TRACE", "1"),
        max_steps,
    }
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

/// Library callers that never ran `init` get the environment read on first use.
fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        callback(env.get_or_insert_with(from_vars))
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
