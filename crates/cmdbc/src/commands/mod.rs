//! Command compilers: one per built-in control command (§4.4), sharing a
//! common contract and rollback discipline.
//!
//! Grounded on `monty::bytecode::compiler::Compiler`'s `compile_stmt`
//! dispatch (a match over statement kind, each arm emitting directly into
//! the shared builder) generalized to this spec's `Ok`/`DeferToRuntime`/
//! `Error` three-way outcome, which `monty` does not need (its source
//! language has no runtime-dispatch fallback).

pub mod catch_cmd;
pub mod foreach_cmd;
pub mod if_cmd;
pub mod loop_cmd;
pub mod misc_cmd;
pub mod switch_cmd;

use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::token::{ParsedCommand, Token, TokenKind};

/// Common command-compiler contract (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Emission succeeded; the caller counts this command and continues.
    Ok,
    /// Not compilable as given; the caller rolls back and emits a generic
    /// `invoke` over the command's tokens instead.
    DeferToRuntime,
}

pub trait CommandCompiler {
    fn compile(&self, cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome>;
}

/// Runs `f` under the mandatory rollback discipline (§4.4, §9): snapshots
/// `env` first, and restores it if `f` returns `DeferToRuntime` or an
/// error. Every command compiler in this module goes through this so the
/// rollback contract can't be forgotten at a single call site.
pub fn with_rollback<F>(env: &mut CompileEnv, f: F) -> CompileResult<Outcome>
where
    F: FnOnce(&mut CompileEnv) -> CompileResult<Outcome>,
{
    let snap = env.snapshot();
    match f(env) {
        Ok(Outcome::Ok) => Ok(Outcome::Ok),
        Ok(Outcome::DeferToRuntime) => {
            env.rollback_to(snap);
            Ok(Outcome::DeferToRuntime)
        }
        Err(e) => {
            env.rollback_to(snap);
            Err(e)
        }
    }
}

/// Returns the token's literal text if it is a `SimpleWord` (braced or
/// substitution-free) — the shape every command compiler here requires for
/// compile-time analysis (§4.4.1 "Requires every word to be a simple-word
/// token").
#[must_use]
pub fn simple_text(tok: &Token) -> Option<&str> {
    (tok.kind == TokenKind::SimpleWord).then_some(tok.text.as_str())
}

/// Best-effort compile-time boolean probe (§4.4.1). Recognizes the
/// conventional boolean spellings; anything else is "unknown" and compiles
/// normally (no static folding).
#[must_use]
pub fn probe_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
