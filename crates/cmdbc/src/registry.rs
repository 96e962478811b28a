//! The ensemble/command registry interface (§6 "consumed") plus a small
//! `Ensemble` dispatcher (**added**, §"Ensemble dispatch" of `SPEC_FULL.md`)
//! grounded on `tclEnsemble.c`'s compiled-ensemble dispatch: a subcommand is
//! compiled inline only when a per-subcommand compile proc is registered,
//! and otherwise falls through to runtime invocation.

use crate::commands::{CommandCompiler, Outcome};
use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::token::ParsedCommand;
use ahash::AHashMap;
use std::rc::Rc;

/// Flags accompanying a resolved command (§6). Carried through rather than
/// inspected by this crate, the same rationale as `literal::LiteralFlags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveFlags(pub u8);

impl ResolveFlags {
    pub const NONE: ResolveFlags = ResolveFlags(0);
    /// The command is safe to compile inline even under `-safe`
    /// interpreter restrictions.
    pub const SAFE: ResolveFlags = ResolveFlags(1 << 0);
}

/// What `CommandRegistry::resolve` hands back to the top-level script
/// compiler (§6): an optional inline compiler plus trace/flag metadata the
/// caller uses to decide inline-compile vs runtime invoke.
#[derive(Clone)]
pub struct ResolvedCommand {
    pub compiler: Option<Rc<dyn CommandCompiler>>,
    pub flags: ResolveFlags,
    /// `true` if the interpreter has execution traces on this command,
    /// which (per real ensemble dispatch) forces runtime invocation even
    /// when a compile proc is registered.
    pub traces: bool,
}

/// External command/namespace registry collaborator (§6).
pub trait CommandRegistry {
    fn resolve(&self, name: &str, namespace: &str) -> Option<ResolvedCommand>;
}

/// A minimal in-process registry: namespace-qualified name to optional
/// compiler, grounded on `tclEnsemble.c`'s `NsEnsembleImplementationCmd`
/// per-subcommand compile-proc table. Unregistered or traced commands
/// report `compiler: None`, so callers fall back to `INVOKE_STK`.
#[derive(Default)]
pub struct Ensemble {
    compilers: AHashMap<(String, String), Rc<dyn CommandCompiler>>,
    traced: ahash::AHashSet<(String, String)>,
}

impl Ensemble {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: &str, name: &str, compiler: Rc<dyn CommandCompiler>) {
        self.compilers.insert((namespace.to_string(), name.to_string()), compiler);
    }

    /// Marks a command as traced, forcing `resolve` to omit its compiler
    /// even if one is registered (real ensembles do this to keep command
    /// traces observable).
    pub fn set_traced(&mut self, namespace: &str, name: &str, traced: bool) {
        let key = (namespace.to_string(), name.to_string());
        if traced {
            self.traced.insert(key);
        } else {
            self.traced.remove(&key);
        }
    }
}

impl CommandRegistry for Ensemble {
    fn resolve(&self, name: &str, namespace: &str) -> Option<ResolvedCommand> {
        let key = (namespace.to_string(), name.to_string());
        let traces = self.traced.contains(&key);
        let compiler = if traces { None } else { self.compilers.get(&key).cloned() };
        Some(ResolvedCommand { compiler, flags: ResolveFlags::NONE, traces })
    }
}

/// Adapts a plain compile function into a [`CommandCompiler`], for callers
/// registering a command without defining a struct.
pub struct FnCompiler<F>(pub F)
where
    F: Fn(&ParsedCommand, &mut CompileEnv, &CompileCtx) -> CompileResult<Outcome>;

impl<F> CommandCompiler for FnCompiler<F>
where
    F: Fn(&ParsedCommand, &mut CompileEnv, &CompileCtx) -> CompileResult<Outcome>,
{
    fn compile(&self, cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
        (self.0)(cmd, env, ctx)
    }
}
