//! Shared read-only context threaded through token/command/expression
//! compilation: the two external collaborators (§6) every compiling path
//! needs access to, so a nested script or command substitution can recurse
//! without re-deriving them.

use crate::registry::CommandRegistry;
use crate::token::ScriptParser;

pub struct CompileCtx<'a> {
    pub parser: &'a dyn ScriptParser,
    pub registry: &'a dyn CommandRegistry,
}

impl<'a> CompileCtx<'a> {
    #[must_use]
    pub fn new(parser: &'a dyn ScriptParser, registry: &'a dyn CommandRegistry) -> Self {
        Self { parser, registry }
    }
}
