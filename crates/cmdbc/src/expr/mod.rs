//! Expression compilation (§4.5): lex → parse → emit, the one pipeline in
//! this crate that is fully self-contained (its own lexer and parser,
//! independent of [`crate::token`]).

pub mod emitter;
pub mod lexer;
pub mod parser;

use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;

/// Compiles a bracket-expression's source text (the argument to `expr`, an
/// `if`/`while` test, a `for` increment clause's condition) so it leaves
/// exactly one numeric-or-boolean value on the stack.
///
/// Always finishes with `tryCvtToNumeric` (§4.5 "Emit"), matching a real
/// compiled `exprStk`: every compiled expression attempts a numeric
/// conversion of its result before handing it back.
pub fn compile_expr_source(source: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let mut p = parser::Parser::new(source)?;
    let tree = p.parse()?;
    emitter::emit_expr(&tree, env, ctx)?;
    env.emit(crate::instr::Opcode::TryConvertToNumeric);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;

    #[test]
    fn compiles_simple_comparison() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(crate::locals::SimpleLocalFrame::new()));
        compile_expr_source("1 < 2", &mut env, &ctx).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }
}
