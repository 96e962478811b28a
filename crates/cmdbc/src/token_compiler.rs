//! Token lowering (§4.3): compiles one parsed word into bytecode that
//! leaves exactly one value on the stack, push-and-concatenating its
//! constituent text/backslash/substitution segments.

use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::instr::Opcode;
use crate::locals::LocalKind;
use crate::token::{Token, TokenKind};

/// Compiles `tok` (a `Word`, `SimpleWord`, `VariableSubst`, or
/// `CommandSubst` token) so that exactly one value is left on the stack.
pub fn compile_word(tok: &Token, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    match tok.kind {
        TokenKind::SimpleWord | TokenKind::Text => {
            env.push_literal(tok.text.as_bytes());
            Ok(())
        }
        TokenKind::VariableSubst => compile_variable(tok, env, ctx),
        TokenKind::CommandSubst => compile_command_subst(tok, env, ctx),
        TokenKind::Word => compile_compound_word(tok, env, ctx),
        other => Err(crate::error::CompileError::syntax(format!("token kind {other:?} cannot stand alone as a word"))),
    }
}

fn compile_compound_word(tok: &Token, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let mut segments = 0usize;
    for child in &tok.children {
        compile_word(child, env, ctx)?;
        segments += 1;
    }
    if segments == 0 {
        env.push_literal(b"");
    } else if segments > 1 {
        env.emit1or4(Opcode::Concat4, segments as i64);
        env.adjust_stack_depth(-(segments as i64 - 1));
    }
    Ok(())
}

fn compile_command_subst(tok: &Token, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(&tok.text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

/// §4.3 point 3: decides local vs. namespace slot for a `$name` token.
fn compile_variable(tok: &Token, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let name = tok.text.as_str();
    let subscript = tok.children.first();

    if name.contains("::") {
        let full = match subscript {
            Some(sub) => format!("{name}({})", sub.text),
            None => name.to_string(),
        };
        env.push_literal(full.as_bytes());
        env.emit(Opcode::LoadStk);
        return Ok(());
    }

    let slot = env
        .locals_mut()
        .and_then(|locals| locals.find_or_create_local(name, true, LocalKind::Scalar));

    match (slot, subscript) {
        (Some(idx), None) => {
            env.emit1or4(Opcode::LoadScalar4, idx as i64);
            Ok(())
        }
        (Some(idx), Some(sub)) => {
            compile_word(sub, env, ctx)?;
            env.emit1or4(Opcode::LoadArray4, idx as i64);
            Ok(())
        }
        (None, None) => {
            env.push_literal(name.as_bytes());
            env.emit(Opcode::LoadStk);
            Ok(())
        }
        (None, Some(sub)) => {
            let full = format!("{name}({})", sub.text);
            env.push_literal(full.as_bytes());
            env.emit(Opcode::LoadStk);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;

    fn ctx() -> (SimpleParser, Ensemble) {
        (SimpleParser::new(), Ensemble::new())
    }

    #[test]
    fn simple_word_pushes_one_literal() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let tok = Token::leaf(TokenKind::SimpleWord, 0, 0, "hello");
        compile_word(&tok, &mut env, &c).unwrap();
        assert_eq!(env.code_len(), 1);
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn local_scalar_resolves_to_load_scalar() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(crate::locals::SimpleLocalFrame::new()));
        let tok = Token::leaf(TokenKind::VariableSubst, 0, 0, "x");
        compile_word(&tok, &mut env, &c).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn compound_word_concatenates_segments() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let word = Token {
            kind: TokenKind::Word,
            start: 0,
            size: 0,
            num_components: 2,
            children: vec![
                Token::leaf(TokenKind::Text, 0, 0, "pre-"),
                Token::leaf(TokenKind::VariableSubst, 0, 0, "x"),
            ],
            text: String::new(),
        };
        compile_word(&word, &mut env, &c).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }
}
