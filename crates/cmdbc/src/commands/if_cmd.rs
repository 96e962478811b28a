//! `if`/`elseif`/`else` (§4.4.1).

use super::{simple_text, with_rollback, Outcome};
use crate::ctx::CompileCtx;
use crate::env::{CompileEnv, JumpKind};
use crate::error::CompileResult;
use crate::token::ParsedCommand;

fn probe_bool(text: &str) -> Option<bool> {
    super::probe_bool(text)
}

fn compile_body(body_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(body_text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

fn compile_cond(test_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    crate::expr::compile_expr_source(test_text, env, ctx)
}

pub fn compile(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_inner(cmd, env, ctx))
}

fn compile_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    if words.len() < 3 {
        return Ok(Outcome::DeferToRuntime);
    }
    let mut idx = 1;
    let mut end_fixups = Vec::new();
    let mut took_static_true = false;
    let mut took_else = false;

    loop {
        let Some(test_tok) = words.get(idx) else { return Ok(Outcome::DeferToRuntime) };
        let Some(test_text) = simple_text(test_tok) else { return Ok(Outcome::DeferToRuntime) };
        idx += 1;
        if words.get(idx).and_then(simple_text) == Some("then") {
            idx += 1;
        }
        let Some(body_tok) = words.get(idx) else { return Ok(Outcome::DeferToRuntime) };
        let Some(body_text) = simple_text(body_tok) else { return Ok(Outcome::DeferToRuntime) };
        idx += 1;

        match probe_bool(test_text) {
            Some(false) => {}
            Some(true) => {
                compile_body(body_text, env, ctx)?;
                took_static_true = true;
            }
            None => {
                compile_cond(test_text, env, ctx)?;
                let jf = env.emit_forward_jump(JumpKind::IfFalse);
                compile_body(body_text, env, ctx)?;
                let end = env.emit_forward_jump(JumpKind::Always);
                end_fixups.push(end);
                env.fixup_forward_jump_to_here(jf);
            }
        }

        if took_static_true {
            break;
        }
        if idx >= words.len() {
            break;
        }
        match words.get(idx).and_then(simple_text) {
            Some("elseif") => {
                idx += 1;
                continue;
            }
            Some("else") => {
                idx += 1;
                let Some(else_tok) = words.get(idx) else { return Ok(Outcome::DeferToRuntime) };
                let Some(else_text) = simple_text(else_tok) else { return Ok(Outcome::DeferToRuntime) };
                idx += 1;
                compile_body(else_text, env, ctx)?;
                took_else = true;
                break;
            }
            _ => return Ok(Outcome::DeferToRuntime),
        }
    }

    if idx != words.len() {
        return Ok(Outcome::DeferToRuntime);
    }
    if !took_static_true && !took_else {
        env.push_literal(b"");
    }
    for f in end_fixups {
        env.fixup_forward_jump_to_here(f);
    }
    Ok(Outcome::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;
    use crate::token::{Token, TokenKind};

    fn word(s: &str) -> Token {
        Token::leaf(TokenKind::SimpleWord, 0, s.len(), s)
    }

    #[test]
    fn static_true_elides_else_branch() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(crate::locals::SimpleLocalFrame::new()));
        env.locals_mut().unwrap().find_or_create_local("x", true, crate::locals::LocalKind::Scalar);

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("if"), word("1"), word("set x 2"), word("else"), word("set x 3")],
        };
        let outcome = compile(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
        // No jump should have been needed: static-true short-circuits.
        assert!(env.code_len() > 0);
    }
}
