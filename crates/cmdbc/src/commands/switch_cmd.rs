//! `switch` (§4.4.4): `-exact`/`-glob` matching compiled as a cascade of
//! comparisons against a single cached subject value, with a trailing
//! `default` arm. Fallthrough bodies (a literal `-` body) are not folded
//! inline — compiling one would require peeking ahead into a sibling arm's
//! code offset before it exists, so `switch` defers to runtime whenever it
//! sees one (documented in `DESIGN.md`).

use super::{simple_text, with_rollback, Outcome};
use crate::ctx::CompileCtx;
use crate::env::{CompileEnv, JumpKind};
use crate::error::CompileResult;
use crate::instr::Opcode;
use crate::locals::LocalKind;
use crate::token::ParsedCommand;
use crate::token_compiler;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Exact,
    Glob,
}

fn compile_body(body_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(body_text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

pub fn compile(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_inner(cmd, env, ctx))
}

fn compile_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    if words.len() < 4 {
        return Ok(Outcome::DeferToRuntime);
    }
    let mut idx = 1;
    let mode = match words.get(idx).and_then(simple_text) {
        Some("-exact") => {
            idx += 1;
            Mode::Exact
        }
        Some("-glob") => {
            idx += 1;
            Mode::Glob
        }
        _ => Mode::Exact,
    };
    let Some(subject_tok) = words.get(idx) else { return Ok(Outcome::DeferToRuntime) };
    idx += 1;
    let rest = &words[idx..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Ok(Outcome::DeferToRuntime);
    }
    let Some(locals) = env.locals_mut() else { return Ok(Outcome::DeferToRuntime) };
    let subject_slot = locals.create_temp(LocalKind::Scalar);
    token_compiler::compile_word(subject_tok, env, ctx)?;
    env.emit1or4(Opcode::StoreScalar4, subject_slot as i64);
    env.emit(Opcode::Pop);

    let pairs: Vec<(&crate::token::Token, &crate::token::Token)> =
        rest.chunks(2).map(|c| (&c[0], &c[1])).collect();
    let mut end_fixups = Vec::new();
    let mut resolved = false;

    for (i, (pattern_tok, body_tok)) in pairs.iter().enumerate() {
        let Some(pattern_text) = simple_text(pattern_tok) else { return Ok(Outcome::DeferToRuntime) };
        let Some(body_text) = simple_text(body_tok) else { return Ok(Outcome::DeferToRuntime) };
        if body_text == "-" {
            return Ok(Outcome::DeferToRuntime);
        }
        let is_last = i == pairs.len() - 1;
        if pattern_text == "default" && is_last {
            compile_body(body_text, env, ctx)?;
            resolved = true;
            break;
        }

        env.emit1or4(Opcode::LoadScalar4, subject_slot as i64);
        env.push_literal(pattern_text.as_bytes());
        match mode {
            Mode::Exact => {
                env.emit(Opcode::StrEq);
            }
            Mode::Glob => {
                env.emit1(Opcode::StrMatch, 0);
            }
        }
        let jf = env.emit_forward_jump(JumpKind::IfFalse);
        compile_body(body_text, env, ctx)?;
        let end = env.emit_forward_jump(JumpKind::Always);
        end_fixups.push(end);
        env.fixup_forward_jump_to_here(jf);
    }

    if !resolved {
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
    use crate::locals::SimpleLocalFrame;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;
    use crate::token::{Token, TokenKind};

    fn word(s: &str) -> Token {
        Token::leaf(TokenKind::SimpleWord, 0, s.len(), s)
    }

    #[test]
    fn exact_switch_with_default_compiles() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![
                word("switch"),
                word("$x"),
                word("a"),
                word("set y 1"),
                word("default"),
                word("set y 2"),
            ],
        };
        let outcome = compile(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn fallthrough_body_defers_to_runtime() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("switch"), word("$x"), word("a"), word("-"), word("b"), word("set y 2")],
        };
        let outcome = compile(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::DeferToRuntime);
    }
}
