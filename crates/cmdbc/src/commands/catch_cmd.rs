//! `catch` (§4.4.5): a `Catch`-kind exception range around the body, with
//! an optional result-variable store. The `optionsVarName` form is not
//! folded inline (no return-options record is modeled in this crate) and
//! defers to runtime.

use super::{simple_text, with_rollback, Outcome};
use crate::bytecode::ExceptionKind;
use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::instr::Opcode;
use crate::locals::LocalKind;
use crate::token::ParsedCommand;

fn compile_body(body_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(body_text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

pub fn compile(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_inner(cmd, env, ctx))
}

fn compile_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    if words.len() < 2 || words.len() > 3 {
        return Ok(Outcome::DeferToRuntime);
    }
    let Some(body_text) = simple_text(&words[1]) else { return Ok(Outcome::DeferToRuntime) };
    let result_var = match words.get(2) {
        Some(tok) => match simple_text(tok) {
            Some(name) => Some(name),
            None => return Ok(Outcome::DeferToRuntime),
        },
        None => None,
    };

    let range_idx = env.begin_except_range(ExceptionKind::Catch);
    env.emit1or4(Opcode::BeginCatch, range_idx as i64);
    compile_body(body_text, env, ctx)?;

    match result_var {
        Some(name) => {
            let slot = env.locals_mut().and_then(|l| l.find_or_create_local(name, true, LocalKind::Scalar));
            match slot {
                Some(idx) => {
                    env.emit1or4(Opcode::StoreScalar4, idx as i64);
                    env.emit(Opcode::Pop);
                }
                None => {
                    env.push_literal(name.as_bytes());
                    env.emit(Opcode::StoreStk);
                }
            }
        }
        None => env.emit(Opcode::Pop),
    }
    env.push_literal(b"0");

    let main_target = env.code_len();
    env.end_except_range(range_idx, main_target, None)?;
    env.emit1or4(Opcode::EndCatch, range_idx as i64);
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
    fn catch_with_result_var_opens_one_catch_range() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("catch"), word("set x 1"), word("result")],
        };
        let outcome = compile(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }
}
