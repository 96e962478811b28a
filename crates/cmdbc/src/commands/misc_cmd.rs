//! `return`, `incr`, `set`, `lassign`, `break`, `continue` (§4.4.6, §4.4.7).
//!
//! Each of these is small enough to compile inline without a dedicated
//! submodule; all share the same `-exact word shape, else defer' discipline
//! as the control commands.

use super::{simple_text, with_rollback, Outcome};
use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::instr::{InstrWord, Opcode, Operand, OperandKind, OperandWidth};
use crate::locals::LocalKind;
use crate::token::ParsedCommand;
use crate::token_compiler;

pub fn compile_return(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        let words = &cmd.words;
        if words.len() > 2 {
            return Ok(Outcome::DeferToRuntime);
        }
        match words.get(1) {
            Some(tok) => token_compiler::compile_word(tok, env, ctx)?,
            None => env.push_literal(b""),
        }
        env.emit(Opcode::ReturnStk);
        Ok(Outcome::Ok)
    })
}

pub fn compile_incr(cmd: &ParsedCommand, env: &mut CompileEnv, _ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        let words = &cmd.words;
        if words.len() < 2 || words.len() > 3 {
            return Ok(Outcome::DeferToRuntime);
        }
        let Some(name) = simple_text(&words[1]) else { return Ok(Outcome::DeferToRuntime) };
        if name.contains("::") {
            return Ok(Outcome::DeferToRuntime);
        }
        let delta: i64 = match words.get(2) {
            None => 1,
            Some(tok) => match simple_text(tok).and_then(|t| t.parse().ok()) {
                Some(n) => n,
                None => return Ok(Outcome::DeferToRuntime),
            },
        };
        let Some(locals) = env.locals_mut() else { return Ok(Outcome::DeferToRuntime) };
        let Some(slot) = locals.find_or_create_local(name, true, LocalKind::Scalar) else {
            return Ok(Outcome::DeferToRuntime);
        };
        env.emit_word(InstrWord::new(
            Opcode::IncrScalar1Imm,
            [
                Operand::new(OperandKind::Uint, slot as i64, OperandWidth::Wide),
                Operand::new(OperandKind::Int, delta, OperandWidth::Wide),
            ],
        ));
        Ok(Outcome::Ok)
    })
}

pub fn compile_set(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        let words = &cmd.words;
        if words.len() < 2 || words.len() > 3 {
            return Ok(Outcome::DeferToRuntime);
        }
        let Some(name) = simple_text(&words[1]) else { return Ok(Outcome::DeferToRuntime) };
        if name.contains("::") {
            return Ok(Outcome::DeferToRuntime);
        }
        match words.get(2) {
            None => {
                let Some(locals) = env.locals_mut() else { return Ok(Outcome::DeferToRuntime) };
                let Some(slot) = locals.find_or_create_local(name, false, LocalKind::Scalar) else {
                    return Ok(Outcome::DeferToRuntime);
                };
                env.emit1or4(Opcode::LoadScalar4, slot as i64);
            }
            Some(value_tok) => {
                token_compiler::compile_word(value_tok, env, ctx)?;
                let Some(locals) = env.locals_mut() else { return Ok(Outcome::DeferToRuntime) };
                let Some(slot) = locals.find_or_create_local(name, true, LocalKind::Scalar) else {
                    return Ok(Outcome::DeferToRuntime);
                };
                env.emit1or4(Opcode::StoreScalar4, slot as i64);
            }
        }
        Ok(Outcome::Ok)
    })
}

pub fn compile_lassign(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        let words = &cmd.words;
        if words.len() < 3 {
            return Ok(Outcome::DeferToRuntime);
        }
        let mut var_names = Vec::with_capacity(words.len() - 2);
        for tok in &words[2..] {
            let Some(name) = simple_text(tok) else { return Ok(Outcome::DeferToRuntime) };
            if name.contains("::") {
                return Ok(Outcome::DeferToRuntime);
            }
            var_names.push(name);
        }
        if env.locals().is_none() {
            return Ok(Outcome::DeferToRuntime);
        }

        token_compiler::compile_word(&words[1], env, ctx)?;
        for (i, name) in var_names.iter().enumerate() {
            env.emit(Opcode::Dup);
            env.emit1(Opcode::ListIndexImm, i as i64);
            let slot = env
                .locals_mut()
                .expect("checked above")
                .find_or_create_local(name, true, LocalKind::Scalar)
                .expect("non-qualified name");
            env.emit1or4(Opcode::StoreScalar4, slot as i64);
            env.emit(Opcode::Pop);
        }
        env.emit(Opcode::Pop);
        env.push_literal(b"");
        Ok(Outcome::Ok)
    })
}

pub fn compile_break(cmd: &ParsedCommand, env: &mut CompileEnv, _ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        if cmd.words.len() != 1 {
            return Ok(Outcome::DeferToRuntime);
        }
        let Some(range_idx) = env.innermost_loop_range() else { return Ok(Outcome::DeferToRuntime) };
        env.emit1or4(Opcode::Break, range_idx as i64);
        env.push_literal(b"");
        Ok(Outcome::Ok)
    })
}

pub fn compile_continue(cmd: &ParsedCommand, env: &mut CompileEnv, _ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| {
        if cmd.words.len() != 1 {
            return Ok(Outcome::DeferToRuntime);
        }
        let Some(range_idx) = env.innermost_loop_range() else { return Ok(Outcome::DeferToRuntime) };
        env.emit1or4(Opcode::Continue, range_idx as i64);
        env.push_literal(b"");
        Ok(Outcome::Ok)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ExceptionKind;
    use crate::locals::SimpleLocalFrame;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;
    use crate::token::{Token, TokenKind};

    fn word(s: &str) -> Token {
        Token::leaf(TokenKind::SimpleWord, 0, s.len(), s)
    }

    fn ctx() -> (SimpleParser, Ensemble) {
        (SimpleParser::new(), Ensemble::new())
    }

    #[test]
    fn set_with_value_stores_and_balances() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));
        let cmd = ParsedCommand { src_start: 0, src_len: 0, words: vec![word("set"), word("x"), word("1")] };
        let outcome = compile_set(&cmd, &mut env, &c).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn incr_with_default_delta() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));
        let cmd = ParsedCommand { src_start: 0, src_len: 0, words: vec![word("incr"), word("x")] };
        let outcome = compile_incr(&cmd, &mut env, &c).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn lassign_binds_each_variable() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));
        let cmd =
            ParsedCommand { src_start: 0, src_len: 0, words: vec![word("lassign"), word("$items"), word("a"), word("b")] };
        let outcome = compile_lassign(&cmd, &mut env, &c).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
        assert_eq!(env.locals().unwrap().len(), 2);
    }

    #[test]
    fn break_outside_loop_defers() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let cmd = ParsedCommand { src_start: 0, src_len: 0, words: vec![word("break")] };
        let outcome = compile_break(&cmd, &mut env, &c).unwrap();
        assert_eq!(outcome, Outcome::DeferToRuntime);
    }

    #[test]
    fn break_inside_loop_range_resolves() {
        let (parser, registry) = ctx();
        let c = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.begin_except_range(ExceptionKind::Loop);
        let cmd = ParsedCommand { src_start: 0, src_len: 0, words: vec![word("break")] };
        let outcome = compile_break(&cmd, &mut env, &c).unwrap();
        assert_eq!(outcome, Outcome::Ok);
    }
}
