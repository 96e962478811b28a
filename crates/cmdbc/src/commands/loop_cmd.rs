//! `while`/`for` (§4.4.2): a `Loop`-kind exception range wrapping a
//! rotated (bottom-test) loop shape, with `break`/`continue` targeting the
//! range by index rather than a fixed-up jump (§4.2, §9).
//!
//! Loop rotation (§4.4.2, glossary "loop rotation") places the condition
//! test at the *end* of the body: a forward `jump` skips straight past the
//! body to the test on entry, the body sits first, and the test's
//! conditional jump branches backward to the body. The steady-state loop
//! then costs one taken branch per iteration instead of two (test at the
//! top would need both a forward conditional exit and a backward
//! unconditional repeat). A statically-true test (`while 1 {...}`) skips
//! the entry jump and the test entirely, emitting a plain backward jump —
//! §4.4.2's infinite-loop special case.

use super::{probe_bool, simple_text, with_rollback, Outcome};
use crate::bytecode::ExceptionKind;
use crate::ctx::CompileCtx;
use crate::env::{CompileEnv, JumpKind};
use crate::error::CompileResult;
use crate::token::ParsedCommand;

fn compile_body(body_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(body_text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

fn compile_cond(test_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    crate::expr::compile_expr_source(test_text, env, ctx)
}

pub fn compile_while(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_while_inner(cmd, env, ctx))
}

fn compile_while_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    if words.len() != 3 {
        return Ok(Outcome::DeferToRuntime);
    }
    let Some(test_text) = simple_text(&words[1]) else { return Ok(Outcome::DeferToRuntime) };
    let Some(body_text) = simple_text(&words[2]) else { return Ok(Outcome::DeferToRuntime) };

    let range_idx = env.begin_except_range(ExceptionKind::Loop);

    if probe_bool(test_text) == Some(true) {
        // `while 1 {...}`: no test, no entry jump, just a backward repeat.
        let body_start = env.code_len();
        compile_body(body_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        env.emit_backward_jump(JumpKind::Always, body_start);
        let main_target = env.code_len();
        env.end_except_range(range_idx, main_target, Some(body_start))?;
    } else {
        let entry_jump = env.emit_forward_jump(JumpKind::Always);
        let body_start = env.code_len();
        compile_body(body_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        let test_start = env.code_len();
        env.fixup_forward_jump_to_here(entry_jump);
        compile_cond(test_text, env, ctx)?;
        env.emit_backward_jump(JumpKind::IfTrue, body_start);
        let main_target = env.code_len();
        env.end_except_range(range_idx, main_target, Some(test_start))?;
    }

    env.push_literal(b"");
    Ok(Outcome::Ok)
}

pub fn compile_for(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_for_inner(cmd, env, ctx))
}

fn compile_for_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    if words.len() != 5 {
        return Ok(Outcome::DeferToRuntime);
    }
    let Some(start_text) = simple_text(&words[1]) else { return Ok(Outcome::DeferToRuntime) };
    let Some(test_text) = simple_text(&words[2]) else { return Ok(Outcome::DeferToRuntime) };
    let Some(next_text) = simple_text(&words[3]) else { return Ok(Outcome::DeferToRuntime) };
    let Some(body_text) = simple_text(&words[4]) else { return Ok(Outcome::DeferToRuntime) };

    compile_body(start_text, env, ctx)?;
    env.emit(crate::instr::Opcode::Pop);

    let range_idx = env.begin_except_range(ExceptionKind::Loop);

    if probe_bool(test_text) == Some(true) {
        // `for {...} 1 {...} {...}`: no test, no entry jump. `continue`
        // still runs the increment clause before repeating the body.
        let body_start = env.code_len();
        compile_body(body_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        let continue_target = env.code_len();
        compile_body(next_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        env.emit_backward_jump(JumpKind::Always, body_start);
        let main_target = env.code_len();
        env.end_except_range(range_idx, main_target, Some(continue_target))?;
    } else {
        // Rotated: entry jump skips straight to the test (first iteration
        // runs neither the increment nor a redundant pre-body check), the
        // body and increment sit first, the test and its conditional
        // back-jump sit last.
        let entry_jump = env.emit_forward_jump(JumpKind::Always);
        let body_start = env.code_len();
        compile_body(body_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        let continue_target = env.code_len();
        compile_body(next_text, env, ctx)?;
        env.emit(crate::instr::Opcode::Pop);
        env.fixup_forward_jump_to_here(entry_jump);
        compile_cond(test_text, env, ctx)?;
        env.emit_backward_jump(JumpKind::IfTrue, body_start);
        let main_target = env.code_len();
        env.end_except_range(range_idx, main_target, Some(continue_target))?;
    }

    env.push_literal(b"");
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
    fn while_loop_opens_and_closes_one_loop_range() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));
        env.locals_mut().unwrap().find_or_create_local("i", true, crate::locals::LocalKind::Scalar);

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("while"), word("$i < 10"), word("incr i")],
        };
        let outcome = compile_while(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn while_loop_rotates_the_test_to_the_bottom() {
        // §8 scenario 2 (`while {$i < 10} {incr i}`): entry is an
        // unconditional forward jump, not a test; the body runs first.
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));
        env.locals_mut().unwrap().find_or_create_local("i", true, crate::locals::LocalKind::Scalar);

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("while"), word("$i < 10"), word("incr i")],
        };
        compile_while(&cmd, &mut env, &ctx).unwrap();
        let bc = env.finalize().unwrap();
        assert!(bc.code[0].opcode.is_unconditional_jump(), "entry word should be the unconditional jump to the test");
        let back_edge = bc.code.iter().rev().find(|w| w.opcode.is_jump()).unwrap();
        assert!(back_edge.opcode.is_conditional_jump(), "the loop's repeat jump should be the test's conditional jump");
        assert!(back_edge.jump_offset().unwrap() < 0, "the repeat jump should point backward to the body");
    }

    #[test]
    fn while_true_emits_a_plain_backward_jump_with_no_entry_or_test() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));

        let cmd = ParsedCommand { src_start: 0, src_len: 0, words: vec![word("while"), word("1"), word("break")] };
        compile_while(&cmd, &mut env, &ctx).unwrap();
        let bc = env.finalize().unwrap();
        // No conditional jump anywhere: the test was elided entirely.
        assert!(!bc.code.iter().any(|w| w.opcode.is_conditional_jump()));
        assert!(bc.code.iter().any(|w| w.opcode.is_unconditional_jump() && w.jump_offset().unwrap() < 0));
    }

    #[test]
    fn for_loop_compiles_all_four_clauses() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        env.set_locals(Box::new(SimpleLocalFrame::new()));

        let cmd = ParsedCommand {
            src_start: 0,
            src_len: 0,
            words: vec![word("for"), word("set i 0"), word("$i < 3"), word("incr i"), word("set x $i")],
        };
        let outcome = compile_for(&cmd, &mut env, &ctx).unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(env.curr_stack_depth(), 1);
    }
}
