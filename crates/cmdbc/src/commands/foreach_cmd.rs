//! `foreach` (§4.4.3): one `ForeachInfo` aux-data record per call, two
//! reserved temporaries (first-value cursor, loop counter), and a
//! `Loop`-kind exception range identical in shape to `while`'s.

use super::{simple_text, with_rollback, Outcome};
use crate::auxdata::{AuxData, ForeachInfo, VarList};
use crate::bytecode::ExceptionKind;
use crate::ctx::CompileCtx;
use crate::env::{CompileEnv, JumpKind};
use crate::error::{CompileError, CompileResult};
use crate::instr::Opcode;
use crate::locals::LocalKind;
use crate::token::ParsedCommand;
use crate::token_compiler;

fn compile_body(body_text: &str, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let parsed = ctx.parser.parse_script(body_text)?;
    crate::script::compile_nested_script(&parsed, env, ctx)
}

pub fn compile(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    with_rollback(env, |env| compile_inner(cmd, env, ctx))
}

fn compile_inner(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<Outcome> {
    let words = &cmd.words;
    // foreach varlist1 list1 [varlist2 list2 ...] body
    if words.len() < 4 || words.len() % 2 != 0 {
        return Ok(Outcome::DeferToRuntime);
    }
    let Some(body_text) = simple_text(&words[words.len() - 1]) else { return Ok(Outcome::DeferToRuntime) };
    let pairs = &words[1..words.len() - 1];

    if env.locals().is_none() {
        return Ok(Outcome::DeferToRuntime);
    }

    let mut var_lists = Vec::with_capacity(pairs.len() / 2);
    for chunk in pairs.chunks(2) {
        let Some(varlist_text) = simple_text(&chunk[0]) else { return Ok(Outcome::DeferToRuntime) };
        let list_tok = &chunk[1];
        token_compiler::compile_word(list_tok, env, ctx)?;

        let var_names: Vec<&str> = varlist_text.split_whitespace().collect();
        if var_names.is_empty() {
            return Ok(Outcome::DeferToRuntime);
        }
        let mut var_indexes = Vec::with_capacity(var_names.len());
        for name in &var_names {
            let idx = env
                .locals_mut()
                .expect("checked above")
                .find_or_create_local(name, true, LocalKind::Scalar)
                .ok_or_else(|| CompileError::scope(format!("cannot bind foreach variable {name}")))?;
            var_indexes.push(idx);
        }
        var_lists.push(VarList { num_vars: var_names.len(), var_indexes });
    }
    let num_lists = var_lists.len();

    let locals = env.locals_mut().expect("checked above");
    let first_value_temp = locals.create_temp(LocalKind::Scalar);
    let loop_ct_temp = locals.create_temp(LocalKind::Scalar);

    let range_idx = env.begin_except_range(ExceptionKind::Loop);
    let info = ForeachInfo { num_lists, first_value_temp, loop_ct_temp, range_index: range_idx, var_lists };
    let aux_idx = env.push_aux_data(AuxData::Foreach(info));
    env.emit1or4(Opcode::ForeachStart, aux_idx as i64);

    let test_start = env.code_len();
    env.emit1or4(Opcode::ForeachStep, aux_idx as i64);
    let exit_fixup = env.emit_forward_jump(JumpKind::IfFalse);
    compile_body(body_text, env, ctx)?;
    env.emit(Opcode::Pop);
    env.emit_backward_jump(JumpKind::Always, test_start);
    env.fixup_forward_jump_to_here(exit_fixup);

    let main_target = env.code_len();
    env.end_except_range(range_idx, main_target, Some(test_start))?;
    for _ in 0..num_lists {
        env.emit(Opcode::Pop);
    }
    env.push_literal(b"");
    Ok(Outcome::Ok)
}
