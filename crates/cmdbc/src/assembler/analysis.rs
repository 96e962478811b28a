//! Post-assembly stack-balance analysis (§4.6).
//!
//! A DFS from word 0 over the instruction graph, recording the stack depth
//! at which each word is first reached and re-checking it matches on every
//! later path into the same word. Two named failure modes mirror the spec
//! exactly: a word reached at two different depths along different paths
//! ("inconsistent stack depths on two execution paths"), and a depth that
//! would go negative ("stack underflow").
//!
//! Variadic opcodes ([`StackEffect::Variadic`]) are resolved here as
//! "consume the Uint operand's worth of values, produce one" — the
//! convention every compiler call site in this crate already follows
//! manually via [`CompileEnv::adjust_stack_depth`]. `invokeExpanded` has no
//! operand to read a count from; its true consumption is only known at
//! runtime, so it is treated as a net-zero no-op here, a documented gap
//! (see `DESIGN.md`) rather than a guess.

use crate::error::{CompileError, CompileResult};
use crate::instr::{InstrWord, OperandKind, StackEffect};
use std::collections::HashMap;

pub struct Analysis {
    pub max_stack_depth: i64,
}

fn net_delta(word: &InstrWord) -> i64 {
    match word.opcode.descriptor().stack_effect {
        StackEffect::Fixed(d) => d as i64,
        StackEffect::LeavesOfOperand { subtract } => -(subtract as i64) - 1,
        StackEffect::Variadic => {
            let has_uint_operand = word.opcode.descriptor().operand_kinds.iter().any(|k| *k == OperandKind::Uint);
            if has_uint_operand {
                1 - word.operands[0].value
            } else {
                0
            }
        }
    }
}

fn successors(code: &[InstrWord], pc: usize) -> Vec<usize> {
    let w = &code[pc];
    let mut out = Vec::with_capacity(2);
    if w.opcode.is_jump() {
        let target = pc as i64 + w.operands[0].value;
        if target >= 0 {
            out.push(target as usize);
        }
    }
    if !w.opcode.terminates_block() && pc + 1 < code.len() {
        out.push(pc + 1);
    }
    out
}

/// Walks `code` from word 0, tracking stack depth along every reachable
/// path. `initial_depth` is the depth the caller's own stack is at when
/// control enters `code` (nonzero when assembling a nested `eval <script>`
/// body that is merged into an enclosing compile, §4.6).
pub fn check_stack_balance(code: &[InstrWord], initial_depth: i64) -> CompileResult<Analysis> {
    if code.is_empty() {
        return Ok(Analysis { max_stack_depth: initial_depth.max(0) });
    }

    let mut depth_at: HashMap<usize, i64> = HashMap::new();
    let mut max_depth = initial_depth;
    let mut stack = vec![(0usize, initial_depth)];
    depth_at.insert(0, initial_depth);

    while let Some((pc, depth_in)) = stack.pop() {
        if pc >= code.len() {
            return Err(CompileError::shape("control falls off the end of the instruction list"));
        }
        let delta = net_delta(&code[pc]);
        let depth_out = depth_in + delta;
        if depth_out < 0 {
            return Err(CompileError::shape(format!("stack underflow at word {pc}")));
        }
        max_depth = max_depth.max(depth_out);

        for succ in successors(code, pc) {
            match depth_at.get(&succ) {
                Some(&seen) if seen != depth_out => {
                    return Err(CompileError::shape(format!(
                        "inconsistent stack depths on two execution paths reaching word {succ} ({seen} vs {depth_out})"
                    )));
                }
                Some(_) => {}
                None => {
                    depth_at.insert(succ, depth_out);
                    stack.push((succ, depth_out));
                }
            }
        }
    }

    Ok(Analysis { max_stack_depth: max_depth })
}
