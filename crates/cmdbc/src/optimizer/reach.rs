//! Optimizer pass 1 and pass 2 (§4.7).
//!
//! Pass 1 statically resolves every `break`/`continue` into a plain `jump`
//! now that the exception ranges they reference are finalized, then seeds a
//! `paths[]` count of how many ways each word can be reached — from word 0
//! and from every exception range's `mainTarget`/`continueTarget`, since a
//! handler entry is itself a root the straight-line walk wouldn't otherwise
//! find. Pass 2 uses that count to retire unreachable words to [`Noop`]
//! ahead of compaction (§4.7 pass 4), rather than physically relocating
//! them after `DONE` first — compaction strips every `Noop` regardless of
//! where it sits, so the two approaches produce an identical final layout
//! (documented in `DESIGN.md`).
//!
//! [`Noop`]: crate::instr::Opcode::Noop

use crate::bytecode::ByteCode;
use crate::error::{CompileError, CompileResult};
use crate::instr::{Opcode, Operand, OperandKind, OperandWidth};
use std::collections::HashSet;

/// Rewrites every `break`/`continue` word into an unconditional `jump` to
/// its range's resolved target. Must run before [`compute_paths`], since
/// `break`/`continue` carry a range index rather than a jump displacement
/// and the reachability walk only follows jumps.
pub fn resolve_break_continue(bc: &mut ByteCode) -> CompileResult<()> {
    for pc in 0..bc.code.len() {
        let opcode = bc.code[pc].opcode;
        if opcode != Opcode::Break && opcode != Opcode::Continue {
            continue;
        }
        let range_idx = bc.code[pc].operands[0].value as usize;
        let range = bc
            .exception_ranges
            .get(range_idx)
            .ok_or_else(|| CompileError::shape(format!("break/continue at word {pc} names an unknown range")))?;
        let target = if opcode == Opcode::Break {
            range.main_target
        } else {
            range.continue_target.ok_or_else(|| CompileError::shape(format!("continue at word {pc} has no continue target")))?
        };
        let rel = target as i64 - pc as i64;
        bc.code[pc] =
            crate::instr::InstrWord::new(Opcode::Jump4, [Operand::new(OperandKind::Offset, rel, OperandWidth::Wide), Operand::NONE]);
    }
    Ok(())
}

fn successors(bc: &ByteCode, pc: usize) -> Vec<usize> {
    let w = &bc.code[pc];
    let mut out = Vec::with_capacity(2);
    if w.opcode.is_jump() {
        let target = pc as i64 + w.operands[0].value;
        if target >= 0 && (target as usize) < bc.code.len() {
            out.push(target as usize);
        }
    }
    if !w.opcode.terminates_block() && pc + 1 < bc.code.len() {
        out.push(pc + 1);
    }
    out
}

/// Counts, for every word, how many distinct edges reach it (0 means
/// unreachable). Roots are word 0 plus every exception range's
/// `mainTarget`/`continueTarget` (a handler entry has no in-code
/// predecessor edge of its own, §3.2).
#[must_use]
pub fn compute_paths(bc: &ByteCode) -> Vec<u32> {
    let len = bc.code.len();
    let mut paths = vec![0u32; len];
    if len == 0 {
        return paths;
    }

    let mut roots = vec![0usize];
    for r in &bc.exception_ranges {
        roots.push(r.main_target);
        if let Some(ct) = r.continue_target {
            roots.push(ct);
        }
    }

    let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();
    let mut worklist: Vec<usize> = Vec::new();
    for &root in &roots {
        if root < len {
            paths[root] += 1;
            worklist.push(root);
        }
    }

    while let Some(pc) = worklist.pop() {
        for succ in successors(bc, pc) {
            if seen_edges.insert((pc, succ)) {
                paths[succ] += 1;
                worklist.push(succ);
            }
        }
    }

    paths
}

/// Retires every word with a zero path count to [`Opcode::Noop`].
pub fn mark_dead_as_noop(bc: &mut ByteCode, paths: &[u32]) {
    for (pc, count) in paths.iter().enumerate() {
        if *count == 0 {
            bc.code[pc] = crate::instr::InstrWord::no_operand(Opcode::Noop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ExceptionKind, ExceptionRange};
    use crate::instr::InstrWord;

    fn bc_from(code: Vec<InstrWord>) -> ByteCode {
        ByteCode {
            code,
            literals: Vec::new(),
            exception_ranges: Vec::new(),
            aux_data: Vec::new(),
            cmd_map: Vec::new(),
            max_stack_depth: 4,
            max_catch_depth: 0,
            local_count: 0,
            precompiled: false,
            epoch: 0,
        }
    }

    fn jump(off: i64) -> InstrWord {
        InstrWord::new(Opcode::Jump4, [Operand::new(OperandKind::Offset, off, OperandWidth::Wide), Operand::NONE])
    }

    #[test]
    fn break_resolves_to_loop_main_target() {
        let mut bc = bc_from(vec![
            InstrWord::new(Opcode::Break, [Operand::new(OperandKind::Uint, 0, OperandWidth::Wide), Operand::NONE]),
            InstrWord::no_operand(Opcode::Pop),
            InstrWord::no_operand(Opcode::Done),
        ]);
        bc.exception_ranges.push(ExceptionRange {
            kind: ExceptionKind::Loop,
            code_start: 0,
            code_len: 3,
            main_target: 2,
            continue_target: Some(0),
            nesting_level: 0,
        });
        resolve_break_continue(&mut bc).unwrap();
        assert_eq!(bc.code[0].opcode, Opcode::Jump4);
        assert_eq!(bc.code[0].jump_offset(), Some(2));
    }

    #[test]
    fn unreachable_code_after_unconditional_jump_gets_zero_paths() {
        let bc = bc_from(vec![jump(2), InstrWord::no_operand(Opcode::Pop), InstrWord::no_operand(Opcode::Done)]);
        let paths = compute_paths(&bc);
        assert_eq!(paths, vec![1, 0, 1]);
    }

    #[test]
    fn mark_dead_converts_zero_path_words_to_noop() {
        let mut bc = bc_from(vec![jump(2), InstrWord::no_operand(Opcode::Pop), InstrWord::no_operand(Opcode::Done)]);
        let paths = compute_paths(&bc);
        mark_dead_as_noop(&mut bc, &paths);
        assert_eq!(bc.code[1].opcode, Opcode::Noop);
        assert_eq!(bc.code[2].opcode, Opcode::Done);
    }
}
