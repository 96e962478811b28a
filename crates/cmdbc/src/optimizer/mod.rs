//! The bytecode optimizer (§4.7): four passes run over a finished
//! [`ByteCode`], each named after what it does rather than a pass number.
//!
//! Grounded on `pro-grammer-SD-axiom/axm/src/optimizer.rs`'s `optimize()`
//! entry point sequencing named pass functions over a shared mutable
//! `Proto` — the closest full pass-pipeline example in the retrieval pack,
//! used here for the pipeline *shape* while every individual rewrite stays
//! grounded in this crate's own opcode table and `ByteCode` record.
//!
//! 1. [`reach::resolve_break_continue`] turns every `break`/`continue` into
//!    a plain `jump` now that their ranges are finalized.
//! 2. [`reach::compute_paths`] + [`reach::mark_dead_as_noop`] retire
//!    unreachable words.
//! 3. [`peephole::run_to_fixed_point`] rewrites adjacent-word patterns to a
//!    fixed point.
//! 4. [`compact::compact`] strips every `Noop`, renumbers everything that
//!    names a word index, and shrinks operands that now fit narrow. If that
//!    shrink changed anything, pass 3 runs again — a shrink can expose a new
//!    peephole match (e.g. a jump that only reaches another jump once a
//!    dead block between them has been removed).

pub mod compact;
pub mod peephole;
pub mod reach;

use crate::bytecode::ByteCode;
use crate::error::CompileResult;

/// Runs every pass over `bc` and returns the optimized result. `bc` is
/// consumed and replaced wholesale, matching [`ByteCode`]'s own doc comment
/// ("nothing... mutates `code`... except the optimizer, which replaces the
/// whole record").
pub fn optimize(mut bc: ByteCode) -> CompileResult<ByteCode> {
    reach::resolve_break_continue(&mut bc)?;
    let paths = reach::compute_paths(&bc);
    reach::mark_dead_as_noop(&mut bc, &paths);

    loop {
        peephole::run_to_fixed_point(&mut bc);
        if !compact::compact(&mut bc) {
            break;
        }
    }

    Ok(bc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ExceptionKind, ExceptionRange};
    use crate::instr::{InstrWord, Opcode, Operand, OperandKind, OperandWidth};

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
    fn dead_code_after_unconditional_jump_is_stripped() {
        let bc = bc_from(vec![jump(2), InstrWord::no_operand(Opcode::Pop), InstrWord::no_operand(Opcode::Done)]);
        let out = optimize(bc).unwrap();
        assert_eq!(out.code.len(), 2);
        assert_eq!(out.code[1].opcode, Opcode::Done);
    }

    #[test]
    fn break_inside_a_loop_range_compiles_to_a_narrow_jump_to_main_target() {
        // main_target points at `dup`, not straight at `done`, so the
        // jump-to-terminal inlining rule doesn't also collapse it away —
        // this isolates the break-resolution + shrink behavior.
        let mut bc = bc_from(vec![
            InstrWord::new(Opcode::Break, [Operand::new(OperandKind::Uint, 0, OperandWidth::Wide), Operand::NONE]),
            InstrWord::no_operand(Opcode::Dup),
            InstrWord::no_operand(Opcode::Done),
        ]);
        bc.exception_ranges.push(ExceptionRange {
            kind: ExceptionKind::Loop,
            code_start: 0,
            code_len: 3,
            main_target: 1,
            continue_target: Some(0),
            nesting_level: 0,
        });
        let out = optimize(bc).unwrap();
        assert_eq!(out.code.len(), 3);
        assert_eq!(out.code[0].opcode, Opcode::Jump1);
        assert_eq!(out.code[0].jump_offset(), Some(1));
    }

    #[test]
    fn jump_threading_plus_shrink_relax_removes_the_chain_and_narrows() {
        // Three jumps chain down to a `dup; done` tail, with two dead noops
        // interleaved. Threading re-targets every jump straight at `dup` in
        // one sweep; compaction then drops the noops and narrows all three
        // (now-adjacent-target) jumps to their 1-byte form.
        let bc = bc_from(vec![
            jump(2),
            InstrWord::no_operand(Opcode::Noop),
            jump(2),
            InstrWord::no_operand(Opcode::Noop),
            jump(1),
            InstrWord::no_operand(Opcode::Dup),
            InstrWord::no_operand(Opcode::Done),
        ]);
        let out = optimize(bc).unwrap();
        assert_eq!(out.code.len(), 5);
        assert_eq!(out.code[3].opcode, Opcode::Dup);
        assert_eq!(out.code[4].opcode, Opcode::Done);
        for (i, word) in out.code[..3].iter().enumerate() {
            assert_eq!(word.opcode, Opcode::Jump1, "word {i} should have narrowed");
            assert_eq!(i as i64 + word.jump_offset().unwrap(), 3, "word {i} should target the dup at index 3");
        }
    }
}
