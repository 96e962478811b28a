//! Optimizer pass 4 (§4.7): strips every [`Opcode::Noop`] word, reassigns
//! offsets, and rewrites everything that names a word index — jump and
//! `startCmd` operands, exception-range targets, and `cmdMap` entries — to
//! match. Any operand that narrows as a result feeds back into another
//! round of [`super::peephole`] (the "relaxation loop" the spec describes:
//! shrinking a jump can expose a new peephole match, e.g. a jump-threading
//! chain that only became visible once a dead block disappeared).
//!
//! `JumptableInfo`'s case-to-offset map is left untouched: nothing in this
//! crate's command compilers currently emits it (`switch` compiles to a
//! cascade of comparisons, not a jump table), so there is no live producer
//! to validate the remapping against. Documented as a gap in `DESIGN.md`
//! rather than guessed at.

use crate::bytecode::ByteCode;
use crate::instr::{InstrWord, Opcode, OperandKind};

/// Maps an old word index to its post-compaction index. A target that was
/// itself dead code (so has no entry of its own) falls through to the next
/// surviving word — `mark_dead_as_noop`'s reachability walk guarantees no
/// *live* jump ever targets a span with no surviving successor.
fn remap_word_index(new_index: &[Option<usize>], old: usize) -> usize {
    if let Some(&Some(n)) = new_index.get(old) {
        return n;
    }
    new_index[old.min(new_index.len())..]
        .iter()
        .find_map(|x| *x)
        .unwrap_or_else(|| new_index.iter().rev().find_map(|x| *x).map_or(0, |n| n + 1))
}

/// Removes dead/no-op words, shifts every remaining word down to close the
/// gaps, and rewrites all word-index-valued fields to match. Returns `true`
/// if any jump/`startCmd` operand was shrunk to its narrow form as a result.
pub fn compact(bc: &mut ByteCode) -> bool {
    let old_len = bc.code.len();
    let mut new_index: Vec<Option<usize>> = vec![None; old_len];
    let mut next = 0usize;
    for (old, word) in bc.code.iter().enumerate() {
        if word.opcode != Opcode::Noop {
            new_index[old] = Some(next);
            next += 1;
        }
    }

    if next == old_len {
        return shrink_operands(&mut bc.code);
    }

    let mut rebuilt: Vec<InstrWord> = Vec::with_capacity(next);
    for (old_pc, word) in bc.code.iter().enumerate() {
        if word.opcode == Opcode::Noop {
            continue;
        }
        let new_pc = new_index[old_pc].expect("kept word has a new index");
        let mut w = *word;
        for slot in 0..w.operand_count() {
            if w.operands[slot].kind == OperandKind::Offset && (w.opcode.is_jump() || w.opcode == Opcode::StartCmd) {
                let old_target = (old_pc as i64 + w.operands[slot].value).max(0) as usize;
                let new_target = remap_word_index(&new_index, old_target);
                w.operands[slot].value = new_target as i64 - new_pc as i64;
            }
        }
        rebuilt.push(w);
    }
    bc.code = rebuilt;

    for range in &mut bc.exception_ranges {
        let old_start = range.code_start;
        let old_end = range.code_end().min(old_len);
        range.main_target = remap_word_index(&new_index, range.main_target);
        range.continue_target = range.continue_target.map(|t| remap_word_index(&new_index, t));
        range.code_start = remap_word_index(&new_index, old_start);
        let new_end = if old_end <= old_start { range.code_start } else { remap_word_index(&new_index, old_end - 1) + 1 };
        range.code_len = new_end.saturating_sub(range.code_start);
    }

    for entry in &mut bc.cmd_map {
        let old_start = entry.code_start as usize;
        let old_end = (old_start + entry.code_len as usize).min(old_len);
        let new_start = remap_word_index(&new_index, old_start);
        let new_end = if old_end <= old_start { new_start } else { remap_word_index(&new_index, old_end - 1) + 1 };
        entry.code_start = new_start as u32;
        entry.code_len = new_end.saturating_sub(new_start) as u32;
    }

    shrink_operands(&mut bc.code)
}

fn shrink_operands(code: &mut [InstrWord]) -> bool {
    let mut shrank = false;
    for word in code.iter_mut() {
        if !(word.opcode.is_jump() || word.opcode == Opcode::StartCmd) {
            continue;
        }
        let Some(narrow) = word.opcode.narrow_form() else { continue };
        if narrow == word.opcode {
            continue;
        }
        let n = word.operand_count();
        if word.operands[..n].iter().all(crate::instr::Operand::fits_narrow) {
            word.opcode = narrow;
            shrank = true;
        }
    }
    shrank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{InstrWord, Operand, OperandKind, OperandWidth};

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
    fn noop_words_are_removed_and_jump_offsets_rewritten() {
        // jump(3) targets word 3 (Done). Words 1 and 2 are dead noops.
        let mut bc = bc_from(vec![
            jump(3),
            InstrWord::no_operand(Opcode::Noop),
            InstrWord::no_operand(Opcode::Noop),
            InstrWord::no_operand(Opcode::Done),
        ]);
        compact(&mut bc);
        assert_eq!(bc.code.len(), 2);
        assert_eq!(bc.code[0].jump_offset(), Some(1));
        assert_eq!(bc.code[1].opcode, Opcode::Done);
    }

    #[test]
    fn wide_jump_shrinks_to_narrow_when_it_fits() {
        let mut bc = bc_from(vec![jump(1), InstrWord::no_operand(Opcode::Done)]);
        let shrank = compact(&mut bc);
        assert!(shrank);
        assert_eq!(bc.code[0].opcode, Opcode::Jump1);
    }
}
