//! Basic-block segmentation (§4.6).
//!
//! A new block begins at word 0, at every label target, and immediately
//! after any instruction that ends a block (`terminates_block`, plus
//! conditional jumps which have a fall-through successor in addition to
//! their branch target). [`analysis`](super::analysis) walks the program at
//! per-instruction granularity for the actual stack-balance DFS; this
//! module exists to let that walk, and the optimizer's later passes,
//! reason about block boundaries without recomputing them.

use crate::instr::InstrWord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

impl Block {
    #[must_use]
    pub fn contains(&self, pc: usize) -> bool {
        (self.start..self.end).contains(&pc)
    }
}

#[must_use]
pub fn split_into_blocks(code: &[InstrWord], label_offsets: &[usize]) -> Vec<Block> {
    if code.is_empty() {
        return Vec::new();
    }
    let mut starts: Vec<usize> = vec![0];
    starts.extend(label_offsets.iter().copied());
    for (i, w) in code.iter().enumerate() {
        if (w.opcode.terminates_block() || w.opcode.is_conditional_jump()) && i + 1 < code.len() {
            starts.push(i + 1);
        }
    }
    starts.retain(|&s| s < code.len());
    starts.sort_unstable();
    starts.dedup();

    let mut blocks = Vec::with_capacity(starts.len());
    for (idx, &s) in starts.iter().enumerate() {
        let e = starts.get(idx + 1).copied().unwrap_or(code.len());
        if e > s {
            blocks.push(Block { start: s, end: e });
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{Opcode, Operand, OperandKind, OperandWidth};

    fn jump(off: i64) -> InstrWord {
        InstrWord::new(Opcode::Jump4, [Operand::new(OperandKind::Offset, off, OperandWidth::Wide), Operand::NONE])
    }

    #[test]
    fn unconditional_jump_splits_the_block() {
        let code = vec![InstrWord::no_operand(Opcode::Pop), jump(1), InstrWord::no_operand(Opcode::Pop)];
        let blocks = split_into_blocks(&code, &[]);
        assert_eq!(blocks, vec![Block { start: 0, end: 2 }, Block { start: 2, end: 3 }]);
    }

    #[test]
    fn label_offset_forces_a_new_block_even_mid_stream() {
        let code = vec![InstrWord::no_operand(Opcode::Pop), InstrWord::no_operand(Opcode::Dup)];
        let blocks = split_into_blocks(&code, &[1]);
        assert_eq!(blocks, vec![Block { start: 0, end: 1 }, Block { start: 1, end: 2 }]);
    }
}
