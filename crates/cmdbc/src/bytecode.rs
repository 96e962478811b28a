//! The finalized, immutable compilation result (§3.2).
//!
//! Grounded on `monty::bytecode::code::Code`, which plays the same role for
//! the teacher (instruction buffer + constant pool + location table +
//! exception table bundled into one post-build record); `ByteCode` widens
//! that shape with aux data, a `cmdMap`, and the exception-range kinds this
//! spec needs (loop *and* catch, not just `try`).

use crate::auxdata::AuxData;
use crate::cmdmap::CmdMapEntry;
use crate::error::{CompileError, CompileResult};
use crate::instr::InstrWord;
use crate::literal::LiteralBytes;
use serde::{Deserialize, Serialize};

/// Exception-range kind (§3.2): a `loop` range tracks break/continue
/// targets, a `catch` range tracks the single handler entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionKind {
    Loop,
    Catch,
}

/// One exception range (§3.2). `continueTarget` is only meaningful for
/// `Loop` ranges; `Catch` ranges leave it `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRange {
    pub kind: ExceptionKind,
    pub code_start: usize,
    pub code_len: usize,
    pub main_target: usize,
    pub continue_target: Option<usize>,
    pub nesting_level: usize,
}

impl ExceptionRange {
    #[must_use]
    pub fn code_end(&self) -> usize {
        self.code_start + self.code_len
    }

    /// `true` if word offset `pc` lies inside this range's guarded span.
    #[must_use]
    pub fn contains(&self, pc: usize) -> bool {
        pc >= self.code_start && pc < self.code_end()
    }

    /// Validates the §3.2 invariant that targets never land back inside the
    /// guarded span.
    #[must_use]
    pub fn targets_outside_range(&self) -> bool {
        !self.contains(self.main_target)
            && self.continue_target.map_or(true, |t| !self.contains(t))
    }
}

/// The finalized compilation artifact (§3.2). Immutable once built:
/// `CompileEnv::finalize` moves ownership of its pools in; nothing after
/// that point mutates `code`, `literals`, `exception_ranges`, or `aux_data`
/// except the optimizer, which replaces the whole record.
///
/// `Serialize`/`Deserialize` back [`ByteCode::to_precompiled`]/
/// [`ByteCode::from_precompiled`], the optional "precompiled bytecode"
/// round-trip (§2), mirroring `monty`'s `repl.rs` `dump`/`load` pair built on
/// the same `serde` + `postcard` combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByteCode {
    pub code: Vec<InstrWord>,
    pub literals: Vec<LiteralBytes>,
    pub exception_ranges: Vec<ExceptionRange>,
    pub aux_data: Vec<AuxData>,
    pub cmd_map: Vec<CmdMapEntry>,
    pub max_stack_depth: usize,
    pub max_catch_depth: usize,
    pub local_count: usize,
    /// `true` when literals are privately owned rather than tracked through
    /// a shared per-interpreter literal table (§3.7, §5). Precompiled
    /// bytecode releases its literals directly on drop instead of calling
    /// back into a (possibly already-gone) shared table.
    pub precompiled: bool,
    /// Ties this record to the interpreter/namespace epoch that compiled
    /// it (§3.2); a caller can reject a stale `ByteCode` by comparing this
    /// against the interpreter's current epoch before executing it.
    pub epoch: u64,
}

impl ByteCode {
    /// The canonical empty-script result (§8 boundary behavior): a single
    /// pushed empty literal plus `DONE`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the innermost exception range containing word offset `pc`,
    /// preferring the most deeply nested (highest `nesting_level`) match.
    #[must_use]
    pub fn innermost_range_at(&self, pc: usize) -> Option<&ExceptionRange> {
        self.exception_ranges
            .iter()
            .filter(|r| r.contains(pc))
            .max_by_key(|r| r.nesting_level)
    }

    /// Serializes this record to the precompiled-bytecode wire format (§2):
    /// `postcard`'s compact binary encoding over `serde`'s derived impls,
    /// the same pairing `monty`'s `repl.rs` uses for its own `dump`.
    pub fn to_precompiled(&self) -> CompileResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| CompileError::resource(format!("encoding precompiled bytecode: {e}")))
    }

    /// Deserializes a record previously produced by [`ByteCode::to_precompiled`].
    /// Marks the result `precompiled` (§3.2): its literals are privately
    /// owned rather than tracked through a shared per-interpreter table.
    pub fn from_precompiled(bytes: &[u8]) -> CompileResult<ByteCode> {
        let mut bc: ByteCode =
            postcard::from_bytes(bytes).map_err(|e| CompileError::resource(format!("decoding precompiled bytecode: {e}")))?;
        bc.precompiled = true;
        Ok(bc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(kind: ExceptionKind, start: usize, len: usize, main: usize) -> ExceptionRange {
        ExceptionRange { kind, code_start: start, code_len: len, main_target: main, continue_target: None, nesting_level: 0 }
    }

    #[test]
    fn exception_range_rejects_targets_inside_guarded_span() {
        let r = range(ExceptionKind::Catch, 0, 4, 2);
        assert!(!r.targets_outside_range());
        let r2 = range(ExceptionKind::Catch, 0, 4, 10);
        assert!(r2.targets_outside_range());
    }

    #[test]
    fn innermost_range_prefers_deepest_nesting() {
        let mut outer = range(ExceptionKind::Loop, 0, 10, 20);
        outer.nesting_level = 0;
        let mut inner = range(ExceptionKind::Catch, 2, 4, 20);
        inner.nesting_level = 1;
        let bc = ByteCode {
            code: vec![],
            literals: vec![],
            exception_ranges: vec![outer, inner],
            aux_data: vec![],
            cmd_map: vec![],
            max_stack_depth: 0,
            max_catch_depth: 1,
            local_count: 0,
            precompiled: false,
            epoch: 0,
        };
        assert_eq!(bc.innermost_range_at(3).unwrap().kind, ExceptionKind::Catch);
    }

    #[test]
    fn precompiled_round_trip_preserves_code_and_literals() {
        use crate::instr::{InstrWord, Opcode, Operand, OperandKind, OperandWidth};
        let bc = ByteCode {
            code: vec![
                InstrWord::new(Opcode::Push4, [Operand::new(OperandKind::Uint, 0, OperandWidth::Wide), Operand::NONE]),
                InstrWord::no_operand(Opcode::Done),
            ],
            literals: vec![std::sync::Arc::from(&b"hello"[..])],
            exception_ranges: vec![range(ExceptionKind::Loop, 0, 2, 1)],
            aux_data: vec![],
            cmd_map: vec![],
            max_stack_depth: 1,
            max_catch_depth: 0,
            local_count: 0,
            precompiled: false,
            epoch: 7,
        };
        let bytes = bc.to_precompiled().unwrap();
        let back = ByteCode::from_precompiled(&bytes).unwrap();
        assert_eq!(back.code, bc.code);
        assert_eq!(back.literals, bc.literals);
        assert_eq!(back.exception_ranges, bc.exception_ranges);
        assert_eq!(back.epoch, bc.epoch);
        assert!(back.precompiled, "a decoded record is always marked precompiled");
    }
}
