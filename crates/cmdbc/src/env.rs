//! `CompileEnv`: the mutable accumulator every compiler writes through
//! (§3.3, §4.2).
//!
//! Grounded on `monty::bytecode::builder::CodeBuilder` for the emission
//! idiom (append-and-track-stack-depth methods returning a handle the
//! caller patches later) generalized to this spec's wider opcode/operand
//! shape, exception-range kinds, and aux data.

use crate::auxdata::AuxData;
use crate::bytecode::{ByteCode, ExceptionKind, ExceptionRange};
use crate::cmdmap::CmdMapEntry;
use crate::error::{CompileError, CompileResult};
use crate::instr::{InstrWord, Operand, OperandKind, OperandWidth, Opcode, StackEffect};
use crate::literal::{LiteralFlags, LiteralTable, SimpleLiteralTable};
use crate::locals::LocalFrame;

/// A forward-jump placeholder awaiting a target (§3.5, §9: modeled as a
/// plain handle rather than a backpatch chain through operand storage,
/// since Rust vectors don't need the C implementation's linked-list trick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupHandle(pub usize);

/// Which conditional (if any) a forward/backward jump tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Always,
    IfTrue,
    IfFalse,
}

impl JumpKind {
    fn wide_opcode(self) -> Opcode {
        match self {
            JumpKind::Always => Opcode::Jump4,
            JumpKind::IfTrue => Opcode::JumpTrue4,
            JumpKind::IfFalse => Opcode::JumpFalse4,
        }
    }
}

#[derive(Debug)]
struct RangeBuilder {
    kind: ExceptionKind,
    code_start: usize,
    nesting_level: usize,
    main_target: Option<usize>,
    continue_target: Option<usize>,
    closed_len: Option<usize>,
}

/// A snapshot of every piece of mutable state a command compiler can touch,
/// taken before a compiler attempt that might abort with `DeferToRuntime`
/// (§4.4, §9 "Rollback of partial emission").
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    code_next: usize,
    num_commands: usize,
    literal_next: usize,
    except_range_next: usize,
    aux_data_next: usize,
    curr_stack_depth: i64,
}

/// The mutable compile-time builder (§3.3).
pub struct CompileEnv {
    code: Vec<InstrWord>,
    literals: Box<dyn LiteralTable>,
    locals: Option<Box<dyn LocalFrame>>,
    ranges: Vec<RangeBuilder>,
    range_stack: Vec<usize>,
    aux_data: Vec<AuxData>,
    cmd_locations: Vec<CmdMapEntry>,
    open_cmd: Option<(usize, usize)>,
    curr_stack_depth: i64,
    max_stack_depth: i64,
    catch_depth: usize,
    max_catch_depth: usize,
    at_cmd_start: bool,
    num_commands: usize,
    precompiled: bool,
    epoch: u64,
}

impl CompileEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::with_literal_table(Box::new(SimpleLiteralTable::new()))
    }

    #[must_use]
    pub fn with_literal_table(literals: Box<dyn LiteralTable>) -> Self {
        Self {
            code: Vec::new(),
            literals,
            locals: None,
            ranges: Vec::new(),
            range_stack: Vec::new(),
            aux_data: Vec::new(),
            cmd_locations: Vec::new(),
            open_cmd: None,
            curr_stack_depth: 0,
            max_stack_depth: 0,
            catch_depth: 0,
            max_catch_depth: 0,
            at_cmd_start: false,
            num_commands: 0,
            precompiled: false,
            epoch: 0,
        }
    }

    /// Attaches a local-variable frame, making this a procedure-body
    /// compilation (§3.3 "Handle to an owning Proc").
    pub fn set_locals(&mut self, locals: Box<dyn LocalFrame>) {
        self.locals = Some(locals);
    }

    #[must_use]
    pub fn locals(&self) -> Option<&dyn LocalFrame> {
        self.locals.as_deref()
    }

    #[must_use]
    pub fn locals_mut(&mut self) -> Option<&mut (dyn LocalFrame + 'static)> {
        self.locals.as_deref_mut()
    }

    #[must_use]
    pub fn in_proc_context(&self) -> bool {
        self.locals.is_some()
    }

    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    pub fn mark_precompiled(&mut self) {
        self.precompiled = true;
    }

    #[must_use]
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn curr_stack_depth(&self) -> i64 {
        self.curr_stack_depth
    }

    #[must_use]
    pub fn at_cmd_start(&self) -> bool {
        self.at_cmd_start
    }

    fn apply_stack_effect(&mut self, effect: StackEffect) {
        match effect {
            StackEffect::Fixed(delta) => self.adjust_stack_depth(delta as i64),
            StackEffect::Variadic | StackEffect::LeavesOfOperand { .. } => {
                // Caller must call `adjust_stack_depth` explicitly (§4.2).
            }
        }
    }

    /// Unconditional stack-depth adjustment for opcodes whose effect is
    /// known only by the compiler (§4.2).
    pub fn adjust_stack_depth(&mut self, delta: i64) {
        self.curr_stack_depth += delta;
        debug_assert!(self.curr_stack_depth >= 0, "stack depth went negative");
        if self.curr_stack_depth > self.max_stack_depth {
            self.max_stack_depth = self.curr_stack_depth;
        }
    }

    fn push_word(&mut self, word: InstrWord) -> usize {
        let idx = self.code.len();
        self.apply_stack_effect(word.opcode.descriptor().stack_effect);
        self.code.push(word);
        self.at_cmd_start = false;
        idx
    }

    /// Appends `opcode` with no operand.
    pub fn emit(&mut self, opcode: Opcode) -> usize {
        self.push_word(InstrWord::no_operand(opcode))
    }

    /// Appends `opcode` with a single narrow (1-byte range) operand.
    pub fn emit1(&mut self, opcode: Opcode, value: i64) -> usize {
        self.emit_with_operand(opcode, value, OperandWidth::Narrow)
    }

    /// Appends `opcode` with a single wide (4-byte range) operand.
    pub fn emit4(&mut self, opcode: Opcode, value: i64) -> usize {
        self.emit_with_operand(opcode, value, OperandWidth::Wide)
    }

    /// Chooses the narrow or wide form of `opcode` based on `value`'s
    /// magnitude (§4.2 `emit1or4`).
    pub fn emit1or4(&mut self, opcode: Opcode, value: i64) -> usize {
        let kind = opcode.descriptor().operand_kinds[0];
        let probe = Operand::new(kind, value, OperandWidth::Wide);
        if probe.fits_narrow() {
            let narrow = opcode.narrow_form().unwrap_or(opcode);
            self.emit1(narrow, value)
        } else {
            let wide = opcode.wide_form().unwrap_or(opcode);
            self.emit4(wide, value)
        }
    }

    fn emit_with_operand(&mut self, opcode: Opcode, value: i64, width: OperandWidth) -> usize {
        let kind = opcode.descriptor().operand_kinds[0];
        debug_assert_ne!(kind, OperandKind::None, "{opcode} takes no operand");
        let operand = Operand::new(kind, value, width);
        self.push_word(InstrWord::new(opcode, [operand, Operand::NONE]))
    }

    /// Appends a two-operand opcode (`startCmd`, `listRangeImm`) directly.
    pub fn emit_word(&mut self, word: InstrWord) -> usize {
        self.push_word(word)
    }

    /// Registers `bytes` in the literal pool and emits a `push` of it,
    /// choosing operand width by the resulting index's magnitude.
    pub fn push_literal(&mut self, bytes: &[u8]) -> usize {
        let idx = self.register_literal(bytes, LiteralFlags::NONE);
        self.emit1or4(Opcode::Push4, idx as i64)
    }

    /// Registers `bytes` in the literal pool without emitting anything
    /// (§4.2 `registerLiteral`).
    pub fn register_literal(&mut self, bytes: &[u8], flags: LiteralFlags) -> usize {
        self.literals.register(bytes, flags)
    }

    pub fn release_literal(&mut self, index: usize) {
        self.literals.release(index);
    }

    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    /// Emits a forward jump with a placeholder operand, returning a handle
    /// to patch once the target offset is known (§4.2 `emitForwardJump`).
    pub fn emit_forward_jump(&mut self, kind: JumpKind) -> FixupHandle {
        let idx = self.emit4(kind.wide_opcode(), 0);
        FixupHandle(idx)
    }

    /// Patches a forward-jump fixup to target the current offset. Must be
    /// called exactly once per fixup before `finalize` (§4.2, §5).
    pub fn fixup_forward_jump_to_here(&mut self, fixup: FixupHandle) {
        let here = self.code.len() as i64;
        let rel = here - fixup.0 as i64;
        self.code[fixup.0].set_jump_offset(rel);
    }

    /// Emits a backward jump directly to a known word offset (loop
    /// rotation's back-edge, §4.4.2).
    pub fn emit_backward_jump(&mut self, kind: JumpKind, target_word: usize) -> usize {
        let idx = self.code.len();
        let rel = target_word as i64 - idx as i64;
        self.emit4(kind.wide_opcode(), rel)
    }

    /// Opens a new exception range nested inside any currently open one
    /// (§4.2 `beginExceptRange`). Returns its index.
    pub fn begin_except_range(&mut self, kind: ExceptionKind) -> usize {
        let nesting_level = self.range_stack.len();
        let idx = self.ranges.len();
        self.ranges.push(RangeBuilder {
            kind,
            code_start: self.code.len(),
            nesting_level,
            main_target: None,
            continue_target: None,
            closed_len: None,
        });
        self.range_stack.push(idx);
        if kind == ExceptionKind::Catch {
            self.catch_depth += 1;
            self.max_catch_depth = self.max_catch_depth.max(self.catch_depth);
        }
        idx
    }

    /// Closes the exception range at `idx`, which must be the innermost
    /// open range (§4.2 `endExceptRange`). `main_target` is mandatory;
    /// `continue_target` only applies to `Loop` ranges.
    pub fn end_except_range(
        &mut self,
        idx: usize,
        main_target: usize,
        continue_target: Option<usize>,
    ) -> CompileResult<()> {
        if self.range_stack.last() != Some(&idx) {
            return Err(CompileError::shape("endExceptRange on a range that is not innermost-open"));
        }
        self.range_stack.pop();
        let r = &mut self.ranges[idx];
        r.closed_len = Some(self.code.len() - r.code_start);
        r.main_target = Some(main_target);
        r.continue_target = continue_target;
        if r.kind == ExceptionKind::Catch {
            self.catch_depth -= 1;
        }
        Ok(())
    }

    /// The innermost open `Loop` range, for `break`/`continue` to target
    /// (they carry a range index operand, not a jump target — the
    /// optimizer resolves it statically where possible, §4.7 pass 1).
    #[must_use]
    pub fn innermost_loop_range(&self) -> Option<usize> {
        self.range_stack.iter().rev().copied().find(|&idx| self.ranges[idx].kind == ExceptionKind::Loop)
    }

    #[must_use]
    pub fn innermost_open_range(&self) -> Option<usize> {
        self.range_stack.last().copied()
    }

    /// Allocates an aux-data record, returning its index for use as an
    /// opcode operand (e.g. `foreachStart infoIndex`).
    pub fn push_aux_data(&mut self, data: AuxData) -> usize {
        let idx = self.aux_data.len();
        self.aux_data.push(data);
        idx
    }

    pub fn aux_data_mut(&mut self, idx: usize) -> &mut AuxData {
        &mut self.aux_data[idx]
    }

    /// Marks the start of a new source command (§4.2 `enterCmdLocation`).
    /// Also emits `startCmd` so the ISC bailout/unreachable-code machinery
    /// has a root (§9 open question on command boundaries as reachability
    /// roots).
    pub fn enter_cmd_location(&mut self, src_start: usize) {
        let code_start = self.code.len();
        self.open_cmd = Some((src_start, code_start));
        self.emit_word(InstrWord::new(
            Opcode::StartCmd,
            [Operand::new(OperandKind::Offset, 0, OperandWidth::Wide), Operand::new(OperandKind::Uint, 0, OperandWidth::Wide)],
        ));
        self.at_cmd_start = true;
    }

    /// Closes the command opened by `enter_cmd_location`, recording its
    /// source and code extents (§4.2 `setCmdExtent`).
    pub fn set_cmd_extent(&mut self, src_len: usize) -> CompileResult<()> {
        let (src_start, code_start) = self
            .open_cmd
            .take()
            .ok_or_else(|| CompileError::resource("setCmdExtent with no open command"))?;
        let code_len = self.code.len() - code_start;
        if let Some(last) = self.cmd_locations.last() {
            debug_assert!((code_start as u32) >= last.code_start, "cmdMap codeStart must be monotone");
        }
        let span = (self.code.len() - code_start).max(1);
        self.code[code_start].operands[0].value = span as i64;
        self.cmd_locations.push(CmdMapEntry {
            src_start: src_start as i64,
            src_len: src_len as u32,
            code_start: code_start as u32,
            code_len: code_len as u32,
        });
        self.num_commands += 1;
        Ok(())
    }

    /// Takes a snapshot of every field a rolled-back command compiler
    /// attempt can have touched (§4.4, §9).
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            code_next: self.code.len(),
            num_commands: self.num_commands,
            literal_next: self.literals.len(),
            except_range_next: self.ranges.len(),
            aux_data_next: self.aux_data.len(),
            curr_stack_depth: self.curr_stack_depth,
        }
    }

    /// Restores state to a prior snapshot, releasing any literals
    /// registered since (§4.4 mandatory rollback discipline).
    pub fn rollback_to(&mut self, snap: Snapshot) {
        for idx in snap.literal_next..self.literals.len() {
            self.literals.release(idx);
        }
        self.code.truncate(snap.code_next);
        self.num_commands = snap.num_commands;
        self.ranges.truncate(snap.except_range_next);
        self.range_stack.retain(|&idx| idx < snap.except_range_next);
        self.aux_data.truncate(snap.aux_data_next);
        self.curr_stack_depth = snap.curr_stack_depth;
        self.at_cmd_start = false;
    }

    /// Moves ownership of every pool into an immutable [`ByteCode`] (§3.7).
    /// Fails if any exception range was left open (a compiler bug, not a
    /// user error, but worth surfacing rather than silently dropping a
    /// half-built range).
    pub fn finalize(self) -> CompileResult<ByteCode> {
        if !self.range_stack.is_empty() {
            return Err(CompileError::resource("finalize with an exception range still open"));
        }
        if self.open_cmd.is_some() {
            return Err(CompileError::resource("finalize with a command location still open"));
        }
        let mut exception_ranges = Vec::with_capacity(self.ranges.len());
        for r in self.ranges {
            let code_len = r
                .closed_len
                .ok_or_else(|| CompileError::resource("finalize with an unclosed exception range"))?;
            let main_target = r
                .main_target
                .ok_or_else(|| CompileError::resource("exception range missing mainTarget"))?;
            exception_ranges.push(ExceptionRange {
                kind: r.kind,
                code_start: r.code_start,
                code_len,
                main_target,
                continue_target: r.continue_target,
                nesting_level: r.nesting_level,
            });
        }
        let local_count = self.locals.as_ref().map_or(0, |l| l.len());
        Ok(ByteCode {
            code: self.code,
            literals: self.literals.into_literals(),
            exception_ranges,
            aux_data: self.aux_data,
            cmd_map: self.cmd_locations,
            max_stack_depth: self.max_stack_depth.max(0) as usize,
            max_catch_depth: self.max_catch_depth,
            local_count,
            precompiled: self.precompiled,
            epoch: self.epoch,
        })
    }
}

impl Default for CompileEnv {
    fn default() -> Self {
        Self::new()
    }
}
