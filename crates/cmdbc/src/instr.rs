//! The instruction table: the single source of truth for opcode shape.
//!
//! Every opcode carries a human-readable name, a stack effect, and up to two
//! operands whose kinds and widths are looked up here rather than hardcoded
//! at each call site. `CompileEnv::emit*`, the assembler, and the optimizer
//! all consult [`Opcode::descriptor`] instead of matching on the opcode
//! directly, the way `monty`'s `bytecode::op::Opcode` table backs
//! `CodeBuilder`'s `emit_*` methods.
//!
//! Code here is addressed by *word*, not by byte: a program is a
//! `Vec<InstrWord>`, and branch displacements are counted in words. This
//! differs from the teacher's byte-packed `Vec<u8>` encoding (and from the
//! original C implementation, which is byte-packed for cache density) but
//! matches this spec's own abstraction level ("instruction words" with
//! offsets "in words"), and keeps operand-width shrinking (the optimizer's
//! job) a matter of a field change rather than a byte-shuffle.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Closed set of operand kinds (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum OperandKind {
    /// No operand in this slot.
    None,
    /// Unsigned index into literal pool / local-var table / aux-data table.
    Uint,
    /// Signed immediate.
    Int,
    /// Signed branch displacement, in words, relative to the word containing it.
    Offset,
    /// Signed list index with encoded "end" semantics.
    Idx,
}

/// Width of an encoded operand: the narrow (1-byte) or wide (4-byte) form.
///
/// The compiler always emits [`OperandWidth::Wide`]; the optimizer's compact
/// pass (§4.7 pass 4) shrinks to [`OperandWidth::Narrow`] where the value
/// fits a signed/unsigned 8-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandWidth {
    Narrow,
    Wide,
}

impl OperandWidth {
    /// `true` if this slot can be re-checked for narrowing (i.e. is not fixed
    /// at its narrow form already).
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, OperandWidth::Wide)
    }
}

/// A single operand value plus the width it is currently encoded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub kind: OperandKind,
    pub value: i64,
    pub width: OperandWidth,
}

impl Operand {
    pub const NONE: Operand = Operand {
        kind: OperandKind::None,
        value: 0,
        width: OperandWidth::Narrow,
    };

    #[must_use]
    pub fn new(kind: OperandKind, value: i64, width: OperandWidth) -> Self {
        Self { kind, value, width }
    }

    /// `true` if `value` fits the legal range for a [`OperandWidth::Narrow`]
    /// encoding of this operand's kind.
    #[must_use]
    pub fn fits_narrow(&self) -> bool {
        match self.kind {
            OperandKind::None => true,
            OperandKind::Uint => (0..=u8::MAX as i64).contains(&self.value),
            OperandKind::Int | OperandKind::Offset | OperandKind::Idx => {
                (i8::MIN as i64..=i8::MAX as i64).contains(&self.value)
            }
        }
    }
}

/// Type hints the optimizer uses to elide redundant conversions (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Any,
    Bool,
    Int,
    Numeric,
}

/// Stack effect of an opcode (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// A fixed, operand-independent push/pop delta.
    Fixed(i32),
    /// Computed from the operand at emission time; `emit`/`emit1`/`emit4`
    /// apply zero delta automatically and the caller must call
    /// [`crate::env::CompileEnv::adjust_stack_depth`] explicitly.
    Variadic,
    /// "Leaves N of its M inputs": `produced = consumed - subtract - 1`,
    /// where `consumed` is the opcode's own Uint/Int operand value.
    LeavesOfOperand { subtract: i32 },
}

/// Static description of one opcode: name, stack effect, operand shape, and
/// type hints, looked up by every emission/analysis path (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct InstrDesc {
    pub name: &'static str,
    pub stack_effect: StackEffect,
    pub operand_count: usize,
    pub operand_kinds: [OperandKind; 2],
    pub in_type: TypeHint,
    pub out_type: TypeHint,
}

macro_rules! desc {
    ($name:literal, $effect:expr, $in:expr, $out:expr, [$($kind:expr),*]) => {{
        let kinds = [OperandKind::None, OperandKind::None];
        let mut kinds = kinds;
        let provided = [$($kind),*];
        let mut i = 0;
        while i < provided.len() {
            kinds[i] = provided[i];
            i += 1;
        }
        InstrDesc {
            name: $name,
            stack_effect: $effect,
            operand_count: provided.len(),
            operand_kinds: kinds,
            in_type: $in,
            out_type: $out,
        }
    }};
}

/// Every opcode the compiler can emit or the optimizer can rewrite.
///
/// Variants with a `1`/`4` suffix are the narrow/wide encodings of the same
/// logical instruction (§3.1's "two encodings... _STK1... _STK4"); a bare
/// name (e.g. `Pop`, `Dup`) has only one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumString, IntoStaticStr, Display, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Push1,
    Push4,
    Pop,
    Dup,
    Over1,
    Over4,
    Concat1,
    Concat4,
    Invoke1,
    Invoke4,
    EvalStk,
    ExprStk,
    ExpandStart,
    ExpandStkTop,
    InvokeExpanded,
    StartCmd,
    LoadScalar1,
    LoadScalar4,
    LoadArray1,
    LoadArray4,
    LoadStk,
    StoreScalar1,
    StoreScalar4,
    StoreArray1,
    StoreArray4,
    StoreStk,
    IncrScalar1Imm,
    IncrScalar1,
    IncrScalar4,
    IncrArray1Imm,
    IncrArray1,
    IncrArray4,
    IncrStkImm,
    IncrStk,
    Done,
    ReturnStk,
    Break,
    Continue,
    ForeachStart,
    ForeachStep,
    BeginCatch,
    EndCatch,
    Jump1,
    Jump4,
    JumpTrue1,
    JumpTrue4,
    JumpFalse1,
    JumpFalse4,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    StrEq,
    StrNeq,
    ListIn,
    ListNotIn,
    Lnot,
    Lyes,
    BitOr,
    BitXor,
    BitAnd,
    LShift,
    RShift,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    UPlus,
    UMinus,
    BitNot,
    Expon,
    CallBuiltinFunc1,
    CallFunc1,
    CallFunc4,
    TryConvertToNumeric,
    StrCmp,
    StrLen,
    StrIndex,
    StrMatch,
    StrMap,
    List1,
    List4,
    ListIndex,
    ListLength,
    LIndexMulti1,
    LIndexMulti4,
    LSetList,
    LSetFlat1,
    LSetFlat4,
    ListIndexImm,
    ListRangeImm,
    /// Inserted by the optimizer; never emitted by the compiler.
    Noop,
}

impl Opcode {
    /// Looks up the static descriptor for this opcode (§4.1: "single source
    /// of truth").
    #[must_use]
    pub fn descriptor(self) -> InstrDesc {
        use OperandKind::{Idx, Int, None as K, Offset, Uint};
        use StackEffect::{Fixed, LeavesOfOperand, Variadic};
        use TypeHint::{Any, Bool, Int as IntT, Numeric};
        match self {
            Opcode::Push1 | Opcode::Push4 => desc!("push", Fixed(1), Any, Any, [Uint]),
            Opcode::Pop => desc!("pop", Fixed(-1), Any, Any, []),
            Opcode::Dup => desc!("dup", Fixed(1), Any, Any, []),
            Opcode::Over1 | Opcode::Over4 => desc!("over", Fixed(1), Any, Any, [Uint]),
            Opcode::Concat1 | Opcode::Concat4 => desc!("concat", Variadic, Any, Any, [Uint]),
            Opcode::Invoke1 | Opcode::Invoke4 => desc!("invoke", Variadic, Any, Any, [Uint]),
            Opcode::EvalStk => desc!("evalStk", Fixed(0), Any, Any, []),
            Opcode::ExprStk => desc!("exprStk", Fixed(0), Any, Numeric, []),
            Opcode::ExpandStart => desc!("expandStart", Fixed(0), Any, Any, []),
            Opcode::ExpandStkTop => desc!("expandStkTop", Fixed(0), Any, Any, [Int]),
            Opcode::InvokeExpanded => desc!("invokeExpanded", Variadic, Any, Any, []),
            Opcode::StartCmd => desc!("startCmd", Fixed(0), Any, Any, [Offset, Uint]),
            Opcode::LoadScalar1 | Opcode::LoadScalar4 => desc!("loadScalar", Fixed(1), Any, Any, [Uint]),
            Opcode::LoadArray1 | Opcode::LoadArray4 => desc!("loadArray", Fixed(0), Any, Any, [Uint]),
            Opcode::LoadStk => desc!("loadStk", Fixed(0), Any, Any, []),
            Opcode::StoreScalar1 | Opcode::StoreScalar4 => desc!("storeScalar", Fixed(0), Any, Any, [Uint]),
            Opcode::StoreArray1 | Opcode::StoreArray4 => desc!("storeArray", Fixed(-1), Any, Any, [Uint]),
            Opcode::StoreStk => desc!("storeStk", Fixed(-1), Any, Any, []),
            Opcode::IncrScalar1Imm => desc!("incrScalar1Imm", Fixed(1), IntT, IntT, [Uint, Int]),
            Opcode::IncrScalar1 | Opcode::IncrScalar4 => desc!("incrScalar", Fixed(0), IntT, IntT, [Uint]),
            Opcode::IncrArray1Imm => desc!("incrArray1Imm", Fixed(0), IntT, IntT, [Uint, Int]),
            Opcode::IncrArray1 | Opcode::IncrArray4 => desc!("incrArray", Fixed(-1), IntT, IntT, [Uint]),
            Opcode::IncrStkImm => desc!("incrStkImm", Fixed(0), IntT, IntT, [Int]),
            Opcode::IncrStk => desc!("incrStk", Fixed(-1), IntT, IntT, []),
            Opcode::Done => desc!("done", Fixed(-1), Any, Any, []),
            Opcode::ReturnStk => desc!("returnStk", Fixed(-1), Any, Any, []),
            Opcode::Break => desc!("break", Fixed(0), Any, Any, [Uint]),
            Opcode::Continue => desc!("continue", Fixed(0), Any, Any, [Uint]),
            Opcode::ForeachStart => desc!("foreachStart", Fixed(0), Any, Any, [Uint]),
            Opcode::ForeachStep => desc!("foreachStep", Fixed(1), Any, Bool, [Uint]),
            Opcode::BeginCatch => desc!("beginCatch", Fixed(0), Any, Any, [Uint]),
            Opcode::EndCatch => desc!("endCatch", Fixed(0), Any, IntT, [Uint]),
            Opcode::Jump1 | Opcode::Jump4 => desc!("jump", Fixed(0), Any, Any, [Offset]),
            Opcode::JumpTrue1 | Opcode::JumpTrue4 => desc!("jumpTrue", Fixed(-1), Bool, Any, [Offset]),
            Opcode::JumpFalse1 | Opcode::JumpFalse4 => desc!("jumpFalse", Fixed(-1), Bool, Any, [Offset]),
            Opcode::Eq => desc!("eq", Fixed(-1), Numeric, Bool, []),
            Opcode::Neq => desc!("neq", Fixed(-1), Numeric, Bool, []),
            Opcode::Lt => desc!("lt", Fixed(-1), Numeric, Bool, []),
            Opcode::Le => desc!("le", Fixed(-1), Numeric, Bool, []),
            Opcode::Gt => desc!("gt", Fixed(-1), Numeric, Bool, []),
            Opcode::Ge => desc!("ge", Fixed(-1), Numeric, Bool, []),
            Opcode::StrEq => desc!("streq", Fixed(-1), Any, Bool, []),
            Opcode::StrNeq => desc!("strneq", Fixed(-1), Any, Bool, []),
            Opcode::ListIn => desc!("listIn", Fixed(-1), Any, Bool, []),
            Opcode::ListNotIn => desc!("listNotIn", Fixed(-1), Any, Bool, []),
            Opcode::Lnot => desc!("not", Fixed(0), Bool, Bool, []),
            Opcode::Lyes => desc!("yes", Fixed(0), Bool, Bool, []),
            Opcode::BitOr => desc!("bitor", Fixed(-1), IntT, IntT, []),
            Opcode::BitXor => desc!("bitxor", Fixed(-1), IntT, IntT, []),
            Opcode::BitAnd => desc!("bitand", Fixed(-1), IntT, IntT, []),
            Opcode::LShift => desc!("lshift", Fixed(-1), IntT, IntT, []),
            Opcode::RShift => desc!("rshift", Fixed(-1), IntT, IntT, []),
            Opcode::Add => desc!("add", Fixed(-1), Numeric, Numeric, []),
            Opcode::Sub => desc!("sub", Fixed(-1), Numeric, Numeric, []),
            Opcode::Mult => desc!("mult", Fixed(-1), Numeric, Numeric, []),
            Opcode::Div => desc!("div", Fixed(-1), Numeric, Numeric, []),
            Opcode::Mod => desc!("mod", Fixed(-1), IntT, IntT, []),
            Opcode::UPlus => desc!("uplus", Fixed(0), Numeric, Numeric, []),
            Opcode::UMinus => desc!("uminus", Fixed(0), Numeric, Numeric, []),
            Opcode::BitNot => desc!("bitnot", Fixed(0), IntT, IntT, []),
            Opcode::Expon => desc!("expon", Fixed(-1), Numeric, Numeric, []),
            Opcode::CallBuiltinFunc1 => desc!("callBuiltinFunc", Variadic, Numeric, Numeric, [Uint]),
            Opcode::CallFunc1 | Opcode::CallFunc4 => desc!("callFunc", Variadic, Numeric, Numeric, [Uint]),
            Opcode::TryConvertToNumeric => desc!("tryCvtToNumeric", Fixed(0), Numeric, Numeric, []),
            Opcode::StrCmp => desc!("strcmp", Fixed(-1), Any, IntT, []),
            Opcode::StrLen => desc!("strlen", Fixed(0), Any, IntT, []),
            Opcode::StrIndex => desc!("strindex", Fixed(-1), Any, Any, []),
            Opcode::StrMatch => desc!("strmatch", Fixed(-1), Any, Bool, [Int]),
            Opcode::StrMap => desc!("strmap", Fixed(-2), Any, Any, []),
            Opcode::List1 | Opcode::List4 => desc!("list", Variadic, Any, Any, [Uint]),
            Opcode::ListIndex => desc!("listIndex", Fixed(-1), Any, Any, []),
            Opcode::ListLength => desc!("listLength", Fixed(0), Any, IntT, []),
            Opcode::LIndexMulti1 | Opcode::LIndexMulti4 => {
                desc!("lindexMulti", LeavesOfOperand { subtract: 0 }, Any, Any, [Uint])
            }
            Opcode::LSetList => desc!("lsetList", Fixed(-2), Any, Any, []),
            Opcode::LSetFlat1 | Opcode::LSetFlat4 => {
                desc!("lsetFlat", LeavesOfOperand { subtract: 0 }, Any, Any, [Uint])
            }
            Opcode::ListIndexImm => desc!("listIndexImm", Fixed(0), Any, Any, [Idx]),
            Opcode::ListRangeImm => desc!("listRangeImm", Fixed(0), Any, Any, [Idx, Idx]),
            Opcode::Noop => desc!("noop", Fixed(0), Any, Any, []),
        }
    }

    /// `true` if this variant is the wide (4-byte operand) half of a
    /// narrow/wide pair (§3.1, §6 "1or4 opcode pairs").
    #[must_use]
    pub fn is_wide_form(self) -> bool {
        self.narrow_form().is_some_and(|n| n != self)
    }

    /// Returns the narrow-encoding sibling of a narrow/wide pair, or `self`
    /// if this opcode has only one encoding.
    #[must_use]
    pub fn narrow_form(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            Push1 | Push4 => Push1,
            Over1 | Over4 => Over1,
            Concat1 | Concat4 => Concat1,
            Invoke1 | Invoke4 => Invoke1,
            LoadScalar1 | LoadScalar4 => LoadScalar1,
            LoadArray1 | LoadArray4 => LoadArray1,
            StoreScalar1 | StoreScalar4 => StoreScalar1,
            StoreArray1 | StoreArray4 => StoreArray1,
            IncrScalar1 | IncrScalar4 => IncrScalar1,
            IncrArray1 | IncrArray4 => IncrArray1,
            Jump1 | Jump4 => Jump1,
            JumpTrue1 | JumpTrue4 => JumpTrue1,
            JumpFalse1 | JumpFalse4 => JumpFalse1,
            CallFunc1 | CallFunc4 => CallFunc1,
            List1 | List4 => List1,
            LIndexMulti1 | LIndexMulti4 => LIndexMulti1,
            LSetFlat1 | LSetFlat4 => LSetFlat1,
            _ => return None,
        })
    }

    /// Returns the wide-encoding sibling of a narrow/wide pair, or `self`.
    #[must_use]
    pub fn wide_form(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            Push1 | Push4 => Push4,
            Over1 | Over4 => Over4,
            Concat1 | Concat4 => Concat4,
            Invoke1 | Invoke4 => Invoke4,
            LoadScalar1 | LoadScalar4 => LoadScalar4,
            LoadArray1 | LoadArray4 => LoadArray4,
            StoreScalar1 | StoreScalar4 => StoreScalar4,
            StoreArray1 | StoreArray4 => StoreArray4,
            IncrScalar1 | IncrScalar4 => IncrScalar4,
            IncrArray1 | IncrArray4 => IncrArray4,
            Jump1 | Jump4 => Jump4,
            JumpTrue1 | JumpTrue4 => JumpTrue4,
            JumpFalse1 | JumpFalse4 => JumpFalse4,
            CallFunc1 | CallFunc4 => CallFunc4,
            List1 | List4 => List4,
            LIndexMulti1 | LIndexMulti4 => LIndexMulti4,
            LSetFlat1 | LSetFlat4 => LSetFlat4,
            _ => return None,
        })
    }

    /// `true` if the opcode unconditionally transfers control (ends a basic
    /// block with no fall-through successor).
    #[must_use]
    pub fn is_unconditional_jump(self) -> bool {
        matches!(self, Opcode::Jump1 | Opcode::Jump4)
    }

    /// `true` if the opcode is a conditional jump.
    #[must_use]
    pub fn is_conditional_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpTrue1 | Opcode::JumpTrue4 | Opcode::JumpFalse1 | Opcode::JumpFalse4
        )
    }

    /// `true` if the opcode is any jump (conditional or not).
    #[must_use]
    pub fn is_jump(self) -> bool {
        self.is_unconditional_jump() || self.is_conditional_jump()
    }

    /// `true` if control never falls through past this opcode (`done`,
    /// unconditional jump, `returnStk`).
    #[must_use]
    pub fn terminates_block(self) -> bool {
        self.is_unconditional_jump()
            || matches!(self, Opcode::Done | Opcode::ReturnStk | Opcode::Break | Opcode::Continue)
    }
}

/// A single instruction word: an opcode plus up to two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrWord {
    pub opcode: Opcode,
    pub operands: [Operand; 2],
}

impl InstrWord {
    #[must_use]
    pub fn new(opcode: Opcode, operands: [Operand; 2]) -> Self {
        Self { opcode, operands }
    }

    #[must_use]
    pub fn no_operand(opcode: Opcode) -> Self {
        Self::new(opcode, [Operand::NONE, Operand::NONE])
    }

    /// Returns the operand count the descriptor says this opcode expects.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.opcode.descriptor().operand_count
    }

    /// For jump opcodes, the displacement (in words) carried by operand 0.
    #[must_use]
    pub fn jump_offset(&self) -> Option<i64> {
        self.opcode.is_jump().then_some(self.operands[0].value)
    }

    pub fn set_jump_offset(&mut self, offset: i64) {
        debug_assert!(self.opcode.is_jump());
        self.operands[0].value = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_consistent_with_operand_count() {
        // Every Opcode variant round-trips through FromRepr within range.
        for code in 0..=(Opcode::Noop as u8) {
            let op = Opcode::from_repr(code).expect("dense repr");
            let d = op.descriptor();
            assert_eq!(d.operand_count, d.operand_kinds.iter().filter(|k| **k != OperandKind::None).count());
        }
    }

    #[test]
    fn narrow_wide_pairs_are_symmetric() {
        assert_eq!(Opcode::Push1.wide_form(), Some(Opcode::Push4));
        assert_eq!(Opcode::Push4.narrow_form(), Some(Opcode::Push1));
        assert_eq!(Opcode::Pop.narrow_form(), None);
    }

    #[test]
    fn fits_narrow_checks_signed_and_unsigned_ranges() {
        let uint_op = Operand::new(OperandKind::Uint, 255, OperandWidth::Wide);
        assert!(uint_op.fits_narrow());
        let uint_op_too_big = Operand::new(OperandKind::Uint, 256, OperandWidth::Wide);
        assert!(!uint_op_too_big.fits_narrow());

        let offset_op = Operand::new(OperandKind::Offset, -128, OperandWidth::Wide);
        assert!(offset_op.fits_narrow());
        let offset_op_too_small = Operand::new(OperandKind::Offset, -129, OperandWidth::Wide);
        assert!(!offset_op_too_small.fits_narrow());
    }
}
