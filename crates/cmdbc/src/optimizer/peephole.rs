//! Optimizer pass 3 (§4.7): a fixed-point peephole sweep over adjacent
//! words, run to convergence before each compaction attempt.
//!
//! Every rewrite rule below turns a word into [`Opcode::Noop`] rather than
//! physically removing it — pass 4 ([`super::compact`]) is the only place
//! that shortens `code`, so every other pass can reason about word indices
//! staying put.

use crate::bytecode::ByteCode;
use crate::instr::{InstrWord, Opcode, Operand, OperandKind, OperandWidth, TypeHint};

const JUMP_THREAD_HOP_LIMIT: usize = 8;

fn noop() -> InstrWord {
    InstrWord::no_operand(Opcode::Noop)
}

fn is_side_effect_free_producer(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Push1 | Opcode::Push4 | Opcode::Dup | Opcode::LoadScalar1 | Opcode::LoadScalar4 | Opcode::LoadArray1 | Opcode::LoadArray4
    )
}

/// Interprets a literal's bytes as a Tcl boolean, if it unambiguously is one.
fn literal_as_bool(bc: &ByteCode, literal_idx: i64) -> Option<bool> {
    let bytes = bc.literals.get(usize::try_from(literal_idx).ok()?)?;
    match &**bytes {
        b"0" | b"false" | b"no" | b"off" => Some(false),
        b"1" | b"true" | b"yes" | b"on" => Some(true),
        _ => None,
    }
}

fn flip_conditional(op: Opcode) -> Option<Opcode> {
    match op {
        Opcode::JumpTrue1 => Some(Opcode::JumpFalse1),
        Opcode::JumpTrue4 => Some(Opcode::JumpFalse4),
        Opcode::JumpFalse1 => Some(Opcode::JumpTrue1),
        Opcode::JumpFalse4 => Some(Opcode::JumpTrue4),
        _ => None,
    }
}

/// One sweep over `code`, left-to-right. Returns `true` if anything changed.
fn sweep(bc: &mut ByteCode) -> bool {
    let mut changed = false;
    let len = bc.code.len();

    // Jump threading: follow chains of unconditional jumps to their final
    // target so a jump never lands on another jump.
    for pc in 0..len {
        if !bc.code[pc].opcode.is_jump() {
            continue;
        }
        let mut target = pc as i64 + bc.code[pc].operands[0].value;
        let mut hops = 0;
        while hops < JUMP_THREAD_HOP_LIMIT && target >= 0 && (target as usize) < len {
            let t = &bc.code[target as usize];
            if t.opcode.is_unconditional_jump() {
                let next = target + t.operands[0].value;
                if next == target {
                    break;
                }
                target = next;
                hops += 1;
            } else {
                break;
            }
        }
        let new_offset = target - pc as i64;
        if new_offset != bc.code[pc].operands[0].value {
            bc.code[pc].set_jump_offset(new_offset);
            changed = true;
        }
    }

    for pc in 0..len {
        let op = bc.code[pc].opcode;

        // Conversion elision: a numeric/bool value already of the right
        // type hint doesn't need `tryCvtToNumeric`/`yes` re-applied.
        if (op == Opcode::TryConvertToNumeric || op == Opcode::Lyes) && pc > 0 {
            let prev = bc.code[pc - 1].opcode;
            if prev != Opcode::Noop {
                let prev_out = prev.descriptor().out_type;
                let wants = if op == Opcode::TryConvertToNumeric { TypeHint::Numeric } else { TypeHint::Bool };
                if prev_out == wants {
                    bc.code[pc] = noop();
                    changed = true;
                    continue;
                }
            }
        }

        // `not x; jumpTrue/jumpFalse L` -> drop the `not`, flip the jump.
        if op.is_conditional_jump() && pc > 0 && bc.code[pc - 1].opcode == Opcode::Lnot {
            if let Some(flipped) = flip_conditional(op) {
                bc.code[pc - 1] = noop();
                let offset = bc.code[pc].operands[0].value;
                bc.code[pc] = InstrWord::new(flipped, [Operand::new(OperandKind::Offset, offset, OperandWidth::Wide), Operand::NONE]);
                changed = true;
                continue;
            }
        }

        // `not; not` -> no-op pair.
        if op == Opcode::Lnot && pc > 0 && bc.code[pc - 1].opcode == Opcode::Lnot {
            bc.code[pc] = noop();
            bc.code[pc - 1] = noop();
            changed = true;
            continue;
        }

        // `push <bool literal>; jumpTrue/jumpFalse L` constant folding.
        if op.is_conditional_jump() && pc > 0 {
            let prev = bc.code[pc - 1];
            if matches!(prev.opcode, Opcode::Push1 | Opcode::Push4) {
                if let Some(value) = literal_as_bool(bc, prev.operands[0].value) {
                    let taken = (op == Opcode::JumpTrue1 || op == Opcode::JumpTrue4) == value;
                    bc.code[pc - 1] = noop();
                    if taken {
                        let offset = bc.code[pc].operands[0].value;
                        let wide = if offset.abs() <= i8::MAX as i64 { Opcode::Jump1 } else { Opcode::Jump4 };
                        bc.code[pc] =
                            InstrWord::new(wide, [Operand::new(OperandKind::Offset, offset, OperandWidth::Wide), Operand::NONE]);
                    } else {
                        bc.code[pc] = noop();
                    }
                    changed = true;
                    continue;
                }
            }
        }

        // `<side-effect-free producer>; pop` -> both vanish.
        if op == Opcode::Pop && pc > 0 && is_side_effect_free_producer(bc.code[pc - 1].opcode) {
            bc.code[pc] = noop();
            bc.code[pc - 1] = noop();
            changed = true;
            continue;
        }

        // `jump-around-jump`: `jumpTrue/jumpFalse +2; jump far` where the
        // conditional's fall-through is exactly the unconditional jump ->
        // invert the conditional straight to `far` and drop the middle jump.
        if op.is_conditional_jump() && bc.code[pc].operands[0].value == 2 && pc + 1 < len && bc.code[pc + 1].opcode.is_unconditional_jump() {
            if let Some(flipped) = flip_conditional(op) {
                let far = bc.code[pc + 1].operands[0].value + 1; // +1: displacement was relative to pc+1
                bc.code[pc] = InstrWord::new(flipped, [Operand::new(OperandKind::Offset, far, OperandWidth::Wide), Operand::NONE]);
                bc.code[pc + 1] = noop();
                changed = true;
                continue;
            }
        }

        // `jump L` where `L` is an operand-less terminal -> inline it.
        if op.is_unconditional_jump() {
            let target = pc as i64 + bc.code[pc].operands[0].value;
            if target >= 0 && target as usize != pc && (target as usize) < len {
                let t_op = bc.code[target as usize].opcode;
                if matches!(t_op, Opcode::Done | Opcode::ReturnStk) {
                    bc.code[pc] = InstrWord::no_operand(t_op);
                    changed = true;
                }
            }
        }
    }

    changed
}

/// Runs [`sweep`] to a fixed point. Returns `true` if any sweep changed
/// anything.
pub fn run_to_fixed_point(bc: &mut ByteCode) -> bool {
    let mut any = false;
    loop {
        if !sweep(bc) {
            break;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ByteCode;

    fn bc_from(code: Vec<InstrWord>, literals: Vec<Vec<u8>>) -> ByteCode {
        ByteCode {
            code,
            literals: literals.into_iter().map(Into::into).collect(),
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

    fn push(literal_idx: i64) -> InstrWord {
        InstrWord::new(Opcode::Push4, [Operand::new(OperandKind::Uint, literal_idx, OperandWidth::Wide), Operand::NONE])
    }

    fn jump(off: i64) -> InstrWord {
        InstrWord::new(Opcode::Jump4, [Operand::new(OperandKind::Offset, off, OperandWidth::Wide), Operand::NONE])
    }

    #[test]
    fn double_negation_becomes_noop_pair() {
        let mut bc = bc_from(vec![InstrWord::no_operand(Opcode::Lnot), InstrWord::no_operand(Opcode::Lnot), InstrWord::no_operand(Opcode::Done)], vec![]);
        run_to_fixed_point(&mut bc);
        assert_eq!(bc.code[0].opcode, Opcode::Noop);
        assert_eq!(bc.code[1].opcode, Opcode::Noop);
    }

    #[test]
    fn push_true_then_jump_true_becomes_unconditional_jump() {
        let jt = InstrWord::new(Opcode::JumpTrue4, [Operand::new(OperandKind::Offset, 1, OperandWidth::Wide), Operand::NONE]);
        let mut bc = bc_from(vec![push(0), jt, InstrWord::no_operand(Opcode::Done)], vec![b"1".to_vec()]);
        run_to_fixed_point(&mut bc);
        assert_eq!(bc.code[0].opcode, Opcode::Noop);
        assert!(bc.code[1].opcode.is_unconditional_jump());
    }

    #[test]
    fn push_then_pop_with_no_other_use_vanishes() {
        let mut bc = bc_from(vec![push(0), InstrWord::no_operand(Opcode::Pop), InstrWord::no_operand(Opcode::Done)], vec![b"x".to_vec()]);
        run_to_fixed_point(&mut bc);
        assert_eq!(bc.code[0].opcode, Opcode::Noop);
        assert_eq!(bc.code[1].opcode, Opcode::Noop);
    }

    #[test]
    fn jump_threading_skips_intermediate_unconditional_jump() {
        let mut bc = bc_from(vec![jump(1), jump(1), InstrWord::no_operand(Opcode::Done)], vec![]);
        run_to_fixed_point(&mut bc);
        assert_eq!(bc.code[0].jump_offset(), Some(2));
    }
}
