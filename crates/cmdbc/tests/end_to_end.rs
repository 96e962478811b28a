//! End-to-end scenarios exercising the invariants in `spec.md` §8 across the
//! full script-to-bytecode-to-optimized pipeline, not just one module.

use cmdbc::instr::Opcode;
use cmdbc::locals::SimpleLocalFrame;
use cmdbc::registry::Ensemble;
use cmdbc::token::simple::SimpleParser;
use cmdbc::{assembler, compile_script, optimizer};

fn compile(src: &str) -> cmdbc::ByteCode {
    let parser = SimpleParser::new();
    let registry = Ensemble::new();
    compile_script(src, &parser, &registry, None).unwrap()
}

/// Like [`compile`], but as a procedure body — needed for command
/// compilers (`foreach`) that only compile inline when a local-variable
/// frame is available to allocate slots from.
fn compile_in_proc(src: &str) -> cmdbc::ByteCode {
    let parser = SimpleParser::new();
    let registry = Ensemble::new();
    compile_script(src, &parser, &registry, Some(Box::new(SimpleLocalFrame::new()))).unwrap()
}

#[test]
fn if_with_a_statically_true_condition_never_emits_a_conditional_jump() {
    let bc = compile("if 1 {set x 2}");
    assert!(!bc.code.iter().any(|w| w.opcode.is_conditional_jump()));
}

#[test]
fn if_with_a_statically_false_condition_skips_the_body_entirely() {
    let bc = compile("if 0 {set x 2}");
    // Nothing in the body should have compiled: no StoreScalar at all.
    assert!(!bc.code.iter().any(|w| matches!(w.opcode, Opcode::StoreScalar1 | Opcode::StoreScalar4)));
}

#[test]
fn while_loop_compiles_with_a_loop_exception_range_and_resolvable_break() {
    let bc = compile("while {$x} {break}");
    assert!(bc.exception_ranges.iter().any(|r| r.kind == cmdbc::bytecode::ExceptionKind::Loop));
    // After optimization every break/continue is gone, replaced by a jump.
    let optimized = optimizer::optimize(bc).unwrap();
    assert!(!optimized.code.iter().any(|w| matches!(w.opcode, Opcode::Break | Opcode::Continue)));
}

#[test]
fn expression_short_circuit_produces_a_conditional_jump_around_the_rhs() {
    // `if`'s test clause is compiled through the bracket-expression
    // pipeline (`expr::compile_expr_source`), so `&&` short-circuiting
    // shows up here even though the standalone `expr` command itself is
    // one of the long-tail commands left to `DeferToRuntime` (§4.4.7).
    let bc = compile("if {$a && $b} {set c 1}");
    assert!(bc.code.iter().any(|w| w.opcode.is_conditional_jump()));
}

#[test]
fn assembler_round_trip_rejects_a_hand_written_stack_underflow() {
    let src = "pop\ndone\n";
    assert!(assembler::assemble(src).is_err());
}

#[test]
fn optimizer_threads_jumps_and_shrinks_to_a_fixed_point() {
    let src = "push4 \"cond\"\njumpFalse4 skip\njump4 over\nlabel skip\npush4 \"a\"\npop\nlabel over\ndone\n";
    let bc = assembler::assemble(src).unwrap();
    let before_len = bc.code.len();
    let optimized = optimizer::optimize(bc).unwrap();
    assert!(optimized.code.len() <= before_len);
    assert!(optimized.code.iter().all(|w| w.opcode != Opcode::Noop));
}

#[test]
fn optimizer_folds_a_pushed_boolean_literal_into_an_unconditional_jump() {
    let src = "push4 \"1\"\njumpTrue4 end\npush4 \"unreached\"\npop\nlabel end\ndone\n";
    let bc = assembler::assemble(src).unwrap();
    let optimized = optimizer::optimize(bc).unwrap();
    assert!(!optimized.code.iter().any(|w| w.opcode.is_conditional_jump()));
}

#[test]
fn foreach_over_two_lists_registers_foreach_aux_data() {
    let bc = compile_in_proc("foreach {a} $xs {b} $ys {set c 1}");
    assert!(bc.aux_data.iter().any(|d| matches!(d, cmdbc::auxdata::AuxData::Foreach(_))));
}

#[test]
fn catch_wraps_its_body_in_a_catch_exception_range() {
    let bc = compile_in_proc("catch {set x 1}");
    assert!(bc.exception_ranges.iter().any(|r| r.kind == cmdbc::bytecode::ExceptionKind::Catch));
}

#[test]
fn empty_script_produces_the_canonical_push_empty_then_done() {
    let bc = compile("");
    assert_eq!(bc.code.len(), 2);
    assert!(matches!(bc.code[0].opcode, Opcode::Push1 | Opcode::Push4));
    assert_eq!(bc.code[1].opcode, Opcode::Done);
}
