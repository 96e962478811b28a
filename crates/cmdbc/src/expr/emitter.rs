//! Tree-walking emission of a parsed [`Expr`] (§4.5 "Emit" phase).
//!
//! `&&`, `||`, and `?:` get explicit short-circuit fixup sequences rather
//! than being folded into the binary-operator table, since their right
//! operand must not always execute.

use super::parser::{BinOp, Expr, UnOp};
use crate::ctx::CompileCtx;
use crate::env::{CompileEnv, JumpKind};
use crate::error::{CompileError, CompileResult};
use crate::instr::Opcode;
use crate::locals::LocalKind;

/// Emits `expr`, leaving exactly one value on the stack.
pub fn emit_expr(expr: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    match expr {
        Expr::Literal(text) => {
            env.push_literal(text.as_bytes());
            Ok(())
        }
        Expr::QuotedString(text) => {
            // Simplification: treated as a plain literal, without re-scanning
            // for nested $/[ substitutions the way a word token would.
            env.push_literal(text.as_bytes());
            Ok(())
        }
        Expr::CommandSubst(src) => {
            let parsed = ctx.parser.parse_script(src)?;
            crate::script::compile_nested_script(&parsed, env, ctx)
        }
        Expr::Variable { name, subscript } => emit_variable(name, subscript.as_deref(), env, ctx),
        Expr::FuncCall { name, args } => emit_func_call(name, args, env, ctx),
        Expr::Unary(op, operand) => emit_unary(*op, operand, env, ctx),
        Expr::Binary(op, lhs, rhs) => emit_binary(*op, lhs, rhs, env, ctx),
        Expr::And(lhs, rhs) => emit_and(lhs, rhs, env, ctx),
        Expr::Or(lhs, rhs) => emit_or(lhs, rhs, env, ctx),
        Expr::Ternary(cond, then_branch, else_branch) => emit_ternary(cond, then_branch, else_branch, env, ctx),
    }
}

fn emit_variable(name: &str, subscript: Option<&Expr>, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    if !name.contains("::") {
        if let Some(slot) = env
            .locals_mut()
            .and_then(|locals| locals.find_or_create_local(name, true, LocalKind::Scalar))
        {
            return match subscript {
                None => {
                    env.emit1or4(Opcode::LoadScalar4, slot as i64);
                    Ok(())
                }
                Some(sub) => {
                    emit_expr(sub, env, ctx)?;
                    env.emit1or4(Opcode::LoadArray4, slot as i64);
                    Ok(())
                }
            };
        }
    }

    // Qualified name, or no local frame in scope: only a literal/quoted
    // subscript can be folded into a single "name(sub)" variable-name
    // literal at compile time (§4.3's same limitation for token words).
    match subscript {
        None => {
            env.push_literal(name.as_bytes());
            env.emit(Opcode::LoadStk);
            Ok(())
        }
        Some(Expr::Literal(sub)) | Some(Expr::QuotedString(sub)) => {
            let full = format!("{name}({sub})");
            env.push_literal(full.as_bytes());
            env.emit(Opcode::LoadStk);
            Ok(())
        }
        Some(_) => Err(CompileError::shape(
            "dynamic array subscript on a namespace-qualified or non-local variable is not supported",
        )),
    }
}

fn emit_func_call(name: &str, args: &[Expr], env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    for arg in args {
        emit_expr(arg, env, ctx)?;
    }
    env.push_literal(name.as_bytes());
    env.emit1or4(Opcode::CallFunc4, args.len() as i64);
    // Variadic: consumes args.len() arg values plus the name literal, leaves 1.
    env.adjust_stack_depth(-(args.len() as i64));
    Ok(())
}

fn emit_unary(op: UnOp, operand: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    emit_expr(operand, env, ctx)?;
    let opcode = match op {
        UnOp::Neg => Opcode::UMinus,
        UnOp::Plus => Opcode::UPlus,
        UnOp::Not => Opcode::Lnot,
        UnOp::BitNot => Opcode::BitNot,
    };
    env.emit(opcode);
    Ok(())
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mult,
        BinOp::Div => Opcode::Div,
        BinOp::Mod => Opcode::Mod,
        BinOp::Pow => Opcode::Expon,
        BinOp::Eq => Opcode::Eq,
        BinOp::Ne => Opcode::Neq,
        BinOp::Lt => Opcode::Lt,
        BinOp::Le => Opcode::Le,
        BinOp::Gt => Opcode::Gt,
        BinOp::Ge => Opcode::Ge,
        BinOp::StrEq => Opcode::StrEq,
        BinOp::StrNe => Opcode::StrNeq,
        BinOp::BitAnd => Opcode::BitAnd,
        BinOp::BitOr => Opcode::BitOr,
        BinOp::BitXor => Opcode::BitXor,
        BinOp::Shl => Opcode::LShift,
        BinOp::Shr => Opcode::RShift,
        BinOp::In => Opcode::ListIn,
        BinOp::NotIn => Opcode::ListNotIn,
    }
}

fn emit_binary(op: BinOp, lhs: &Expr, rhs: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    emit_expr(lhs, env, ctx)?;
    emit_expr(rhs, env, ctx)?;
    env.emit(binop_opcode(op));
    Ok(())
}

/// `lhs && rhs`: if `lhs` is false, short-circuit to a literal `0` without
/// evaluating `rhs`; otherwise the result is `rhs`'s truth value.
fn emit_and(lhs: &Expr, rhs: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    emit_expr(lhs, env, ctx)?;
    let to_false = env.emit_forward_jump(JumpKind::IfFalse);
    emit_expr(rhs, env, ctx)?;
    let to_end = env.emit_forward_jump(JumpKind::Always);
    env.fixup_forward_jump_to_here(to_false);
    env.push_literal(b"0");
    env.fixup_forward_jump_to_here(to_end);
    Ok(())
}

/// `lhs || rhs`: if `lhs` is true, short-circuit to a literal `1`.
fn emit_or(lhs: &Expr, rhs: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    emit_expr(lhs, env, ctx)?;
    let to_true = env.emit_forward_jump(JumpKind::IfTrue);
    emit_expr(rhs, env, ctx)?;
    let to_end = env.emit_forward_jump(JumpKind::Always);
    env.fixup_forward_jump_to_here(to_true);
    env.push_literal(b"1");
    env.fixup_forward_jump_to_here(to_end);
    Ok(())
}

fn emit_ternary(cond: &Expr, then_branch: &Expr, else_branch: &Expr, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    emit_expr(cond, env, ctx)?;
    let to_else = env.emit_forward_jump(JumpKind::IfFalse);
    emit_expr(then_branch, env, ctx)?;
    let to_end = env.emit_forward_jump(JumpKind::Always);
    env.fixup_forward_jump_to_here(to_else);
    emit_expr(else_branch, env, ctx)?;
    env.fixup_forward_jump_to_here(to_end);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parser::Parser;
    use super::*;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;

    fn new_ctx() -> (SimpleParser, Ensemble) {
        (SimpleParser::new(), Ensemble::new())
    }

    #[test]
    fn and_short_circuit_balances_stack_on_both_paths() {
        let (parser, registry) = new_ctx();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let tree = Parser::new("1 && 2").unwrap().parse().unwrap();
        emit_expr(&tree, &mut env, &ctx).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn ternary_balances_stack() {
        let (parser, registry) = new_ctx();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let tree = Parser::new("1 ? 2 : 3").unwrap().parse().unwrap();
        emit_expr(&tree, &mut env, &ctx).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }

    #[test]
    fn function_call_consumes_args_and_name() {
        let (parser, registry) = new_ctx();
        let ctx = CompileCtx::new(&parser, &registry);
        let mut env = CompileEnv::new();
        let tree = Parser::new("max(1, 2)").unwrap().parse().unwrap();
        emit_expr(&tree, &mut env, &ctx).unwrap();
        assert_eq!(env.curr_stack_depth(), 1);
    }
}
