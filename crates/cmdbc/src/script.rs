//! Top-level script compilation: turns a parsed script into a finished
//! [`ByteCode`], dispatching each command to its compiler (§4.4) or falling
//! back to a generic `invoke` (§6 ensemble resolution, §4.4.7).

use crate::bytecode::ByteCode;
use crate::commands::{self, Outcome};
use crate::ctx::CompileCtx;
use crate::env::CompileEnv;
use crate::error::CompileResult;
use crate::instr::Opcode;
use crate::locals::LocalFrame;
use crate::registry::CommandRegistry;
use crate::token::{ParsedCommand, ParsedScript, ScriptParser};
use crate::token_compiler;

/// Compiles `source` from scratch into a finished [`ByteCode`] (§2 "Control
/// flow at compile time"). `locals`, if given, makes this a procedure-body
/// compilation (§3.3).
pub fn compile_script(
    source: &str,
    parser: &dyn ScriptParser,
    registry: &dyn CommandRegistry,
    locals: Option<Box<dyn LocalFrame>>,
) -> CompileResult<ByteCode> {
    let mut env = CompileEnv::new();
    if let Some(l) = locals {
        env.set_locals(l);
    }
    let ctx = CompileCtx::new(parser, registry);
    let parsed = parser.parse_script(source)?;
    compile_script_body(&parsed, &mut env, &ctx)?;
    env.emit(Opcode::Done);
    env.finalize()
}

/// Compiles an already-parsed script into `env`, leaving exactly one value
/// on the stack — the result of its last command, or an empty literal for
/// an empty script (§8 boundary behavior).
pub fn compile_script_body(parsed: &ParsedScript, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    if parsed.commands.is_empty() {
        env.push_literal(b"");
        return Ok(());
    }
    let last = parsed.commands.len() - 1;
    for (i, cmd) in parsed.commands.iter().enumerate() {
        env.enter_cmd_location(cmd.src_start);
        compile_command(cmd, env, ctx)?;
        env.set_cmd_extent(cmd.src_len)?;
        if i != last {
            env.emit(Opcode::Pop);
        }
    }
    Ok(())
}

/// Used for recursive script compilation (command substitution, `catch`
/// bodies, `if`/loop bodies): identical to [`compile_script_body`] but
/// named for the call sites that are conceptually "nested" rather than
/// top-level.
pub fn compile_nested_script(parsed: &ParsedScript, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    compile_script_body(parsed, env, ctx)
}

fn compile_command(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    let Some(name) = cmd.words.first().and_then(commands::simple_text) else {
        return generic_invoke(cmd, env, ctx);
    };

    let outcome = match name {
        "if" => commands::if_cmd::compile(cmd, env, ctx)?,
        "while" => commands::loop_cmd::compile_while(cmd, env, ctx)?,
        "for" => commands::loop_cmd::compile_for(cmd, env, ctx)?,
        "foreach" => commands::foreach_cmd::compile(cmd, env, ctx)?,
        "switch" => commands::switch_cmd::compile(cmd, env, ctx)?,
        "catch" => commands::catch_cmd::compile(cmd, env, ctx)?,
        "return" => commands::misc_cmd::compile_return(cmd, env, ctx)?,
        "incr" => commands::misc_cmd::compile_incr(cmd, env, ctx)?,
        "set" => commands::misc_cmd::compile_set(cmd, env, ctx)?,
        "lassign" => commands::misc_cmd::compile_lassign(cmd, env, ctx)?,
        "break" => commands::misc_cmd::compile_break(cmd, env, ctx)?,
        "continue" => commands::misc_cmd::compile_continue(cmd, env, ctx)?,
        _ => {
            if let Some(resolved) = ctx.registry.resolve(name, "::") {
                match resolved.compiler {
                    Some(compiler) => compiler.compile(cmd, env, ctx)?,
                    None => Outcome::DeferToRuntime,
                }
            } else {
                Outcome::DeferToRuntime
            }
        }
    };

    match outcome {
        Outcome::Ok => Ok(()),
        Outcome::DeferToRuntime => generic_invoke(cmd, env, ctx),
    }
}

/// Emits a generic `invoke` over a command's tokens (§4.4 "caller emits a
/// generic `INVOKE_STK` over the tokens instead").
fn generic_invoke(cmd: &ParsedCommand, env: &mut CompileEnv, ctx: &CompileCtx) -> CompileResult<()> {
    for word in &cmd.words {
        token_compiler::compile_word(word, env, ctx)?;
    }
    let argc = cmd.words.len();
    env.emit1or4(Opcode::Invoke4, argc as i64);
    env.adjust_stack_depth(-(argc as i64 - 1));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Ensemble;
    use crate::token::simple::SimpleParser;

    #[test]
    fn empty_script_pushes_empty_and_is_done() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let bc = compile_script("", &parser, &registry, None).unwrap();
        assert_eq!(bc.max_stack_depth, 1);
        assert_eq!(bc.code.last().unwrap().opcode, Opcode::Done);
    }

    #[test]
    fn unknown_command_falls_back_to_invoke() {
        let parser = SimpleParser::new();
        let registry = Ensemble::new();
        let bc = compile_script("puts hello", &parser, &registry, None).unwrap();
        assert!(bc.code.iter().any(|w| w.opcode == Opcode::Invoke1 || w.opcode == Opcode::Invoke4));
    }
}
