use std::env;
use std::fs;
use std::process::ExitCode;

use cmdbc::bytecode::ByteCode;
use cmdbc::instr::{Opcode, OperandKind};
use cmdbc::{assembler, optimizer};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut raw = false;
    let mut file_path = None;
    for arg in args.iter().skip(1) {
        if arg == "--raw" {
            raw = true;
        } else {
            file_path = Some(arg.as_str());
        }
    }
    let Some(file_path) = file_path else {
        eprintln!("usage: cmdbc [--raw] <file.asm>");
        return ExitCode::FAILURE;
    };

    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let bc = match assembler::assemble(&source) {
        Ok(bc) => bc,
        Err(err) => {
            eprintln!("assemble error:\n{err}");
            return ExitCode::FAILURE;
        }
    };

    let bc = if raw {
        bc
    } else {
        match optimizer::optimize(bc) {
            Ok(bc) => bc,
            Err(err) => {
                eprintln!("optimize error:\n{err}");
                return ExitCode::FAILURE;
            }
        }
    };

    print!("{}", disassemble(&bc));
    ExitCode::SUCCESS
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) if !metadata.is_file() => return Err(format!("{file_path} is not a file")),
        Ok(_) => {}
        Err(err) => return Err(format!("reading {file_path}: {err}")),
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))
}

/// A flat, one-line-per-word disassembly: word index, opcode name, operand
/// values, and (for a `push` of a literal) the literal bytes themselves.
fn disassemble(bc: &ByteCode) -> String {
    let mut out = String::new();
    for (pc, word) in bc.code.iter().enumerate() {
        let opcode_name: &'static str = word.opcode.into();
        out.push_str(&format!("{pc:>5}  {opcode_name}"));
        for operand in word.operands.iter().take(word.operand_count()) {
            match operand.kind {
                OperandKind::None => {}
                OperandKind::Offset if word.opcode.is_jump() => {
                    out.push_str(&format!(" {} (-> {})", operand.value, pc as i64 + operand.value));
                }
                OperandKind::Uint if matches!(word.opcode, Opcode::Push1 | Opcode::Push4) => {
                    let text = bc
                        .literals
                        .get(operand.value as usize)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                        .unwrap_or_else(|| "?".to_string());
                    out.push_str(&format!(" {} \"{text}\"", operand.value));
                }
                _ => out.push_str(&format!(" {}", operand.value)),
            }
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "; {} word(s), {} literal(s), max stack depth {}\n",
        bc.code.len(),
        bc.literals.len(),
        bc.max_stack_depth
    ));
    out
}
