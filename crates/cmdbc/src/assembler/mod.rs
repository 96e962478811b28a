//! Textual assembler (§4.6): turns a flat instruction list — one
//! `opcodeName [operand]` or `label name` entry per line — into a
//! [`ByteCode`], resolving label references through [`label::LabelTable`]
//! and verifying the result with [`analysis::check_stack_balance`].
//!
//! This is a second, independent way to produce a [`ByteCode`] alongside
//! [`crate::script::compile_script`] — useful for the CLI and for tests that
//! want to hand-write a specific instruction sequence rather than go
//! through command compilation. Opcode names are the `Opcode` enum's own
//! variant spelling (`Push4`, `JumpFalse1`, ...); a lowercase first letter
//! is also accepted (`push4`) so hand-written listings can use either.

pub mod analysis;
pub mod block;
pub mod label;

use crate::auxdata::AuxData;
use crate::bytecode::{ByteCode, ExceptionRange};
use crate::cmdmap::CmdMapEntry;
use crate::error::{CompileError, CompileResult};
use crate::instr::{InstrWord, Operand, OperandKind, OperandWidth, Opcode};
use label::LabelTable;
use std::str::FromStr;

/// One parsed line of assembly input.
enum Entry {
    Label(String),
    Instr { opcode: Opcode, operand_text: Option<String> },
}

fn parse_line(line: &str, line_no: usize) -> CompileResult<Option<Entry>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("");
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    if head.eq_ignore_ascii_case("label") {
        let Some(name) = rest else {
            return Err(CompileError::syntax(format!("line {line_no}: `label` directive missing a name")));
        };
        return Ok(Some(Entry::Label(name.to_string())));
    }

    let opcode = Opcode::from_str(head)
        .or_else(|_| Opcode::from_str(&capitalize(head)))
        .map_err(|_| CompileError::syntax(format!("line {line_no}: unknown opcode `{head}`")))?;
    Ok(Some(Entry::Instr { opcode, operand_text: rest.map(str::to_string) }))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Assembles `source` into a finished [`ByteCode`]. Quoted operands
/// (`"..."`) are registered as string literals and their operand becomes
/// the resulting literal-pool index; bare numeric operands are taken
/// literally (label names for jump opcodes, immediates otherwise).
pub fn assemble(source: &str) -> CompileResult<ByteCode> {
    let mut code: Vec<InstrWord> = Vec::new();
    let mut literals: Vec<Vec<u8>> = Vec::new();
    let mut labels = LabelTable::new();
    let mut label_offsets = Vec::new();

    for (i, raw_line) in source.lines().enumerate() {
        let line_no = i + 1;
        let Some(entry) = parse_line(raw_line, line_no)? else { continue };
        match entry {
            Entry::Label(name) => {
                let offset = code.len();
                let chain = labels.define(&name, offset).map_err(CompileError::syntax)?;
                for word_idx in chain {
                    let rel = offset as i64 - word_idx as i64;
                    code[word_idx].set_jump_offset(rel);
                }
                label_offsets.push(offset);
            }
            Entry::Instr { opcode, operand_text } => {
                let word = build_word(opcode, operand_text.as_deref(), code.len(), &mut labels, &mut literals, line_no)?;
                code.push(word);
            }
        }
    }

    let undefined = labels.undefined();
    if !undefined.is_empty() {
        return Err(CompileError::syntax(format!("undefined label(s): {}", undefined.join(", "))));
    }

    let analysis = analysis::check_stack_balance(&code, 0)?;
    let _blocks = block::split_into_blocks(&code, &label_offsets);

    Ok(ByteCode {
        code,
        literals: literals.into_iter().map(Into::into).collect(),
        exception_ranges: Vec::<ExceptionRange>::new(),
        aux_data: Vec::<AuxData>::new(),
        cmd_map: Vec::<CmdMapEntry>::new(),
        max_stack_depth: analysis.max_stack_depth.max(0) as usize,
        max_catch_depth: 0,
        local_count: 0,
        precompiled: false,
        epoch: 0,
    })
}

/// Splits an operand-text region into whitespace-separated tokens, treating
/// a `"..."` run as a single token even if it contains spaces.
fn tokenize_operands(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut tok = String::new();
        if c == '"' {
            tok.push(chars.next().unwrap());
            for c in chars.by_ref() {
                tok.push(c);
                if c == '"' {
                    break;
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                tok.push(c);
                chars.next();
            }
        }
        tokens.push(tok);
    }
    tokens
}

fn build_word(
    opcode: Opcode,
    operand_text: Option<&str>,
    here: usize,
    labels: &mut LabelTable,
    literals: &mut Vec<Vec<u8>>,
    line_no: usize,
) -> CompileResult<InstrWord> {
    let desc = opcode.descriptor();
    if desc.operand_count == 0 {
        if operand_text.is_some() {
            return Err(CompileError::arity(format!("line {line_no}: `{opcode}` takes no operand")));
        }
        return Ok(InstrWord::no_operand(opcode));
    }

    let tokens = operand_text.map(tokenize_operands).unwrap_or_default();
    if tokens.len() != desc.operand_count {
        return Err(CompileError::arity(format!(
            "line {line_no}: `{opcode}` takes {} operand(s), got {}",
            desc.operand_count,
            tokens.len()
        )));
    }

    // Jumps always emit wide: a forward reference's final displacement
    // isn't known until its label is defined, so shrinking now could guess
    // wrong. The optimizer's compact pass (§4.7 pass 4) narrows later.
    if opcode.is_jump() {
        let value = match labels.reference(&tokens[0], here) {
            Some(target) => target as i64 - here as i64,
            None => 0,
        };
        let wide = opcode.wide_form().unwrap_or(opcode);
        return Ok(InstrWord::new(wide, [Operand::new(OperandKind::Offset, value, OperandWidth::Wide), Operand::NONE]));
    }

    let mut operands = [Operand::NONE, Operand::NONE];
    let mut any_wide = false;
    for (i, kind) in desc.operand_kinds.iter().take(desc.operand_count).enumerate() {
        let text = &tokens[i];
        let value = if *kind == OperandKind::Uint && text.starts_with('"') && text.ends_with('"') && text.len() >= 2 {
            let bytes = text[1..text.len() - 1].as_bytes().to_vec();
            let idx = literals.len();
            literals.push(bytes);
            idx as i64
        } else {
            text.parse::<i64>().map_err(|_| CompileError::syntax(format!("line {line_no}: bad operand `{text}`")))?
        };
        let fits = Operand::new(*kind, value, OperandWidth::Wide).fits_narrow();
        any_wide |= !fits;
        operands[i] = Operand::new(*kind, value, if fits { OperandWidth::Narrow } else { OperandWidth::Wide });
    }

    let resolved_opcode = if any_wide {
        opcode.wide_form().unwrap_or(opcode)
    } else {
        opcode.narrow_form().unwrap_or(opcode)
    };
    if any_wide {
        for op in operands.iter_mut().take(desc.operand_count) {
            op.width = OperandWidth::Wide;
        }
    }
    Ok(InstrWord::new(resolved_opcode, operands))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_program_assembles() {
        let src = "push4 \"hello\"\ndone\n";
        let bc = assemble(src).unwrap();
        assert_eq!(bc.code.len(), 2);
        assert_eq!(bc.literals.len(), 1);
    }

    #[test]
    fn forward_label_reference_resolves() {
        // push cond; jumpFalse->end; push+pop a then-body; (end:) push a
        // result; done. Both the branch and fall-through paths reach `end`
        // at depth 0, so the stack-balance check also exercises the merge.
        let src = "push4 \"cond\"\njumpFalse4 end\npush4 \"body\"\npop\nlabel end\npush4 \"result\"\ndone\n";
        let bc = assemble(src).unwrap();
        let jf = bc.code[1];
        assert_eq!(jf.opcode, Opcode::JumpFalse4);
        assert_eq!(jf.jump_offset(), Some(3));
    }

    #[test]
    fn undefined_label_is_rejected() {
        let src = "push4 1\njumpFalse4 nowhere\ndone\n";
        assert!(assemble(src).is_err());
    }

    #[test]
    fn unbalanced_stack_is_rejected() {
        let src = "pop\ndone\n";
        assert!(assemble(src).is_err());
    }
}
