//! The parser's token output schema (§6 "Token input schema") and the
//! `ScriptParser` seam.
//!
//! Tokenization is explicitly out of scope (§1): this module only fixes the
//! shape a parser hands the compiler. [`token::simple`] ships a compact
//! reference tokenizer so the rest of the crate has something real to
//! compile in tests and in the CLI; production embedders implement
//! [`ScriptParser`] against their own parser.

pub mod simple;

use crate::error::CompileResult;

/// Token kinds recognized from the parser (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    SimpleWord,
    Text,
    Backslash,
    CommandSubst,
    VariableSubst,
    ExpandWord,
    SubExpr,
    Operator,
}

/// One parse token: a byte span into the original source plus a component
/// count so consumers can skip to the next sibling without re-parsing
/// (§6: `numComponents`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub size: usize,
    pub num_components: usize,
    /// Nested component tokens (e.g. a `Word`'s constituent `Text`/
    /// `VariableSubst`/`CommandSubst` pieces, or a `VariableSubst`'s array
    /// subscript tokens). Flat in the wire schema (`numComponents` lets a
    /// consumer skip a subtree in a linear array); nested here because Rust
    /// callers read more naturally over a tree than a flat cursor.
    pub children: Vec<Token>,
    /// The token's literal text, when it has been decoded/extracted by the
    /// parser (e.g. a `Text` token's backslash-decoded bytes, or a bareword
    /// used as a command/variable name).
    pub text: String,
}

impl Token {
    #[must_use]
    pub fn leaf(kind: TokenKind, start: usize, size: usize, text: impl Into<String>) -> Self {
        Self { kind, start, size, num_components: 0, children: Vec::new(), text: text.into() }
    }
}

/// One parsed command: its word tokens plus the command's own source span
/// (used to build `cmdMap` entries, §3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub src_start: usize,
    pub src_len: usize,
    pub words: Vec<Token>,
}

/// A parsed script: a sequence of commands in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScript {
    pub commands: Vec<ParsedCommand>,
}

/// The external tokenizer/parser collaborator (§1, §6). Out of scope for
/// this crate's own implementation; a production embedder supplies a real
/// one. `cmdbc::token::simple::SimpleParser` is a reference/test-only
/// implementation, not a substitute for it.
pub trait ScriptParser {
    fn parse_script(&self, source: &str) -> CompileResult<ParsedScript>;
    fn parse_expr(&self, source: &str) -> CompileResult<Token>;
}
