//! Compiler errors.
//!
//! Mirrors `monty`'s `CompileError`: a plain struct carrying a message and an
//! optional source position, not `thiserror`/`anyhow`. §7 groups failures
//! into six kinds; [`ErrorKind`] names them so callers can match on category
//! without parsing the message.

use std::fmt;

/// Byte offset into the original source text, when one is known.
pub type SrcPos = Option<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Arity,
    Scope,
    Range,
    Shape,
    Resource,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Arity => "arity",
            ErrorKind::Scope => "scope",
            ErrorKind::Range => "range",
            ErrorKind::Shape => "shape",
            ErrorKind::Resource => "resource",
        };
        f.write_str(s)
    }
}

/// A hard compile failure (§7). `DeferToRuntime` is a distinct,
/// non-error outcome (see [`crate::commands::Outcome`]) and is never
/// represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: SrcPos,
}

impl CompileError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), pos: None }
    }

    #[must_use]
    pub fn at(kind: ErrorKind, message: impl Into<String>, pos: usize) -> Self {
        Self { kind, message: message.into(), pos: Some(pos) }
    }

    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    #[must_use]
    pub fn arity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arity, message)
    }

    #[must_use]
    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scope, message)
    }

    #[must_use]
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    #[must_use]
    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Shape, message)
    }

    #[must_use]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(p) => write!(f, "{} error at byte {}: {}", self.kind, p, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
