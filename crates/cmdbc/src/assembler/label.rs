//! Label bookkeeping for textual assembly (§4.6).
//!
//! A label starts undefined and accumulates a backpatch chain of word
//! indices that referenced it before its `label` directive was seen; once
//! defined, later references resolve immediately and the chain is drained
//! and patched in one pass. This is the same backpatch-chain idea the spec
//! describes for operand-slot-threaded labels, just modeled as a `Vec`
//! instead of storing the "next pending" link inside the operand itself —
//! Rust's owned vectors make that indirection unnecessary.

use std::collections::HashMap;

#[derive(Debug, Default)]
struct LabelEntry {
    offset: Option<usize>,
    pending: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct LabelTable {
    labels: HashMap<String, LabelEntry>,
}

impl LabelTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `name` at word offset `offset`. Returns the chain of word
    /// indices whose jump operand must now be patched to target `offset`.
    /// Errs if `name` was already defined (duplicate `label` directive).
    pub fn define(&mut self, name: &str, offset: usize) -> Result<Vec<usize>, String> {
        let entry = self.labels.entry(name.to_string()).or_default();
        if entry.offset.is_some() {
            return Err(format!("label '{name}' defined more than once"));
        }
        entry.offset = Some(offset);
        Ok(std::mem::take(&mut entry.pending))
    }

    /// Records a reference to `name` from word `at`. Returns the target
    /// offset immediately if `name` is already defined; otherwise threads
    /// `at` onto the label's pending chain for `define` to drain later.
    pub fn reference(&mut self, name: &str, at: usize) -> Option<usize> {
        let entry = self.labels.entry(name.to_string()).or_default();
        match entry.offset {
            Some(off) => Some(off),
            None => {
                entry.pending.push(at);
                None
            }
        }
    }

    /// Names referenced but never defined by a `label` directive.
    #[must_use]
    pub fn undefined(&self) -> Vec<String> {
        self.labels.iter().filter(|(_, e)| e.offset.is_none()).map(|(n, _)| n.clone()).collect()
    }
}
