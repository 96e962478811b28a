//! The literal-pool interface (§6 "Literal table interface (consumed)").
//!
//! A production embedder owns its own value representation and therefore its
//! own literal table (the command language shimmers literals into typed
//! objects lazily at runtime, something this crate never does). `LiteralTable`
//! is the seam; [`SimpleLiteralTable`] is a reference implementation used by
//! tests, the assembler's standalone entry point, and the CLI, grounded on
//! `monty::intern`'s `InternerBuilder` dedup idiom (hash-keyed, refcounted,
//! `AHashMap`-backed).

use ahash::AHashMap;
use std::sync::Arc;

/// A literal's content. The command language stores literals as byte
/// strings (§6: `register(bytes, flags)`); we keep the same shape rather
/// than assuming UTF-8, since not every script literal need be valid text.
pub type LiteralBytes = Arc<[u8]>;

/// Flags accompanying literal registration (§3.3, §6).
///
/// Hand-rolled rather than pulled from the `bitflags` crate: two bits don't
/// warrant the dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiteralFlags(pub u8);

impl LiteralFlags {
    pub const NONE: LiteralFlags = LiteralFlags(0);
    /// Hints that this literal names a command; resolution caches may
    /// attach an inline cache to it.
    pub const CMD_NAME: LiteralFlags = LiteralFlags(1 << 0);
    /// Forbids deduplication against an existing identical literal, to
    /// avoid "type shimmering" of command-name objects shared across
    /// unrelated call sites.
    pub const UNSHARED: LiteralFlags = LiteralFlags(1 << 1);

    #[must_use]
    pub fn contains(self, other: LiteralFlags) -> bool {
        other.0 == 0 || (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for LiteralFlags {
    type Output = LiteralFlags;
    fn bitor(self, rhs: LiteralFlags) -> LiteralFlags {
        LiteralFlags(self.0 | rhs.0)
    }
}

/// External literal-pool collaborator (§6).
pub trait LiteralTable {
    /// Registers (deduplicating unless `Unshared`) and returns a stable
    /// pool index.
    fn register(&mut self, bytes: &[u8], flags: LiteralFlags) -> usize;

    /// Decrements the literal's refcount, releasing it once it reaches zero.
    fn release(&mut self, index: usize);

    /// Detaches a literal from the dedup table in place, preventing future
    /// registrations from sharing its slot (§6 "hide").
    fn hide(&mut self, index: usize);

    /// Looks up a previously registered literal's bytes.
    fn get(&self, index: usize) -> Option<&LiteralBytes>;

    /// Current pool length (used by invariant checks: `index < len()`).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the table and returns its contents in pool-index order, for
    /// `CompileEnv::finalize` to move into a [`crate::bytecode::ByteCode`].
    fn into_literals(self: Box<Self>) -> Vec<LiteralBytes>;
}

#[derive(Debug, Clone)]
struct Entry {
    bytes: LiteralBytes,
    refcount: u32,
    hidden: bool,
}

/// Hash-deduplicated, refcounted literal pool (§6 default implementation),
/// grounded on `monty::intern::InternerBuilder`'s `entry().or_insert_with()`
/// dedup pattern.
#[derive(Debug, Default)]
pub struct SimpleLiteralTable {
    entries: Vec<Entry>,
    dedup: AHashMap<Box<[u8]>, usize>,
}

impl SimpleLiteralTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LiteralTable for SimpleLiteralTable {
    fn register(&mut self, bytes: &[u8], flags: LiteralFlags) -> usize {
        if !flags.contains(LiteralFlags::UNSHARED) {
            if let Some(&idx) = self.dedup.get(bytes) {
                if !self.entries[idx].hidden {
                    self.entries[idx].refcount += 1;
                    return idx;
                }
            }
        }
        let idx = self.entries.len();
        self.entries.push(Entry { bytes: Arc::from(bytes), refcount: 1, hidden: false });
        if !flags.contains(LiteralFlags::UNSHARED) {
            self.dedup.insert(bytes.into(), idx);
        }
        idx
    }

    fn release(&mut self, index: usize) {
        if let Some(e) = self.entries.get_mut(index) {
            e.refcount = e.refcount.saturating_sub(1);
        }
    }

    fn hide(&mut self, index: usize) {
        if let Some(e) = self.entries.get_mut(index) {
            e.hidden = true;
            self.dedup.retain(|_, &mut v| v != index);
        }
    }

    fn get(&self, index: usize) -> Option<&LiteralBytes> {
        self.entries.get(index).map(|e| &e.bytes)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_literals(self: Box<Self>) -> Vec<LiteralBytes> {
        self.entries.into_iter().map(|e| e.bytes).collect()
    }
}
