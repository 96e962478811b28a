//! The local-variable frame interface (§6 "Local-variable frame interface").
//!
//! Resolving a variable token to a slot index (rather than a name lookup at
//! every access) is what lets the token/command compilers emit
//! `LOAD_SCALAR`/`STORE_SCALAR` instead of falling back to the slower
//! by-name `_STK` forms. [`SimpleLocalFrame`] is the crate's own reference
//! implementation, grounded on the slot-allocation idiom `monty::namespace`
//! uses for its own local scopes.

use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Scalar,
    Array,
    Link,
}

/// External local-variable-frame collaborator (§6).
pub trait LocalFrame {
    /// Resolves `name` to a slot index, creating one if `create` is true and
    /// no slot exists yet. Returns `None` if `create` is false and no slot
    /// exists, or if `name` is namespace-qualified (callers should already
    /// have screened that case — see §4.3's `::`-qualified rule).
    fn find_or_create_local(&mut self, name: &str, create: bool, kind: LocalKind) -> Option<usize>;

    /// Allocates a nameless temporary slot (used by `foreach`'s per-list
    /// counters, §4.4.3).
    fn create_temp(&mut self, kind: LocalKind) -> usize;

    /// Number of slots in the frame (becomes `ByteCode::local_count`).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name_of(&self, index: usize) -> Option<&str>;
}

#[derive(Debug, Clone)]
struct Slot {
    name: Option<String>,
    #[allow(dead_code)]
    kind: LocalKind,
}

/// A growable slot vector plus a name index, the default `LocalFrame`.
#[derive(Debug, Default)]
pub struct SimpleLocalFrame {
    slots: Vec<Slot>,
    by_name: AHashMap<String, usize>,
}

impl SimpleLocalFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalFrame for SimpleLocalFrame {
    fn find_or_create_local(&mut self, name: &str, create: bool, kind: LocalKind) -> Option<usize> {
        if let Some(&idx) = self.by_name.get(name) {
            return Some(idx);
        }
        if !create {
            return None;
        }
        let idx = self.slots.len();
        self.slots.push(Slot { name: Some(name.to_string()), kind });
        self.by_name.insert(name.to_string(), idx);
        Some(idx)
    }

    fn create_temp(&mut self, kind: LocalKind) -> usize {
        let idx = self.slots.len();
        self.slots.push(Slot { name: None, kind });
        idx
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn name_of(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_slot_for_same_name() {
        let mut f = SimpleLocalFrame::new();
        let a = f.find_or_create_local("x", true, LocalKind::Scalar).unwrap();
        let b = f.find_or_create_local("x", true, LocalKind::Scalar).unwrap();
        assert_eq!(a, b);
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn missing_local_without_create_is_none() {
        let mut f = SimpleLocalFrame::new();
        assert_eq!(f.find_or_create_local("y", false, LocalKind::Scalar), None);
    }

    #[test]
    fn temporaries_are_nameless_and_distinct() {
        let mut f = SimpleLocalFrame::new();
        let t0 = f.create_temp(LocalKind::Scalar);
        let t1 = f.create_temp(LocalKind::Scalar);
        assert_ne!(t0, t1);
        assert_eq!(f.name_of(t0), None);
    }
}
