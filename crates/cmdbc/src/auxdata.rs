//! Auxiliary data (§3.6) and the process-wide aux-data-type registry (§6).
//!
//! Aux data is opaque per-opcode compile-time side information referenced by
//! operand index: `foreach`'s variable-binding layout and `switch`'s jump
//! table are the two variants this crate needs. Each variant is duplicated
//! and freed through hooks looked up by type name in a mutex-protected
//! global registry — the one place in this crate that needs a lock, so it
//! reaches for `once_cell::sync::Lazy` + `parking_lot::Mutex` rather than
//! threading a registry handle through every `CompileEnv`, matching the
//! global-registry idiom used for comparable tables elsewhere in the
//! retrieval pack.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One value-list's variable bindings within a `foreach` (§3.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarList {
    pub num_vars: usize,
    pub var_indexes: Vec<usize>,
}

/// `foreach` aux data: one entry per value-list argument, plus the two
/// temporaries the compiler reserves (§4.4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeachInfo {
    pub num_lists: usize,
    pub first_value_temp: usize,
    pub loop_ct_temp: usize,
    pub range_index: usize,
    pub var_lists: Vec<VarList>,
}

/// `switch`-with-table aux data: case string to relative code offset (§3.6).
/// An [`IndexMap`] rather than a plain hash map because case order is
/// observable (debugging output, re-serialization) even though lookup
/// itself doesn't depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumptableInfo {
    pub hash: IndexMap<String, i64>,
}

/// The closed set of aux-data payloads this crate's compilers produce.
///
/// §3.6 describes aux data as "opaque typed records" identified by a
/// registered type name; real embedders may register further variants
/// through [`REGISTRY`] even though this enum only carries the two this
/// crate's command compilers emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxData {
    Foreach(ForeachInfo),
    Jumptable(JumptableInfo),
}

impl AuxData {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            AuxData::Foreach(_) => ForeachInfo::TYPE_NAME,
            AuxData::Jumptable(_) => JumptableInfo::TYPE_NAME,
        }
    }

    /// Deep-duplicates this record, the way `ForeachInfo` is specified to be
    /// duplicated (§3.6) rather than shared by reference.
    #[must_use]
    pub fn dup(&self) -> AuxData {
        self.clone()
    }
}

impl ForeachInfo {
    pub const TYPE_NAME: &'static str = "ForeachInfo";
}

impl JumptableInfo {
    pub const TYPE_NAME: &'static str = "JumptableInfo";
}

/// `dup`/`free` hooks an aux-data type registers (§6).
///
/// Rust's `Drop` makes an explicit `free` hook redundant for in-process
/// aux data (dropping the `AuxData` releases everything it owns); the
/// registry still models the contract from §6 so a caller wiring in an
/// embedder-defined aux-data type has the same two-hook shape to fill in.
#[derive(Clone)]
pub struct AuxDataTypeHooks {
    pub dup: fn(&AuxData) -> AuxData,
    pub free: fn(&mut AuxData),
}

fn default_dup(data: &AuxData) -> AuxData {
    data.dup()
}

fn default_free(_data: &mut AuxData) {}

/// Process-wide mapping `name -> hooks` (§6). Registration is idempotent by
/// name (later registration wins); lookups take the lock only for the
/// duration of the hash lookup.
pub static REGISTRY: Lazy<Mutex<HashMap<&'static str, AuxDataTypeHooks>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(ForeachInfo::TYPE_NAME, AuxDataTypeHooks { dup: default_dup, free: default_free });
    m.insert(JumptableInfo::TYPE_NAME, AuxDataTypeHooks { dup: default_dup, free: default_free });
    Mutex::new(m)
});

/// Registers or replaces the hooks for an aux-data type name.
pub fn register_type(name: &'static str, hooks: AuxDataTypeHooks) {
    REGISTRY.lock().insert(name, hooks);
}

/// Looks up the hooks for an aux-data record's type, falling back to the
/// record's own [`AuxData::dup`]/no-op free if the type was never
/// registered (it always is for the two built-in variants).
#[must_use]
pub fn hooks_for(name: &str) -> Option<AuxDataTypeHooks> {
    REGISTRY.lock().get(name).cloned()
}
