//! Compiler hooks: side-channel attributes keyed by a global chook id.
//!
//! A chook attaches pass-private data to a node without the node type
//! knowing about it. Each registered chook declares whether copies travel
//! with `copy_tree` and whether tree rewrites should promote it from the
//! source node to the replacement (`AUTOPROMOTE`).

use ahash::AHashMap;

use crate::{backend::cccsp::ParInfo, tree::NodeId};

/// Index into the chook registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChookId(u32);

impl ChookId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("chook id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registration record for one chook.
#[derive(Debug)]
pub struct ChookDef {
    pub name: String,
    pub id: ChookId,
    /// Tree rewrites move this chook from the replaced node to its
    /// replacement.
    pub autopromote: bool,
    /// `copy_tree` clones this chook onto the copy; otherwise the copy
    /// starts without it.
    pub copied: bool,
}

/// The append-only chook registry.
#[derive(Debug, Default)]
pub struct Chooks {
    defs: Vec<ChookDef>,
    names: AHashMap<String, ChookId>,
}

impl Chooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chook, or returns the existing id for this name.
    pub fn lookup_or_new(&mut self, name: &str, autopromote: bool, copied: bool) -> ChookId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = ChookId::new(self.defs.len());
        self.defs.push(ChookDef {
            name: name.to_owned(),
            id,
            autopromote,
            copied,
        });
        self.names.insert(name.to_owned(), id);
        id
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ChookId> {
        self.names.get(name).copied()
    }

    /// # Panics
    /// Panics on an out-of-range id.
    #[must_use]
    pub fn def(&self, id: ChookId) -> &ChookDef {
        &self.defs[id.index()]
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.defs.len()
    }
}

/// Payload of one attached chook.
///
/// One variant per side-attribute in use across the pipeline; the enum
/// replaces the original's untyped hook pointers with typed data that the
/// copy and dump machinery can handle generically.
#[derive(Debug, Clone, PartialEq)]
pub enum Chook {
    /// Back-end name carrier for a front-end name node (the "mapchook").
    BackendName(NodeId),
    /// Queued precode emission: nodes emitted at file scope before the
    /// program body.
    Precode(Vec<NodeId>),
    /// Key of this function's entry in the static-function-index table.
    SfiEntry(String),
    /// Per-arm workspace info attached to a mapped PAR node.
    ParInfo(ParInfo),
    /// External descriptor string for separately-compiled use.
    Descriptor(String),
    /// Initialiser call attached to a back-end name by betrans.
    InitHook(NodeId),
    /// Finaliser call attached to a back-end name by betrans.
    FreeHook(NodeId),
    /// Action LHS type recorded by typecheck for later passes.
    ActionType(NodeId),
}

impl Chook {
    /// Short label for tree dumps.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::BackendName(_) => "backend-name",
            Self::Precode(_) => "precode",
            Self::SfiEntry(_) => "sfi-entry",
            Self::ParInfo(_) => "parinfo",
            Self::Descriptor(_) => "descriptor",
            Self::InitHook(_) => "init-hook",
            Self::FreeHook(_) => "free-hook",
            Self::ActionType(_) => "action-type",
        }
    }
}

/// Ids of the chooks the core pipeline registers at startup.
#[derive(Debug, Clone, Copy)]
pub struct CoreChooks {
    /// `map:chook` — front-end name to back-end name.
    pub mapchook: ChookId,
    /// `precode:list` — queued file-scope emission.
    pub precode: ChookId,
    /// `cccsp:sfi_entry` — static-call-graph entry key.
    pub sfi_entry: ChookId,
    /// `cccsp:parinfo` — PAR-block per-process workspace info.
    pub parinfo: ChookId,
    /// `fetrans:descriptor` — external descriptor string.
    pub descriptor: ChookId,
    /// `betrans:init` — initialiser call.
    pub init_hook: ChookId,
    /// `betrans:free` — finaliser call.
    pub free_hook: ChookId,
    /// `typecheck:actiontype` — resolved action type.
    pub action_type: ChookId,
}

impl CoreChooks {
    pub fn register(chooks: &mut Chooks) -> Self {
        Self {
            mapchook: chooks.lookup_or_new("map:chook", false, false),
            precode: chooks.lookup_or_new("precode:list", false, false),
            sfi_entry: chooks.lookup_or_new("cccsp:sfi_entry", true, false),
            parinfo: chooks.lookup_or_new("cccsp:parinfo", false, false),
            descriptor: chooks.lookup_or_new("fetrans:descriptor", true, true),
            init_hook: chooks.lookup_or_new("betrans:init", false, false),
            free_hook: chooks.lookup_or_new("betrans:free", false, false),
            action_type: chooks.lookup_or_new("typecheck:actiontype", true, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_or_new_returns_stable_ids() {
        let mut chooks = Chooks::new();
        let a = chooks.lookup_or_new("x", false, false);
        let b = chooks.lookup_or_new("y", true, false);
        let a2 = chooks.lookup_or_new("x", true, true);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        // first registration wins
        assert!(!chooks.def(a).autopromote);
        assert!(chooks.def(b).autopromote);
    }
}
