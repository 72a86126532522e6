//! The scope pass: binds raw names, tracks lexical levels, and records
//! free variables captured across PAR boundaries.
//!
//! Scoping is driven by the `scopein`/`scopeout` compop pair: scope-in may
//! take over recursion for its construct (declaration blocks scope their
//! declarations before their body and descope afterwards); scope-out runs
//! after the subtree either way.

use crate::{
    compiler::Compiler,
    names::NamespaceId,
    ops::CompOp,
    passes::PassState,
    tree::NodeId,
};

/// One enclosing PAR scope collecting captured free variables.
#[derive(Debug, Clone, Copy)]
pub struct CrossScope {
    /// Lexical level of the PAR arm.
    pub par_lexlevel: u32,
    /// List node accumulating the captured name references.
    pub fvlist: NodeId,
}

/// State carried by the scope walk.
#[derive(Debug, Default)]
pub struct ScopeState {
    /// Current lexical level.
    pub lexlevel: u32,
    /// Stack of cross lists, one per enclosing PAR scope.
    pub crosses: Vec<CrossScope>,
    /// Currently visible namespaces.
    pub visible_ns: Vec<NamespaceId>,
}

impl ScopeState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Scopes one subtree: scope-in, children (unless the op claimed them),
/// scope-out.
pub fn scope_subtree(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) {
    let descend = comp.call_compop(state, slot, CompOp::ScopeIn).unwrap_or(true);
    if descend {
        comp.for_each_child_slot(*slot, &mut |c, child| scope_subtree(c, state, child));
    }
    let _ = comp.call_compop(state, slot, CompOp::ScopeOut);
}

/// Records a capture: a resolved binding at a lower lexical level is added
/// to every cross list whose PAR level sits above the binding's level.
///
/// The reference recorded in each list is a fresh copy of `namenode`, so
/// each PAR arm owns its own capture list entries.
pub fn record_capture(comp: &mut Compiler, state: &mut ScopeState, namenode: NodeId, name_lexlevel: u32) {
    let name_id = comp.name_expect(namenode, 0);
    let crosses: Vec<CrossScope> = state
        .crosses
        .iter()
        .copied()
        .filter(|cross| cross.par_lexlevel > name_lexlevel)
        .collect();
    for cross in crosses {
        let already = comp
            .list_items(cross.fvlist)
            .iter()
            .any(|&item| comp.name_slot(item, 0) == Some(name_id));
        if !already {
            let copy = comp.copy_tree(namenode);
            comp.list_add(cross.fvlist, copy);
        }
    }
}
