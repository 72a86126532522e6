//! Front-end transform states (fetrans, fetrans1, 1.5, 2, 3, betrans).
//!
//! The transforms themselves are per-node compops registered by the
//! front-end; these are the small state structures each walk threads, plus
//! the splice step that lands generated definitions in the module list.

use crate::{compiler::Compiler, tree::NodeId};

/// State for the `fetrans` walk: PAR splitting and proc abstraction.
#[derive(Debug, Default)]
pub struct FetransState {
    pub lexlevel: u32,
    /// Process definitions generated from PAR arms, to be spliced into the
    /// module's definition list after the walk.
    pub new_defs: Vec<NodeId>,
}

/// State for the `fetrans1` walk: temporaries and return lowering.
#[derive(Debug, Default)]
pub struct Fetrans1State {
    /// Declaration list of the nearest enclosing declaration block; fresh
    /// temporaries are appended here.
    pub decl_list: Option<NodeId>,
    /// Result parameters of the function being transformed, for rewriting
    /// `return` into assignments.
    pub result_params: Vec<NodeId>,
}

/// State for the `fetrans1.5` walk: orphan-result pruning.
#[derive(Debug)]
pub struct Fetrans15State {
    /// Whether a process (rather than a value) is expected here.
    pub expt_proc: bool,
}

impl Default for Fetrans15State {
    fn default() -> Self {
        Self { expt_proc: true }
    }
}

/// State for the `fetrans2` walk: call-result lifting.
#[derive(Debug, Default)]
pub struct Fetrans2State;

/// State for the `fetrans3` walk: late ALT lowering.
#[derive(Debug, Default)]
pub struct Fetrans3State {
    /// Declaration list for ALT selection variables.
    pub decl_list: Option<NodeId>,
}

/// State for the `betrans` walk.
#[derive(Debug, Default)]
pub struct BetransState;

/// Splices definitions generated during fetrans into the module list,
/// ahead of the definitions that reference them.
pub fn splice_new_definitions(comp: &mut Compiler, root: &mut NodeId, new_defs: Vec<NodeId>) {
    if new_defs.is_empty() {
        return;
    }
    if !comp.is_list(*root) {
        // wrap a single-definition module into a list to hold the extras
        let org = comp.tree.origin(*root);
        let list = comp.new_list(org);
        comp.list_add(list, *root);
        *root = list;
    }
    for (i, def) in new_defs.into_iter().enumerate() {
        comp.list_insert_at(*root, i, def);
    }
}
