//! Type checking support shared across front-ends.
//!
//! The pass itself is an ordinary compop walk (`typecheck`, then
//! `typeresolve`, then `constprop`); this module carries the walk state and
//! the formal/actual check used by calls and actions.

use crate::{
    compiler::Compiler,
    ops::CompOp,
    passes::PassState,
    tree::NodeId,
};

/// State carried by the typecheck walk.
#[derive(Debug, Default)]
pub struct TypecheckState {
    /// Typecheck-local error tally (the reporter holds the real counters;
    /// this lets an operation see whether its subtree already failed).
    pub errors: u32,
}

/// Typechecks one subtree explicitly (operations use this to check children
/// before computing their own type).
pub fn typecheck_subtree(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) {
    crate::passes::compop_walk(comp, state, slot, CompOp::Typecheck);
}

/// Checks an actual type against a formal, reporting on mismatch.
///
/// Returns the resolved type when compatible.
pub fn check_type_actual(comp: &mut Compiler, formal: NodeId, actual: NodeId, site: NodeId) -> Option<NodeId> {
    let resolved = comp.type_actual(formal, actual);
    if resolved.is_none() {
        let formal_name = comp.tag_name_of(formal).to_owned();
        let actual_name = comp.tag_name_of(actual).to_owned();
        comp.error_at(site, format!("type mismatch: expected {formal_name}, found {actual_name}"));
    }
    resolved
}
