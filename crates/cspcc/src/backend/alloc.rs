//! Stack-frame sizing passes: preallocate, the static call graph, and
//! reallocate.
//!
//! Preallocate estimates per-construct local space (`self + max(children)`).
//! The `dcg` pass records every call edge under the enclosing function's
//! SFI entry; `dcgfix` closes the allocsize fixpoint. Reallocate then walks
//! each function once more, summing PAR arms into their workspace slots and
//! sizing the function's back-end block.

use crate::{
    compiler::Compiler,
    ops::CompOp,
    passes::PassState,
    tree::NodeId,
};

/// State for the `lpreallocate` walk.
#[derive(Debug, Default)]
pub struct PreallocState {
    pub lexlevel: u32,
    /// Auxiliary words collected for the enclosing construct.
    pub collect: i64,
}

/// State for the `dcg` (direct-call-graph) walk.
#[derive(Debug, Default)]
pub struct DcgState {
    /// SFI key of the function whose body is being walked.
    pub thisfcn: Option<String>,
}

/// State for the `reallocate` walk.
#[derive(Debug, Default)]
pub struct ReallocState {
    pub lexlevel: u32,
    pub error: u32,
    /// Maximum space used by parallel processes beneath, in words.
    pub maxpar: i64,
}

/// Rounds a byte count up to whole 4-byte workspace words.
#[must_use]
pub fn word_ceil(bytes: i64) -> i64 {
    (bytes + 3) / 4
}

/// Drives the `lpreallocate` compop over a subtree.
pub fn preallocate_subtree(comp: &mut Compiler, state: &mut PassState, node: NodeId) {
    let mut slot = node;
    let descend = comp.call_compop(state, &mut slot, CompOp::Lpreallocate).unwrap_or(true);
    if descend {
        comp.for_each_child_slot(slot, &mut |c, child| preallocate_subtree(c, state, *child));
    }
}

/// Drives the `dcg` compop over a subtree.
pub fn dcg_subtree(comp: &mut Compiler, state: &mut PassState, node: NodeId) {
    let mut slot = node;
    let descend = comp.call_compop(state, &mut slot, CompOp::Dcg).unwrap_or(true);
    if descend {
        comp.for_each_child_slot(slot, &mut |c, child| dcg_subtree(c, state, *child));
    }
}

/// Drives the `reallocate` compop over a subtree.
pub fn reallocate_subtree(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) {
    let descend = comp.call_compop(state, slot, CompOp::Reallocate).unwrap_or(true);
    if descend {
        comp.for_each_child_slot(*slot, &mut |c, child| reallocate_subtree(c, state, child));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_ceil_pads_to_word_boundary() {
        assert_eq!(word_ceil(0), 0);
        assert_eq!(word_ceil(1), 1);
        assert_eq!(word_ceil(4), 1);
        assert_eq!(word_ceil(5), 2);
        assert_eq!(word_ceil(48), 12);
        assert_eq!(word_ceil(81), 21);
    }
}
