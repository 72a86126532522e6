//! Tree node storage: the arena behind every parse/intermediate tree.
//!
//! Nodes are referenced by [`NodeId`] into a central arena with a free list,
//! so cyclic name/declaration links reduce to index bookkeeping and freeing
//! is exactly-once by construction (a vacant slot panics on reuse). A node
//! is three typed slot arrays — subnodes, names, hooks — whose lengths are
//! fixed by the node's type, plus a side list of compiler hooks.
//!
//! Structure-only operations live here; anything that needs the node-type
//! registry (creation, bounds-checked slot access, walks, copying) is on
//! [`Compiler`](crate::compiler::Compiler).

use smallvec::SmallVec;

use crate::{
    chook::{Chook, ChookId},
    constants::ConstData,
    names::NameId,
    nodetype::TagId,
    origin::Origin,
};

/// Index into the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("node id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Metadata attached to function definitions during prescope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FcnDefInfo {
    /// Lexical level of the definition.
    pub lexlevel: u32,
    /// Publicly exported (gets a proc-abstraction wrapper).
    pub is_public: bool,
    /// Top-level process of the program.
    pub is_toplevel: bool,
    /// Generated from a PAR arm (process-abstracted).
    pub is_par: bool,
}

/// An opaque hook slot payload.
///
/// Hooks whose payload contains subtrees (lists) participate in the generic
/// walks; the walker matches on the variant rather than asking the node type
/// for a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Hook {
    /// Ordered, owning sequence of child nodes.
    List(Vec<NodeId>),
    /// Raw constant payload.
    Const(ConstData),
    /// Identifier or descriptor text (raw names, entry names).
    Text(String),
    /// Owned byte payload (string literals).
    Bytes(Vec<u8>),
    /// Function-definition metadata.
    FcnInfo(FcnDefInfo),
    /// Back-end sizing data (bytes, indirection level).
    BackendName { bytes: i64, indir: i32 },
    /// Back-end block sizing (filled during reallocate).
    Block {
        lexlevel: u32,
        my_size: i64,
        nest_size: i64,
    },
    /// Workspace node data (filled during namemap/reallocate).
    Workspace { nparams: i32, nwords: i64 },
}

/// One tree node: tag, origin, typed slot arrays, compiler hooks.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub tag: TagId,
    pub origin: Origin,
    pub subs: SmallVec<[Option<NodeId>; 4]>,
    pub names: SmallVec<[Option<NameId>; 1]>,
    pub hooks: SmallVec<[Option<Hook>; 1]>,
    /// Compiler hooks, keyed by chook id (few per node, linear scan).
    pub chooks: Vec<(ChookId, Chook)>,
}

impl TreeNode {
    /// An all-null node of the given shape.
    #[must_use]
    pub fn empty(tag: TagId, origin: Origin, nsub: usize, nname: usize, nhooks: usize) -> Self {
        Self {
            tag,
            origin,
            subs: std::iter::repeat_with(|| None).take(nsub).collect(),
            names: std::iter::repeat_with(|| None).take(nname).collect(),
            hooks: std::iter::repeat_with(|| None).take(nhooks).collect(),
            chooks: Vec::new(),
        }
    }
}

/// The node arena.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Option<TreeNode>>,
    free: Vec<NodeId>,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node, reusing a freed slot when available.
    pub fn alloc(&mut self, node: TreeNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            let id = NodeId::new(self.nodes.len());
            self.nodes.push(Some(node));
            id
        }
    }

    /// Removes a node from the arena, returning its contents.
    ///
    /// # Panics
    /// Panics when the slot is vacant: the node was freed twice.
    pub fn dealloc(&mut self, id: NodeId) -> TreeNode {
        let node = self.nodes[id.index()].take().expect("tree node freed twice");
        self.free.push(id);
        node
    }

    /// # Panics
    /// Panics on a vacant (freed) slot.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        self.nodes[id.index()].as_ref().expect("reference to a freed tree node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        self.nodes[id.index()].as_mut().expect("reference to a freed tree node")
    }

    /// Whether the id refers to a live node.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(Option::is_some)
    }

    /// Tag of a node.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> TagId {
        self.node(id).tag
    }

    /// Origin of a node.
    #[must_use]
    pub fn origin(&self, id: NodeId) -> Origin {
        self.node(id).origin
    }

    /// Rewrites a node's tag in place, keeping its slots.
    pub fn change_tag(&mut self, id: NodeId, tag: TagId) {
        self.node_mut(id).tag = tag;
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Direct subnode ids of a node (slot order, skipping null slots).
    #[must_use]
    pub fn sub_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).subs.iter().flatten().copied().collect()
    }

    /// Ids owned by a node's list hooks, in hook then element order.
    #[must_use]
    pub fn hook_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for hook in self.node(id).hooks.iter().flatten() {
            if let Hook::List(items) = hook {
                out.extend_from_slice(items);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u32) -> TreeNode {
        TreeNode::empty(TagId::new(tag as usize), Origin::BUILTIN, 0, 0, 0)
    }

    #[test]
    fn test_alloc_dealloc_reuses_slots() {
        let mut tree = Tree::new();
        let a = tree.alloc(leaf(0));
        let b = tree.alloc(leaf(1));
        assert_eq!(tree.live_count(), 2);

        tree.dealloc(a);
        assert_eq!(tree.live_count(), 1);
        let c = tree.alloc(leaf(2));
        assert_eq!(c, a, "freed slot is reused");
        assert!(tree.is_live(b));
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn test_double_free_panics() {
        let mut tree = Tree::new();
        let a = tree.alloc(leaf(0));
        tree.dealloc(a);
        tree.dealloc(a);
    }
}
