//! The compiler context: registries, tree arena, names, diagnostics.
//!
//! All process-wide state of the original design (keyword tables, node-type
//! registry, name hash, chook registry) is encapsulated here and passed to
//! every entry point. Registration happens once at startup — the core
//! registers the built-in `list`/`const` types, then each front-end and the
//! back-end append their node sets — after which the registries are treated
//! as immutable.

use crate::{
    backend::{cccsp::CccspTags, sfi::SfiTable},
    chook::{Chook, ChookId, Chooks, CoreChooks},
    guppy::GuppyTags,
    names::NameTable,
    nodetype::{NodeTypes, TagFlags, TagId},
    ops::{CompOp, CompOpFn, LangOp, LangOpFn, LangReq},
    opts::CompOpts,
    origin::{LexFiles, OpOrigin, Origin},
    passes::PassState,
    report::{Reporter, Severity},
    tracer::{CompilerTracer, NoopTracer},
    tree::{Hook, NodeId, Tree, TreeNode},
};

/// Tags for the reserved built-in node types.
#[derive(Debug, Clone, Copy)]
pub struct CoreTags {
    /// `LIST` — a node whose single hook is an ordered, owning sequence.
    pub list: TagId,
    /// `CONST` — subnode 0 is the type, the hook carries the raw value.
    pub constant: TagId,
}

/// Per-node copy decision for [`Compiler::copy_or_alias_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyControl {
    /// Share the original node (the copy references the same id).
    Alias,
    /// Copy this node; each flag selects deep-copying of that slot class.
    Copy { subs: bool, hooks: bool, chooks: bool },
}

impl CopyControl {
    /// Full deep copy of everything.
    pub const DEEP: Self = Self::Copy {
        subs: true,
        hooks: true,
        chooks: true,
    };
}

/// The compiler context object.
#[derive(Debug)]
pub struct Compiler {
    pub nodetypes: NodeTypes,
    pub chooks: Chooks,
    pub core_chooks: CoreChooks,
    pub core_tags: CoreTags,
    pub tree: Tree,
    pub names: NameTable,
    pub files: LexFiles,
    pub reporter: Reporter,
    pub opts: CompOpts,
    pub tracer: Box<dyn CompilerTracer>,
    /// The static function index built by the dcg pass.
    pub sfi: SfiTable,
    /// Tag bundle of the Guppy front-end, once registered.
    pub guppy: Option<GuppyTags>,
    /// Tag bundle of the CCSP back-end, once registered.
    pub cccsp: Option<CccspTags>,
}

impl Compiler {
    /// Creates a context with only the core node set registered.
    #[must_use]
    pub fn new(opts: CompOpts) -> Self {
        let mut nodetypes = NodeTypes::new();
        let mut chooks = Chooks::new();
        let core_chooks = CoreChooks::register(&mut chooks);

        let list_type = nodetypes.new_type("core:list", 0, 0, 1);
        let list = nodetypes.new_tag("LIST", list_type, TagFlags::empty());
        let const_type = nodetypes.new_type("core:const", 1, 0, 1);
        let constant = nodetypes.new_tag("CONST", const_type, TagFlags::empty());

        Self {
            nodetypes,
            chooks,
            core_chooks,
            core_tags: CoreTags { list, constant },
            tree: Tree::new(),
            names: NameTable::new(),
            files: LexFiles::new(),
            reporter: Reporter::new(),
            opts,
            tracer: Box::new(NoopTracer),
            sfi: SfiTable::new(),
            guppy: None,
            cccsp: None,
        }
    }

    /// Context with the Guppy front-end and CCSP back-end registered: the
    /// configuration the driver and most tests use.
    #[must_use]
    pub fn new_guppy(opts: CompOpts) -> Self {
        let mut comp = Self::new(opts);
        crate::backend::cccsp::register(&mut comp);
        crate::guppy::register(&mut comp);
        comp
    }

    /// The Guppy tag bundle.
    ///
    /// # Panics
    /// Panics when the Guppy front-end has not been registered.
    #[must_use]
    pub fn gup(&self) -> GuppyTags {
        self.guppy.expect("guppy front-end not registered")
    }

    /// The CCSP back-end tag bundle.
    ///
    /// # Panics
    /// Panics when the back-end has not been registered.
    #[must_use]
    pub fn ccsp(&self) -> CccspTags {
        self.cccsp.expect("cccsp back-end not registered")
    }

    // ==========================
    // diagnostics

    pub fn report(&mut self, severity: Severity, origin: Option<Origin>, message: String) {
        self.reporter.report(&mut self.files, severity, origin, message);
    }

    /// Reports an error against a node's source position.
    pub fn error_at(&mut self, node: NodeId, message: String) {
        let org = self.tree.origin(node);
        self.report(Severity::Error, Some(org), message);
    }

    /// Reports a warning against a node's source position.
    pub fn warn_at(&mut self, node: NodeId, message: String) {
        let org = self.tree.origin(node);
        self.report(Severity::Warning, Some(org), message);
    }

    // ==========================
    // node construction

    /// Allocates an all-null node of the tag's declared shape.
    #[must_use]
    pub fn new_node(&mut self, tag: TagId, origin: Origin) -> NodeId {
        let tdef = self.nodetypes.type_of_tag(tag);
        let node = TreeNode::empty(tag, origin, tdef.nsub, tdef.nname, tdef.nhooks);
        self.tree.alloc(node)
    }

    /// Allocates a node, filling subnode slots from `subs`.
    ///
    /// # Panics
    /// Panics when `subs` is longer than the tag's declared subnode count.
    #[must_use]
    pub fn create(&mut self, tag: TagId, origin: Origin, subs: &[Option<NodeId>]) -> NodeId {
        let node = self.new_node(tag, origin);
        for (i, &sub) in subs.iter().enumerate() {
            self.set_sub(node, i, sub);
        }
        node
    }

    /// Like [`Self::create`], taking the origin from a reference node.
    #[must_use]
    pub fn create_from(&mut self, tag: TagId, src: NodeId, subs: &[Option<NodeId>]) -> NodeId {
        let origin = self.tree.origin(src);
        self.create(tag, origin, subs)
    }

    /// Name of a node's tag, for diagnostics.
    #[must_use]
    pub fn tag_name_of(&self, node: NodeId) -> &str {
        self.nodetypes.tag_name(self.tree.tag(node))
    }

    /// Whether a node's tag carries a flag.
    #[must_use]
    pub fn tag_flag(&self, node: NodeId, flag: TagFlags) -> bool {
        self.nodetypes.tag_def(self.tree.tag(node)).flags.contains(flag)
    }

    // ==========================
    // slot access (bounds-checked against the declared shape)

    #[track_caller]
    fn slot_check(&self, node: NodeId, i: usize, have: usize, what: &str) {
        assert!(
            i < have,
            "{} slot {} out of range for [{}] ({} declared)",
            what,
            i,
            self.tag_name_of(node),
            have
        );
    }

    pub fn set_sub(&mut self, node: NodeId, i: usize, sub: Option<NodeId>) {
        self.slot_check(node, i, self.tree.node(node).subs.len(), "subnode");
        self.tree.node_mut(node).subs[i] = sub;
    }

    #[must_use]
    pub fn sub(&self, node: NodeId, i: usize) -> Option<NodeId> {
        self.slot_check(node, i, self.tree.node(node).subs.len(), "subnode");
        self.tree.node(node).subs[i]
    }

    /// Subnode that must be present.
    ///
    /// # Panics
    /// Panics when the slot is null (compiler bug).
    #[must_use]
    #[track_caller]
    pub fn sub_expect(&self, node: NodeId, i: usize) -> NodeId {
        self.sub(node, i)
            .unwrap_or_else(|| panic!("null subnode {} of [{}]", i, self.tag_name_of(node)))
    }

    pub fn set_name_slot(&mut self, node: NodeId, i: usize, name: Option<crate::names::NameId>) {
        self.slot_check(node, i, self.tree.node(node).names.len(), "name");
        self.tree.node_mut(node).names[i] = name;
    }

    #[must_use]
    pub fn name_slot(&self, node: NodeId, i: usize) -> Option<crate::names::NameId> {
        self.slot_check(node, i, self.tree.node(node).names.len(), "name");
        self.tree.node(node).names[i]
    }

    /// First name slot of a node, when it has one: the query use sites use
    /// to recognise name references regardless of their tag.
    #[must_use]
    pub fn name_slot_of_namenode(&self, node: NodeId) -> Option<crate::names::NameId> {
        self.tree.node(node).names.first().copied().flatten()
    }

    /// Name slot that must be present.
    ///
    /// # Panics
    /// Panics when the slot is null (compiler bug).
    #[must_use]
    #[track_caller]
    pub fn name_expect(&self, node: NodeId, i: usize) -> crate::names::NameId {
        self.name_slot(node, i)
            .unwrap_or_else(|| panic!("null name slot {} of [{}]", i, self.tag_name_of(node)))
    }

    pub fn set_hook(&mut self, node: NodeId, i: usize, hook: Option<Hook>) {
        self.slot_check(node, i, self.tree.node(node).hooks.len(), "hook");
        self.tree.node_mut(node).hooks[i] = hook;
    }

    #[must_use]
    pub fn hook(&self, node: NodeId, i: usize) -> Option<&Hook> {
        self.slot_check(node, i, self.tree.node(node).hooks.len(), "hook");
        self.tree.node(node).hooks[i].as_ref()
    }

    pub fn hook_mut(&mut self, node: NodeId, i: usize) -> Option<&mut Hook> {
        self.slot_check(node, i, self.tree.node(node).hooks.len(), "hook");
        self.tree.node_mut(node).hooks[i].as_mut()
    }

    pub fn take_hook(&mut self, node: NodeId, i: usize) -> Option<Hook> {
        self.slot_check(node, i, self.tree.node(node).hooks.len(), "hook");
        self.tree.node_mut(node).hooks[i].take()
    }

    // ==========================
    // chooks

    #[must_use]
    pub fn chook(&self, node: NodeId, id: ChookId) -> Option<&Chook> {
        self.tree
            .node(node)
            .chooks
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    pub fn chook_mut(&mut self, node: NodeId, id: ChookId) -> Option<&mut Chook> {
        self.tree
            .node_mut(node)
            .chooks
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    pub fn set_chook(&mut self, node: NodeId, id: ChookId, value: Chook) {
        let chooks = &mut self.tree.node_mut(node).chooks;
        if let Some(slot) = chooks.iter_mut().find(|(cid, _)| *cid == id) {
            slot.1 = value;
        } else {
            chooks.push((id, value));
        }
    }

    pub fn take_chook(&mut self, node: NodeId, id: ChookId) -> Option<Chook> {
        let chooks = &mut self.tree.node_mut(node).chooks;
        let pos = chooks.iter().position(|(cid, _)| *cid == id)?;
        Some(chooks.remove(pos).1)
    }

    /// Moves every `AUTOPROMOTE` chook from `from` onto `to`; called by
    /// rewrites that replace one node with another.
    pub fn promote_chooks(&mut self, from: NodeId, to: NodeId) {
        if from == to {
            return;
        }
        let ids: Vec<ChookId> = self.tree.node(from).chooks.iter().map(|(cid, _)| *cid).collect();
        for cid in ids {
            if self.chooks.def(cid).autopromote
                && let Some(chook) = self.take_chook(from, cid)
            {
                self.set_chook(to, cid, chook);
            }
        }
    }

    // ==========================
    // lists

    /// Creates an empty list node.
    #[must_use]
    pub fn new_list(&mut self, origin: Origin) -> NodeId {
        let node = self.new_node(self.core_tags.list, origin);
        self.set_hook(node, 0, Some(Hook::List(Vec::new())));
        node
    }

    #[must_use]
    pub fn is_list(&self, node: NodeId) -> bool {
        self.tree.tag(node) == self.core_tags.list
    }

    #[track_caller]
    fn list_vec(&self, list: NodeId) -> &Vec<NodeId> {
        assert!(self.is_list(list), "list operation on [{}]", self.tag_name_of(list));
        match self.tree.node(list).hooks[0].as_ref() {
            Some(Hook::List(items)) => items,
            _ => panic!("list node without a list hook"),
        }
    }

    #[track_caller]
    fn list_vec_mut(&mut self, list: NodeId) -> &mut Vec<NodeId> {
        assert!(self.is_list(list), "list operation on [{}]", self.tag_name_of(list));
        match self.tree.node_mut(list).hooks[0].as_mut() {
            Some(Hook::List(items)) => items,
            _ => panic!("list node without a list hook"),
        }
    }

    pub fn list_add(&mut self, list: NodeId, item: NodeId) {
        self.list_vec_mut(list).push(item);
    }

    pub fn list_insert_at(&mut self, list: NodeId, index: usize, item: NodeId) {
        self.list_vec_mut(list).insert(index, item);
    }

    /// Removes and returns the item at `index`.
    pub fn list_delete_at(&mut self, list: NodeId, index: usize) -> NodeId {
        self.list_vec_mut(list).remove(index)
    }

    #[must_use]
    pub fn list_count(&self, list: NodeId) -> usize {
        self.list_vec(list).len()
    }

    #[must_use]
    pub fn list_nth(&self, list: NodeId, index: usize) -> NodeId {
        self.list_vec(list)[index]
    }

    /// Snapshot of the list's items.
    #[must_use]
    pub fn list_items(&self, list: NodeId) -> Vec<NodeId> {
        self.list_vec(list).clone()
    }

    /// Replaces the item at `index`.
    pub fn list_set_nth(&mut self, list: NodeId, index: usize, item: NodeId) {
        self.list_vec_mut(list)[index] = item;
    }

    /// Wraps the subnode at `i` into a singleton list unless it already is
    /// a list; a null slot gets an empty list.
    pub fn ensure_list_in_slot(&mut self, node: NodeId, i: usize) {
        match self.sub(node, i) {
            Some(sub) if self.is_list(sub) => {}
            Some(sub) => {
                let origin = self.tree.origin(sub);
                let list = self.new_list(origin);
                self.list_add(list, sub);
                self.set_sub(node, i, Some(list));
            }
            None => {
                let origin = self.tree.origin(node);
                let list = self.new_list(origin);
                self.set_sub(node, i, Some(list));
            }
        }
    }

    // ==========================
    // walks

    /// Post-order walk: children (subnodes in slot order, then list-hook
    /// elements), then the node itself.
    pub fn postwalk(&mut self, node: NodeId, f: &mut dyn FnMut(&mut Self, NodeId)) {
        for child in self.tree.sub_ids(node) {
            self.postwalk(child, f);
        }
        for child in self.tree.hook_ids(node) {
            self.postwalk(child, f);
        }
        f(self, node);
    }

    /// Pre-order walk; a `false` return prunes the subtree.
    pub fn prewalk(&mut self, node: NodeId, f: &mut dyn FnMut(&mut Self, NodeId) -> bool) {
        if !f(self, node) {
            return;
        }
        for child in self.tree.sub_ids(node) {
            self.prewalk(child, f);
        }
        for child in self.tree.hook_ids(node) {
            self.prewalk(child, f);
        }
    }

    /// Pre-order walk that may replace nodes through the slot reference; a
    /// replacement's children are then walked. A `false` return prunes.
    pub fn modprewalk(&mut self, slot: &mut NodeId, f: &mut dyn FnMut(&mut Self, &mut NodeId) -> bool) {
        if !f(self, slot) {
            return;
        }
        self.for_each_child_slot(*slot, &mut |comp, child| comp.modprewalk(child, f));
    }

    /// Combined walk: `pre` returns positive to descend, zero to skip the
    /// subtree but still run `post`, negative to suppress `post` as well.
    pub fn modprepostwalk(
        &mut self,
        slot: &mut NodeId,
        pre: &mut dyn FnMut(&mut Self, &mut NodeId) -> i32,
        post: &mut dyn FnMut(&mut Self, &mut NodeId),
    ) {
        let decision = pre(self, slot);
        if decision > 0 {
            self.for_each_child_slot(*slot, &mut |comp, child| comp.modprepostwalk(child, pre, post));
        }
        if decision >= 0 {
            post(self, slot);
        }
    }

    /// Runs `f` over every child slot (subnodes, then list-hook elements),
    /// writing any replacement back into the parent. This is the primitive
    /// the pass-specific recursive walkers build on.
    pub fn for_each_child_slot(&mut self, node: NodeId, f: &mut dyn FnMut(&mut Self, &mut NodeId)) {
        let nsubs = self.tree.node(node).subs.len();
        for i in 0..nsubs {
            if let Some(mut child) = self.tree.node(node).subs[i] {
                f(self, &mut child);
                self.tree.node_mut(node).subs[i] = Some(child);
            }
        }
        let nhooks = self.tree.node(node).hooks.len();
        for h in 0..nhooks {
            if matches!(self.tree.node(node).hooks[h], Some(Hook::List(_))) {
                let Some(Hook::List(mut items)) = self.tree.node_mut(node).hooks[h].take() else {
                    unreachable!("checked above");
                };
                for item in &mut items {
                    f(self, item);
                }
                self.tree.node_mut(node).hooks[h] = Some(Hook::List(items));
            }
        }
    }

    // ==========================
    // copying and freeing

    /// Deep-copies a tree. Name slots alias the same names (bumping their
    /// reference counts); chooks marked `copied` travel with the copy.
    pub fn copy_tree(&mut self, node: NodeId) -> NodeId {
        self.copy_or_alias_tree(node, &|_, _| CopyControl::DEEP)
    }

    /// Copies a tree under caller control: the predicate picks, per node,
    /// aliasing or selective copying of subnodes/hooks/chooks.
    pub fn copy_or_alias_tree(&mut self, node: NodeId, control: &dyn Fn(&Self, NodeId) -> CopyControl) -> NodeId {
        match control(self, node) {
            CopyControl::Alias => node,
            CopyControl::Copy { subs, hooks, chooks } => {
                let src = self.tree.node(node).clone();
                let new = self.tree.alloc(TreeNode {
                    tag: src.tag,
                    origin: src.origin,
                    subs: src.subs.iter().map(|_| None).collect(),
                    names: src.names.clone(),
                    hooks: src.hooks.iter().map(|_| None).collect(),
                    chooks: Vec::new(),
                });
                for name in src.names.iter().flatten() {
                    self.names.add_ref(*name);
                }
                for (i, sub) in src.subs.iter().copied().enumerate() {
                    let copied = sub.map(|s| {
                        if subs {
                            self.copy_or_alias_tree(s, control)
                        } else {
                            s
                        }
                    });
                    self.tree.node_mut(new).subs[i] = copied;
                }
                for (i, hook) in src.hooks.into_iter().enumerate() {
                    let copied = hook.map(|h| match h {
                        Hook::List(items) if hooks => {
                            let items = items.iter().map(|&it| self.copy_or_alias_tree(it, control)).collect();
                            Hook::List(items)
                        }
                        other => other,
                    });
                    self.tree.node_mut(new).hooks[i] = copied;
                }
                if chooks {
                    for (cid, chook) in src.chooks {
                        if self.chooks.def(cid).copied {
                            self.set_chook(new, cid, chook);
                        }
                    }
                }
                new
            }
        }
    }

    /// Frees a tree: owned subnodes and list-hook elements exactly once,
    /// releasing name references along the way.
    pub fn free_tree(&mut self, node: NodeId) {
        let freed = self.tree.dealloc(node);
        for name in freed.names.iter().flatten() {
            self.names.release(*name);
        }
        for sub in freed.subs.iter().flatten() {
            self.free_tree(*sub);
        }
        for hook in freed.hooks.into_iter().flatten() {
            if let Hook::List(items) = hook {
                for item in items {
                    self.free_tree(item);
                }
            }
        }
    }

    /// Structural equality: same tags, same subnode shape, same name
    /// identifiers, same hook payloads.
    #[must_use]
    pub fn tree_eq(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (self.tree.node(a), self.tree.node(b));
        if na.tag != nb.tag || na.subs.len() != nb.subs.len() || na.names.len() != nb.names.len() {
            return false;
        }
        for (sa, sb) in na.subs.iter().zip(nb.subs.iter()) {
            match (sa, sb) {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    if !self.tree_eq(*x, *y) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        for (ma, mb) in na.names.iter().zip(nb.names.iter()) {
            match (ma, mb) {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    if self.names.ident(*x) != self.names.ident(*y) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        for (ha, hb) in na.hooks.iter().zip(nb.hooks.iter()) {
            match (ha, hb) {
                (None, None) => {}
                (Some(Hook::List(xs)), Some(Hook::List(ys))) => {
                    if xs.len() != ys.len() {
                        return false;
                    }
                    for (x, y) in xs.iter().zip(ys.iter()) {
                        if !self.tree_eq(*x, *y) {
                            return false;
                        }
                    }
                }
                (Some(x), Some(y)) => {
                    if x != y {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    // ==========================
    // dumps

    /// Human-readable tree dump, one node per line, indent-structured.
    #[must_use]
    pub fn dump_tree(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.dump_tree_inner(node, 0, &mut out);
        out
    }

    fn dump_tree_inner(&self, node: NodeId, indent: usize, out: &mut String) {
        use std::fmt::Write;
        let pad = "    ".repeat(indent);
        let tdef = self.nodetypes.type_of_tag(self.tree.tag(node));
        let _ = write!(out, "{pad}{} ({})", self.tag_name_of(node), tdef.name);
        let n = self.tree.node(node);
        for name in n.names.iter().flatten() {
            let _ = write!(out, " name=[{}]", self.names.ident(*name));
        }
        for (cid, chook) in &n.chooks {
            let _ = write!(out, " chook=[{}:{}]", self.chooks.def(*cid).name, chook.label());
        }
        out.push('\n');
        for sub in &n.subs {
            match sub {
                Some(s) => self.dump_tree_inner(*s, indent + 1, out),
                None => {
                    let _ = writeln!(out, "{pad}    *null*");
                }
            }
        }
        for hook in n.hooks.iter().flatten() {
            match hook {
                Hook::List(items) => {
                    let _ = writeln!(out, "{pad}    list: {} items", items.len());
                    for item in items {
                        self.dump_tree_inner(*item, indent + 2, out);
                    }
                }
                other => {
                    let _ = writeln!(out, "{pad}    hook: {other:?}");
                }
            }
        }
    }

    /// Machine-readable tree dump.
    #[must_use]
    pub fn dump_json(&self, node: NodeId) -> serde_json::Value {
        let n = self.tree.node(node);
        let subs: Vec<serde_json::Value> = n
            .subs
            .iter()
            .map(|s| s.map_or(serde_json::Value::Null, |id| self.dump_json(id)))
            .collect();
        let names: Vec<serde_json::Value> = n
            .names
            .iter()
            .map(|m| m.map_or(serde_json::Value::Null, |id| self.names.ident(id).into()))
            .collect();
        let hooks: Vec<serde_json::Value> = n
            .hooks
            .iter()
            .map(|h| match h {
                Some(Hook::List(items)) => {
                    serde_json::Value::Array(items.iter().map(|&it| self.dump_json(it)).collect())
                }
                Some(other) => format!("{other:?}").into(),
                None => serde_json::Value::Null,
            })
            .collect();
        serde_json::json!({
            "tag": self.tag_name_of(node),
            "subs": subs,
            "names": names,
            "hooks": hooks,
        })
    }

    // ==========================
    // operation dispatch

    /// Whether a node's type implements a compop anywhere in its chain.
    #[must_use]
    pub fn has_compop(&self, node: NodeId, op: CompOp) -> bool {
        self.nodetypes.type_of_tag(self.tree.tag(node)).compops.has(op as usize)
    }

    /// Dispatches a compop on the node in `slot`.
    ///
    /// Returns `None` when no implementation is registered; otherwise the
    /// op's verdict on descending into children. Callthrough slots cascade
    /// to the `next` table, so an override chain runs the resolved
    /// implementation exactly once.
    pub fn call_compop(&mut self, state: &mut PassState, slot: &mut NodeId, op: CompOp) -> Option<bool> {
        let tag = self.tree.tag(*slot);
        let resolved = self.nodetypes.type_of_tag(tag).compops.resolve(op as usize);
        let (f, _origin) = resolved?;
        if self.opts.trace_compops.contains(op.trace_name()) {
            let tag_name = self.nodetypes.tag_name(tag).to_owned();
            self.tracer.on_compop(op.trace_name(), &tag_name);
        }
        Some(f(self, state, slot))
    }

    /// Dispatches a langop query; returns whether it was handled.
    pub fn call_langop(&mut self, node: NodeId, op: LangOp, req: &mut LangReq) -> bool {
        let tag = self.tree.tag(node);
        let resolved = self.nodetypes.type_of_tag(tag).langops.resolve(op as usize);
        let Some((f, _origin)) = resolved else {
            return false;
        };
        if self.opts.trace_langops.contains(op.trace_name()) {
            let tag_name = self.nodetypes.tag_name(tag).to_owned();
            self.tracer.on_langop(op.trace_name(), &tag_name);
        }
        f(self, node, req)
    }

    /// Registers a compop implementation for a node type.
    pub fn set_compop(&mut self, typ: crate::nodetype::TypeId, op: CompOp, f: CompOpFn, origin: OpOrigin) {
        self.nodetypes.compops_mut(typ).set(op as usize, f, origin);
    }

    /// Registers a langop implementation for a node type.
    pub fn set_langop(&mut self, typ: crate::nodetype::TypeId, op: LangOp, f: LangOpFn, origin: OpOrigin) {
        self.nodetypes.langops_mut(typ).set(op as usize, f, origin);
    }

    // ==========================
    // langop query wrappers

    /// Resolved type of a node, falling back to `default`.
    pub fn get_type(&mut self, node: NodeId, default: Option<NodeId>) -> Option<NodeId> {
        let mut req = LangReq::GetType { default, result: None };
        if self.call_langop(node, LangOp::GetType, &mut req)
            && let LangReq::GetType { result: Some(t), .. } = req
        {
            return Some(t);
        }
        default
    }

    /// Checks an actual type against a formal; `None` means incompatible.
    pub fn type_actual(&mut self, formal: NodeId, actual: NodeId) -> Option<NodeId> {
        let mut req = LangReq::TypeActual {
            formal,
            actual,
            result: None,
        };
        if self.call_langop(formal, LangOp::TypeActual, &mut req)
            && let LangReq::TypeActual { result, .. } = req
        {
            return result;
        }
        // default: structurally identical tags are compatible
        if self.tree.tag(formal) == self.tree.tag(actual) {
            Some(formal)
        } else {
            None
        }
    }

    /// Byte size of a type node, when known.
    pub fn bytes_for(&mut self, node: NodeId) -> Option<i64> {
        let mut req = LangReq::BytesFor { result: None };
        if self.call_langop(node, LangOp::BytesFor, &mut req)
            && let LangReq::BytesFor { result } = req
        {
            return result;
        }
        None
    }

    /// Whether a node is (or folds to) a constant.
    pub fn is_const(&mut self, node: NodeId) -> bool {
        if self.is_const_node(node) {
            return true;
        }
        let mut req = LangReq::IsConst { result: false };
        if self.call_langop(node, LangOp::IsConst, &mut req)
            && let LangReq::IsConst { result } = req
        {
            return result;
        }
        false
    }

    /// Folded value of a constant-valued node.
    pub fn const_val_of(&mut self, node: NodeId) -> Option<crate::constants::ConstData> {
        if self.is_const_node(node) {
            return Some(self.const_data_of(node));
        }
        let mut req = LangReq::ConstValOf { result: None };
        if self.call_langop(node, LangOp::ConstValOf, &mut req)
            && let LangReq::ConstValOf { result } = req
        {
            return result;
        }
        None
    }

    /// Whether a node denotes a modifiable variable.
    pub fn is_var(&mut self, node: NodeId) -> bool {
        let mut req = LangReq::IsVar { result: false };
        if self.call_langop(node, LangOp::IsVar, &mut req)
            && let LangReq::IsVar { result } = req
        {
            return result;
        }
        false
    }

    /// Default pointer-indirection level of a type.
    pub fn def_pointer_level(&mut self, node: NodeId) -> i32 {
        let mut req = LangReq::IsDefPointer { result: 0 };
        if self.call_langop(node, LangOp::IsDefPointer, &mut req)
            && let LangReq::IsDefPointer { result } = req
        {
            return result;
        }
        0
    }

    /// Whether values of this type pass by reference.
    pub fn val_by_ref(&mut self, node: NodeId) -> bool {
        let mut req = LangReq::ValByRef { result: false };
        if self.call_langop(node, LangOp::ValByRef, &mut req)
            && let LangReq::ValByRef { result } = req
        {
            return result;
        }
        false
    }

    /// Initialiser call for a declared variable, if its type needs one.
    pub fn init_call(&mut self, typ: NodeId, var: NodeId) -> Option<NodeId> {
        let mut req = LangReq::InitCall { var, result: None };
        if self.call_langop(typ, LangOp::InitCall, &mut req)
            && let LangReq::InitCall { result, .. } = req
        {
            return result;
        }
        None
    }

    /// Finaliser call for a declared variable, if its type needs one.
    pub fn free_call(&mut self, typ: NodeId, var: NodeId) -> Option<NodeId> {
        let mut req = LangReq::FreeCall { var, result: None };
        if self.call_langop(typ, LangOp::FreeCall, &mut req)
            && let LangReq::FreeCall { result, .. } = req
        {
            return result;
        }
        None
    }

    /// Stable hash of a protocol/type for ANY-protocol tagging.
    pub fn type_hash(&mut self, node: NodeId) -> u32 {
        let mut req = LangReq::TypeHash { result: 0 };
        if self.call_langop(node, LangOp::TypeHash, &mut req)
            && let LangReq::TypeHash { result } = req
        {
            return result;
        }
        // fall back to a hash of the tag name
        let name = self.tag_name_of(node);
        name.bytes().fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193))
    }

    /// Source-level name of a node, when it has one.
    pub fn get_name(&mut self, node: NodeId) -> Option<String> {
        let mut req = LangReq::GetName { result: None };
        if self.call_langop(node, LangOp::GetName, &mut req)
            && let LangReq::GetName { result } = req
        {
            return result;
        }
        None
    }

    /// C type spelling of a type node.
    pub fn ctype_of(&mut self, node: NodeId) -> Option<String> {
        let mut req = LangReq::GetCTypeOf { result: None };
        if self.call_langop(node, LangOp::GetCTypeOf, &mut req)
            && let LangReq::GetCTypeOf { result } = req
        {
            return result;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodetype::TagFlags;

    fn test_compiler() -> (Compiler, TagId, TagId) {
        let mut comp = Compiler::new(CompOpts::default());
        let leaf_type = comp.nodetypes.new_type("test:leaf", 0, 0, 0);
        let leaf = comp.nodetypes.new_tag("TLEAF", leaf_type, TagFlags::empty());
        let pair_type = comp.nodetypes.new_type("test:pair", 2, 0, 0);
        let pair = comp.nodetypes.new_tag("TPAIR", pair_type, TagFlags::empty());
        (comp, leaf, pair)
    }

    #[test]
    fn test_create_and_slots() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let b = comp.new_node(leaf, Origin::BUILTIN);
        let p = comp.create(pair, Origin::BUILTIN, &[Some(a), Some(b)]);
        assert_eq!(comp.sub(p, 0), Some(a));
        assert_eq!(comp.sub(p, 1), Some(b));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_slot_bounds_checked() {
        let (mut comp, leaf, _) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        comp.sub(a, 0);
    }

    #[test]
    fn test_list_operations() {
        let (mut comp, leaf, _) = test_compiler();
        let list = comp.new_list(Origin::BUILTIN);
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let b = comp.new_node(leaf, Origin::BUILTIN);
        let c = comp.new_node(leaf, Origin::BUILTIN);
        comp.list_add(list, a);
        comp.list_add(list, c);
        comp.list_insert_at(list, 1, b);
        assert_eq!(comp.list_count(list), 3);
        assert_eq!(comp.list_items(list), vec![a, b, c]);
        assert_eq!(comp.list_delete_at(list, 0), a);
        assert_eq!(comp.list_nth(list, 0), b);
    }

    #[test]
    fn test_ensure_list_in_slot_wraps_singleton() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let p = comp.create(pair, Origin::BUILTIN, &[Some(a), None]);
        comp.ensure_list_in_slot(p, 0);
        comp.ensure_list_in_slot(p, 1);
        let wrapped = comp.sub_expect(p, 0);
        assert!(comp.is_list(wrapped));
        assert_eq!(comp.list_items(wrapped), vec![a]);
        let empty = comp.sub_expect(p, 1);
        assert!(comp.is_list(empty));
        assert_eq!(comp.list_count(empty), 0);
        // already a list: no double wrap
        comp.ensure_list_in_slot(p, 0);
        assert_eq!(comp.sub_expect(p, 0), wrapped);
    }

    #[test]
    fn test_copy_tree_is_structurally_equal_and_independent() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let b = comp.new_node(leaf, Origin::BUILTIN);
        let p = comp.create(pair, Origin::BUILTIN, &[Some(a), Some(b)]);

        let copy = comp.copy_tree(p);
        assert!(comp.tree_eq(p, copy));
        comp.free_tree(copy);
        assert!(comp.tree.is_live(p));
        assert!(comp.tree.is_live(a));
        assert!(comp.tree.is_live(b));
    }

    #[test]
    fn test_copy_or_alias_shares_on_alias() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let b = comp.new_node(leaf, Origin::BUILTIN);
        let p = comp.create(pair, Origin::BUILTIN, &[Some(a), Some(b)]);

        let leaf_tag = leaf;
        let copy = comp.copy_or_alias_tree(p, &move |comp, n| {
            if comp.tree.tag(n) == leaf_tag {
                CopyControl::Alias
            } else {
                CopyControl::DEEP
            }
        });
        assert_ne!(copy, p);
        assert_eq!(comp.sub(copy, 0), Some(a), "leaves are aliased");
    }

    #[test]
    fn test_walk_totality() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let list = comp.new_list(Origin::BUILTIN);
        let c = comp.new_node(leaf, Origin::BUILTIN);
        comp.list_add(list, c);
        let p = comp.create(pair, Origin::BUILTIN, &[Some(a), Some(list)]);

        let mut visited = Vec::new();
        comp.prewalk(p, &mut |_, n| {
            visited.push(n);
            true
        });
        assert!(visited.contains(&p));
        assert!(visited.contains(&a));
        assert!(visited.contains(&list));
        assert!(visited.contains(&c), "list elements are walked");
        assert_eq!(visited.len(), 4);

        let mut post_order = Vec::new();
        comp.postwalk(p, &mut |_, n| post_order.push(n));
        assert_eq!(post_order.len(), 4);
        assert_eq!(*post_order.last().expect("non-empty"), p, "node after children");
    }

    #[test]
    fn test_modprewalk_replacement_children_walked() {
        let (mut comp, leaf, pair) = test_compiler();
        let a = comp.new_node(leaf, Origin::BUILTIN);
        let mut root = comp.create(pair, Origin::BUILTIN, &[Some(a), None]);

        // replace the leaf with a pair of two fresh leaves; the walk must
        // then visit the replacement's children
        let mut seen = 0usize;
        let leaf_tag = leaf;
        let pair_tag = pair;
        comp.modprewalk(&mut root, &mut move |comp, slot| {
            seen += 1;
            if comp.tree.tag(*slot) == leaf_tag && seen == 2 {
                let x = comp.new_node(leaf_tag, Origin::BUILTIN);
                let y = comp.new_node(leaf_tag, Origin::BUILTIN);
                *slot = comp.create(pair_tag, Origin::BUILTIN, &[Some(x), Some(y)]);
            }
            true
        });
        let replaced = comp.sub_expect(root, 0);
        assert_eq!(comp.tree.tag(replaced), pair);
        assert!(comp.sub(replaced, 0).is_some());
    }
}
