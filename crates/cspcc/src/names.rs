//! Names, namespaces, and the global ordered namestack.
//!
//! Names live in an arena and are referenced by [`NameId`]; the tree's name
//! slots hold these ids, so name-to-declaration cycles reduce to index
//! bookkeeping. Each distinct identifier owns a stack of competing
//! definitions; the innermost wins. The global namestack records scoping
//! order so a whole block can be descoped with one mark.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::tree::NodeId;

/// Index into the name arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NameId(u32);

impl NameId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("name id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the namespace table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NamespaceId(u32);

impl NamespaceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("namespace id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One name: identifier, links into the tree, and scoping data.
#[derive(Debug)]
pub struct NameData {
    /// The textual identifier (owned here; the per-identifier list is keyed
    /// by the same string).
    pub ident: String,
    /// The declaration node this name was introduced by.
    pub decl: Option<NodeId>,
    /// The type node (a list of types for functions).
    pub typ: Option<NodeId>,
    /// The name-reference node substituted at use sites.
    pub namenode: Option<NodeId>,
    /// Namespace the name belongs to, if any.
    pub namespace: Option<NamespaceId>,
    /// Use-site reference count.
    pub refcount: u32,
    /// Lexical level the name was declared at.
    pub lexlevel: u32,
    /// Whether the name is currently in scope.
    in_scope: bool,
}

/// Per-identifier stack of competing definitions.
#[derive(Debug, Default)]
struct NameList {
    scopes: Vec<NameId>,
}

/// A named group of bindings.
#[derive(Debug)]
pub struct NamespaceData {
    pub name: String,
    /// Linked "next" namespace (nested namespaces share visibility).
    pub next: Option<NamespaceId>,
    /// Hidden namespaces fail visibility checks even though their names
    /// stay in storage.
    pub hidden: bool,
}

/// Why a scoped lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    NamespaceNotVisible(String),
}

/// The name environment for one compilation.
#[derive(Debug, Default)]
pub struct NameTable {
    arena: Vec<NameData>,
    lists: AHashMap<String, NameList>,
    namestack: Vec<NameId>,
    namespaces: IndexMap<String, NamespaceId>,
    ns_arena: Vec<NamespaceData>,
    temp_counter: u32,
}

impl NameTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics on an out-of-range id.
    #[must_use]
    pub fn get(&self, id: NameId) -> &NameData {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: NameId) -> &mut NameData {
        &mut self.arena[id.index()]
    }

    /// Identifier text of a name.
    #[must_use]
    pub fn ident(&self, id: NameId) -> &str {
        &self.arena[id.index()].ident
    }

    /// Fully-qualified identifier (`NS.name` when namespaced).
    #[must_use]
    pub fn qualified_ident(&self, id: NameId) -> String {
        let data = self.get(id);
        match data.namespace {
            Some(ns) => format!("{}.{}", self.namespace_data(ns).name, data.ident),
            None => data.ident.clone(),
        }
    }

    /// Bumps a name's use-site reference count.
    pub fn add_ref(&mut self, id: NameId) {
        self.arena[id.index()].refcount += 1;
    }

    /// Drops one use-site reference.
    pub fn release(&mut self, id: NameId) {
        let data = &mut self.arena[id.index()];
        data.refcount = data.refcount.saturating_sub(1);
    }

    /// Creates a name and brings it into scope: pushes it onto its
    /// identifier's stack and onto the global namestack.
    pub fn add_scope(
        &mut self,
        ident: &str,
        decl: Option<NodeId>,
        typ: Option<NodeId>,
        namespace: Option<NamespaceId>,
        lexlevel: u32,
    ) -> NameId {
        let id = NameId::new(self.arena.len());
        self.arena.push(NameData {
            ident: ident.to_owned(),
            decl,
            typ,
            namenode: None,
            namespace,
            refcount: 0,
            lexlevel,
            in_scope: true,
        });
        self.lists.entry(ident.to_owned()).or_default().scopes.push(id);
        self.namestack.push(id);
        id
    }

    /// Takes a single name out of scope. The name stays in the arena (the
    /// tree may still reference it); only lookup stops finding it.
    pub fn descope(&mut self, id: NameId) {
        let ident = self.arena[id.index()].ident.clone();
        if let Some(list) = self.lists.get_mut(&ident)
            && let Some(pos) = list.scopes.iter().rposition(|&n| n == id)
        {
            list.scopes.remove(pos);
        }
        self.arena[id.index()].in_scope = false;
        if let Some(pos) = self.namestack.iter().rposition(|&n| n == id) {
            self.namestack.remove(pos);
        }
    }

    /// Current top of the global namestack; pass to [`Self::mark_descope`].
    #[must_use]
    pub fn mark_scope(&self) -> usize {
        self.namestack.len()
    }

    /// Descopes every name added since the mark, in reverse order.
    pub fn mark_descope(&mut self, mark: usize) {
        while self.namestack.len() > mark {
            let id = self.namestack[self.namestack.len() - 1];
            let ident = self.arena[id.index()].ident.clone();
            if let Some(list) = self.lists.get_mut(&ident)
                && let Some(pos) = list.scopes.iter().rposition(|&n| n == id)
            {
                list.scopes.remove(pos);
            }
            self.arena[id.index()].in_scope = false;
            self.namestack.pop();
        }
    }

    /// Innermost in-scope binding for an identifier, namespace-blind.
    #[must_use]
    pub fn lookup(&self, ident: &str) -> Option<NameId> {
        self.lists.get(ident).and_then(|l| l.scopes.last().copied())
    }

    /// Namespace-aware lookup.
    ///
    /// A `NS.name` identifier restricts lookup to namespace `NS`, which must
    /// be in the visible set (and not hidden). A bare identifier prefers
    /// the innermost namespace-less binding, falling back to the innermost
    /// binding from any visible namespace.
    pub fn lookup_scoped(&self, ident: &str, visible: &[NamespaceId]) -> Result<NameId, LookupError> {
        if let Some((ns_name, rest)) = ident.split_once('.')
            && let Some(ns) = self.find_namespace(ns_name)
        {
            if self.namespace_data(ns).hidden || !visible.contains(&ns) {
                return Err(LookupError::NamespaceNotVisible(ns_name.to_owned()));
            }
            let list = self.lists.get(rest).ok_or(LookupError::NotFound)?;
            return list
                .scopes
                .iter()
                .rev()
                .copied()
                .find(|&id| self.get(id).namespace == Some(ns))
                .ok_or(LookupError::NotFound);
        }

        let list = self.lists.get(ident).ok_or(LookupError::NotFound)?;
        // innermost namespace-less binding first
        if let Some(id) = list
            .scopes
            .iter()
            .rev()
            .copied()
            .find(|&id| self.get(id).namespace.is_none())
        {
            return Ok(id);
        }
        // then the innermost binding from any visible, unhidden namespace
        list.scopes
            .iter()
            .rev()
            .copied()
            .find(|&id| {
                self.get(id)
                    .namespace
                    .is_some_and(|ns| !self.namespace_data(ns).hidden && visible.contains(&ns))
            })
            .ok_or(LookupError::NotFound)
    }

    /// All names currently in scope, innermost last.
    #[must_use]
    pub fn visible_names(&self) -> Vec<NameId> {
        self.namestack.clone()
    }

    /// Registers (or finds) a namespace by name.
    pub fn new_namespace(&mut self, name: &str) -> NamespaceId {
        if let Some(&id) = self.namespaces.get(name) {
            return id;
        }
        let id = NamespaceId::new(self.ns_arena.len());
        self.ns_arena.push(NamespaceData {
            name: name.to_owned(),
            next: None,
            hidden: false,
        });
        self.namespaces.insert(name.to_owned(), id);
        id
    }

    #[must_use]
    pub fn find_namespace(&self, name: &str) -> Option<NamespaceId> {
        self.namespaces.get(name).copied()
    }

    #[must_use]
    pub fn namespace_data(&self, id: NamespaceId) -> &NamespaceData {
        &self.ns_arena[id.index()]
    }

    /// Links `next` under `ns` (visibility of `ns` implies `next`).
    pub fn set_namespace_next(&mut self, ns: NamespaceId, next: NamespaceId) {
        self.ns_arena[ns.index()].next = Some(next);
    }

    /// Hides a namespace: lookups fail even though its names stay stored.
    pub fn hide_namespace(&mut self, ns: NamespaceId) {
        self.ns_arena[ns.index()].hidden = true;
    }

    /// Re-exposes a hidden namespace.
    pub fn unhide_namespace(&mut self, ns: NamespaceId) {
        self.ns_arena[ns.index()].hidden = false;
    }

    /// Fresh compiler-generated identifier (`tmp_0`, `tmp_1`, ...; or with a
    /// caller-supplied stem).
    pub fn temp_ident(&mut self, stem: &str) -> String {
        let n = self.temp_counter;
        self.temp_counter += 1;
        format!("{stem}_{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_wins() {
        let mut names = NameTable::new();
        let outer = names.add_scope("x", None, None, None, 0);
        let inner = names.add_scope("x", None, None, None, 1);
        assert_eq!(names.lookup("x"), Some(inner));
        names.descope(inner);
        assert_eq!(names.lookup("x"), Some(outer));
    }

    #[test]
    fn test_mark_descope_restores_visible_set() {
        let mut names = NameTable::new();
        let a = names.add_scope("a", None, None, None, 0);
        let before = names.visible_names();
        let mark = names.mark_scope();
        names.add_scope("b", None, None, None, 1);
        names.add_scope("c", None, None, None, 1);
        names.mark_descope(mark);
        assert_eq!(names.visible_names(), before);
        assert_eq!(names.lookup("a"), Some(a));
        assert_eq!(names.lookup("b"), None);
        assert_eq!(names.lookup("c"), None);
    }

    #[test]
    fn test_namespace_qualified_lookup() {
        let mut names = NameTable::new();
        let ns = names.new_namespace("io");
        let n = names.add_scope("put", None, None, Some(ns), 0);
        assert_eq!(names.lookup_scoped("io.put", &[ns]), Ok(n));
        assert_eq!(
            names.lookup_scoped("io.put", &[]),
            Err(LookupError::NamespaceNotVisible("io".into()))
        );
    }

    #[test]
    fn test_hidden_namespace_rejected() {
        let mut names = NameTable::new();
        let ns = names.new_namespace("io");
        names.add_scope("put", None, None, Some(ns), 0);
        names.hide_namespace(ns);
        assert_eq!(
            names.lookup_scoped("io.put", &[ns]),
            Err(LookupError::NamespaceNotVisible("io".into()))
        );
        // bare lookup falls through to not-found: no namespace-less binding
        assert_eq!(names.lookup_scoped("put", &[ns]), Err(LookupError::NotFound));
    }

    #[test]
    fn test_namespaceless_preferred_over_visible_namespace() {
        let mut names = NameTable::new();
        let ns = names.new_namespace("m");
        let in_ns = names.add_scope("v", None, None, Some(ns), 0);
        let plain = names.add_scope("v", None, None, None, 1);
        assert_eq!(names.lookup_scoped("v", &[ns]), Ok(plain));
        names.descope(plain);
        assert_eq!(names.lookup_scoped("v", &[ns]), Ok(in_ns));
    }
}
