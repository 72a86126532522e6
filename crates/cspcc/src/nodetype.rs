//! Node-type and node-tag registries.
//!
//! A node type declares a fixed shape (subnode/name/hook slot counts) and
//! owns the two operation tables its tags dispatch through. A node tag is a
//! concrete variant of a type (the type `guppy:cnode` has tags `SEQ`, `PAR`,
//! ...). Both registries are append-only: indices are stable once assigned,
//! and the whole registry is immutable after front-end registration.

use ahash::AHashMap;
use bitflags::bitflags;

use crate::ops::{CompOpFn, LangOpFn, OpTable};

/// Index into the node-type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("node-type id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into the node-tag registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TagId(u32);

impl TagId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("node-tag id out of range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Long-form parsing shape flags carried by a node tag.
    ///
    /// These describe how the long (indented) form of a construct parses,
    /// and which mechanical transforms apply to it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TagFlags: u32 {
        /// Long process: parse an indented process list into subnode 1.
        const INDENTED_PROC_LIST = 0x0001;
        /// Long process: parse a single indented process into subnode 1.
        const INDENTED_PROC = 0x0002;
        /// Long declaration: parse an indented name list into subnode 1.
        const INDENTED_NAME_LIST = 0x0004;
        /// Long declaration: parse an indented declaration list into subnode 1.
        const INDENTED_DECL_LIST = 0x0008;
        /// Constructor whose body list is subject to autoseq wrapping.
        const AUTOSEQ_BODY = 0x0010;
        /// Boolean operator.
        const BOOL_OP = 0x0020;
        /// Synchronisation type (channels, barriers).
        const SYNC_TYPE = 0x0040;
    }
}

/// Shape and dispatch tables for one node type.
#[derive(Debug)]
pub struct NodeTypeDef {
    pub name: String,
    pub id: TypeId,
    /// Number of ordered child subnode slots.
    pub nsub: usize,
    /// Number of named-entity slots.
    pub nname: usize,
    /// Number of hook slots.
    pub nhooks: usize,
    /// Compiler-operation table (transformations).
    pub compops: OpTable<CompOpFn>,
    /// Language-operation table (queries).
    pub langops: OpTable<LangOpFn>,
}

/// One concrete tag of a node type.
#[derive(Debug)]
pub struct NodeTagDef {
    pub name: String,
    pub id: TagId,
    pub typ: TypeId,
    pub flags: TagFlags,
}

/// The append-only node-type/tag registry.
#[derive(Debug, Default)]
pub struct NodeTypes {
    types: Vec<NodeTypeDef>,
    tags: Vec<NodeTagDef>,
    type_names: AHashMap<String, TypeId>,
    tag_names: AHashMap<String, TagId>,
}

impl NodeTypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new node type.
    ///
    /// # Panics
    /// Panics if a type with this name already exists (types are unique by
    /// name; use [`Self::lookup_or_new_type`] for idempotent registration).
    pub fn new_type(&mut self, name: &str, nsub: usize, nname: usize, nhooks: usize) -> TypeId {
        assert!(
            !self.type_names.contains_key(name),
            "node type [{name}] registered twice"
        );
        let id = TypeId::new(self.types.len());
        self.types.push(NodeTypeDef {
            name: name.to_owned(),
            id,
            nsub,
            nname,
            nhooks,
            compops: OpTable::new(),
            langops: OpTable::new(),
        });
        self.type_names.insert(name.to_owned(), id);
        id
    }

    /// Looks up a type by name, registering it if absent.
    ///
    /// # Panics
    /// Panics if the type exists with a different shape.
    pub fn lookup_or_new_type(&mut self, name: &str, nsub: usize, nname: usize, nhooks: usize) -> TypeId {
        if let Some(&id) = self.type_names.get(name) {
            let def = &self.types[id.index()];
            assert!(
                def.nsub == nsub && def.nname == nname && def.nhooks == nhooks,
                "node type [{name}] re-registered with a different shape"
            );
            id
        } else {
            self.new_type(name, nsub, nname, nhooks)
        }
    }

    /// Registers a new tag of an existing type.
    ///
    /// # Panics
    /// Panics if a tag with this name already exists.
    pub fn new_tag(&mut self, name: &str, typ: TypeId, flags: TagFlags) -> TagId {
        assert!(!self.tag_names.contains_key(name), "node tag [{name}] registered twice");
        let id = TagId::new(self.tags.len());
        self.tags.push(NodeTagDef {
            name: name.to_owned(),
            id,
            typ,
            flags,
        });
        self.tag_names.insert(name.to_owned(), id);
        id
    }

    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    #[must_use]
    pub fn lookup_tag(&self, name: &str) -> Option<TagId> {
        self.tag_names.get(name).copied()
    }

    /// # Panics
    /// Panics on an out-of-range id.
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> &NodeTypeDef {
        &self.types[id.index()]
    }

    #[must_use]
    pub fn tag_def(&self, id: TagId) -> &NodeTagDef {
        &self.tags[id.index()]
    }

    /// The type definition a tag belongs to.
    #[must_use]
    pub fn type_of_tag(&self, id: TagId) -> &NodeTypeDef {
        &self.types[self.tags[id.index()].typ.index()]
    }

    /// Tag name, for diagnostics and dumps.
    #[must_use]
    pub fn tag_name(&self, id: TagId) -> &str {
        &self.tags[id.index()].name
    }

    /// Mutable access to a type's compops table (registration time only).
    pub fn compops_mut(&mut self, id: TypeId) -> &mut OpTable<CompOpFn> {
        &mut self.types[id.index()].compops
    }

    /// Mutable access to a type's langops table (registration time only).
    pub fn langops_mut(&mut self, id: TypeId) -> &mut OpTable<LangOpFn> {
        &mut self.types[id.index()].langops
    }

    /// Number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of registered tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Dumps the registered types and tags, one per line.
    #[must_use]
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for ty in &self.types {
            let _ = writeln!(out, "type [{}] {}/{}/{}", ty.name, ty.nsub, ty.nname, ty.nhooks);
            for tag in self.tags.iter().filter(|t| t.typ == ty.id) {
                let _ = writeln!(out, "  tag [{}]", tag.name);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_and_tags_are_append_only() {
        let mut reg = NodeTypes::new();
        let cnode = reg.new_type("test:cnode", 2, 0, 0);
        let seq = reg.new_tag("TESTSEQ", cnode, TagFlags::INDENTED_PROC_LIST);
        let par = reg.new_tag("TESTPAR", cnode, TagFlags::INDENTED_PROC_LIST);

        assert_eq!(reg.lookup_type("test:cnode"), Some(cnode));
        assert_eq!(reg.lookup_tag("TESTSEQ"), Some(seq));
        assert_eq!(reg.tag_def(par).typ, cnode);
        assert_eq!(seq.index(), 0);
        assert_eq!(par.index(), 1);
    }

    #[test]
    fn test_lookup_or_new_is_idempotent() {
        let mut reg = NodeTypes::new();
        let a = reg.lookup_or_new_type("test:leaf", 0, 0, 0);
        let b = reg.lookup_or_new_type("test:leaf", 0, 0, 0);
        assert_eq!(a, b);
        assert_eq!(reg.type_count(), 1);
    }

    #[test]
    #[should_panic(expected = "different shape")]
    fn test_shape_conflict_panics() {
        let mut reg = NodeTypes::new();
        reg.lookup_or_new_type("test:leaf", 0, 0, 0);
        reg.lookup_or_new_type("test:leaf", 1, 0, 0);
    }
}
