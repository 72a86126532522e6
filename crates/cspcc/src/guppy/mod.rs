//! The Guppy front-end: node set, per-node operations, tokenizer, and a
//! compact module reader.
//!
//! Guppy is the grounding front-end for the shared middle-end: an
//! indentation-structured concurrent language with `seq`/`par` constructors,
//! channels, ALT choice, and functions with multiple results. Everything a
//! pass can dispatch on a Guppy node registers here; other front-ends plug
//! into the same surface with their own node sets.

pub mod alt;
pub mod cnode;
pub mod decls;
pub mod exprs;
pub mod io;
pub mod lexer;
pub mod lit;
pub mod parse;
pub mod types;

use crate::{
    compiler::Compiler,
    names::NameId,
    nodetype::{TagFlags, TagId},
    origin::Origin,
    passes::PassState,
    tree::{Hook, NodeId},
};

/// Source extensions this front-end claims.
pub const EXTENSIONS: &[&str] = &["gpp", "gpi"];

/// The complete Guppy tag bundle, filled in by [`register`].
#[derive(Debug, Clone, Copy)]
pub struct GuppyTags {
    // names
    pub rawname: TagId,
    pub ndecl: TagId,
    pub nparam: TagId,
    pub nfcndef: TagId,
    pub npfcndef: TagId,
    pub nrepl: TagId,
    // leaves
    pub skip: TagId,
    pub stop: TagId,
    // types
    pub int_type: TagId,
    pub bool_type: TagId,
    pub byte_type: TagId,
    pub real_type: TagId,
    pub string_type: TagId,
    pub timer_type: TagId,
    pub chan_type: TagId,
    // constructors
    pub seq: TagId,
    pub par: TagId,
    pub replseq: TagId,
    pub alt: TagId,
    pub prialt: TagId,
    pub guard: TagId,
    // actions
    pub assign: TagId,
    pub sassign: TagId,
    pub output: TagId,
    pub input: TagId,
    pub timerread: TagId,
    pub timerwait: TagId,
    // expressions
    pub add: TagId,
    pub sub: TagId,
    pub mul: TagId,
    pub div: TagId,
    pub rem: TagId,
    pub and_op: TagId,
    pub or_op: TagId,
    pub after: TagId,
    pub neg: TagId,
    pub not_op: TagId,
    // literals
    pub litint: TagId,
    pub litreal: TagId,
    pub litbool: TagId,
    pub litstr: TagId,
    // declarations and definitions
    pub vardecl: TagId,
    pub fparam: TagId,
    pub declblock: TagId,
    pub fcndef: TagId,
    pub pfcndef: TagId,
    pub instance: TagId,
    pub ppinstance: TagId,
    pub fvnode: TagId,
    pub fparaminit: TagId,
    pub ret: TagId,
    // lowered forms
    pub apicall: TagId,
    pub case_node: TagId,
    pub caseopt: TagId,
}

/// Formal-parameter attribute bits, stored in the FPARAM hook.
pub const FPARAM_RESULT: i64 = 0x1;
pub const FPARAM_VAR: i64 = 0x2;

/// Registers the Guppy node set and all its operations.
///
/// # Panics
/// Panics when the CCSP back-end has not been registered first (the
/// front-end's mapping operations build back-end nodes).
pub fn register(comp: &mut Compiler) {
    assert!(comp.cccsp.is_some(), "guppy registration needs the cccsp back-end");

    let t_rawname = comp.nodetypes.new_type("guppy:rawname", 0, 0, 1);
    let rawname = comp.nodetypes.new_tag("NAME", t_rawname, TagFlags::empty());

    let t_namenode = comp.nodetypes.new_type("guppy:namenode", 0, 1, 0);
    let ndecl = comp.nodetypes.new_tag("NDECL", t_namenode, TagFlags::empty());
    let nparam = comp.nodetypes.new_tag("NPARAM", t_namenode, TagFlags::empty());
    let nfcndef = comp.nodetypes.new_tag("NFCNDEF", t_namenode, TagFlags::empty());
    let npfcndef = comp.nodetypes.new_tag("NPFCNDEF", t_namenode, TagFlags::empty());
    let nrepl = comp.nodetypes.new_tag("NREPL", t_namenode, TagFlags::empty());

    let t_leaf = comp.nodetypes.new_type("guppy:leaf", 0, 0, 0);
    let skip = comp.nodetypes.new_tag("SKIP", t_leaf, TagFlags::empty());
    let stop = comp.nodetypes.new_tag("STOP", t_leaf, TagFlags::empty());

    let t_primtype = comp.nodetypes.new_type("guppy:primtype", 0, 0, 0);
    let int_type = comp.nodetypes.new_tag("INT", t_primtype, TagFlags::empty());
    let bool_type = comp.nodetypes.new_tag("BOOL", t_primtype, TagFlags::empty());
    let byte_type = comp.nodetypes.new_tag("BYTE", t_primtype, TagFlags::empty());
    let real_type = comp.nodetypes.new_tag("REAL", t_primtype, TagFlags::empty());
    let string_type = comp.nodetypes.new_tag("STRING", t_primtype, TagFlags::empty());
    let timer_type = comp.nodetypes.new_tag("TIMER", t_primtype, TagFlags::empty());

    let t_chantype = comp.nodetypes.new_type("guppy:chantype", 1, 0, 0);
    let chan_type = comp.nodetypes.new_tag("CHAN", t_chantype, TagFlags::SYNC_TYPE);

    let t_cnode = comp.nodetypes.new_type("guppy:cnode", 2, 0, 0);
    let seq = comp.nodetypes.new_tag("SEQ", t_cnode, TagFlags::INDENTED_PROC_LIST);
    let par = comp.nodetypes.new_tag("PAR", t_cnode, TagFlags::INDENTED_PROC_LIST);

    let t_replcnode = comp.nodetypes.new_type("guppy:replcnode", 4, 0, 0);
    let replseq = comp.nodetypes.new_tag("REPLSEQ", t_replcnode, TagFlags::INDENTED_PROC);

    let t_altnode = comp.nodetypes.new_type("guppy:altnode", 1, 0, 0);
    let alt = comp.nodetypes.new_tag("ALT", t_altnode, TagFlags::INDENTED_PROC_LIST);
    let prialt = comp.nodetypes.new_tag("PRIALT", t_altnode, TagFlags::INDENTED_PROC_LIST);

    let t_guard = comp.nodetypes.new_type("guppy:guardnode", 2, 0, 0);
    let guard = comp.nodetypes.new_tag("GUARD", t_guard, TagFlags::INDENTED_PROC);

    let t_action = comp.nodetypes.new_type("guppy:actionnode", 3, 0, 0);
    let assign = comp.nodetypes.new_tag("ASSIGN", t_action, TagFlags::empty());
    let sassign = comp.nodetypes.new_tag("SASSIGN", t_action, TagFlags::empty());
    let output = comp.nodetypes.new_tag("OUTPUT", t_action, TagFlags::empty());
    let input = comp.nodetypes.new_tag("INPUT", t_action, TagFlags::empty());
    let timerread = comp.nodetypes.new_tag("TIMERREAD", t_action, TagFlags::empty());
    let timerwait = comp.nodetypes.new_tag("TIMERWAIT", t_action, TagFlags::empty());

    let t_dop = comp.nodetypes.new_type("guppy:dopnode", 3, 0, 0);
    let add = comp.nodetypes.new_tag("ADD", t_dop, TagFlags::empty());
    let sub = comp.nodetypes.new_tag("SUB", t_dop, TagFlags::empty());
    let mul = comp.nodetypes.new_tag("MUL", t_dop, TagFlags::empty());
    let div = comp.nodetypes.new_tag("DIV", t_dop, TagFlags::empty());
    let rem = comp.nodetypes.new_tag("REM", t_dop, TagFlags::empty());
    let and_op = comp.nodetypes.new_tag("AND", t_dop, TagFlags::BOOL_OP);
    let or_op = comp.nodetypes.new_tag("OR", t_dop, TagFlags::BOOL_OP);
    let after = comp.nodetypes.new_tag("AFTER", t_dop, TagFlags::empty());

    let t_mop = comp.nodetypes.new_type("guppy:mopnode", 2, 0, 0);
    let neg = comp.nodetypes.new_tag("NEG", t_mop, TagFlags::empty());
    let not_op = comp.nodetypes.new_tag("NOT", t_mop, TagFlags::BOOL_OP);

    let t_lit = comp.nodetypes.new_type("guppy:litnode", 1, 0, 2);
    let litint = comp.nodetypes.new_tag("LITINT", t_lit, TagFlags::empty());
    let litreal = comp.nodetypes.new_tag("LITREAL", t_lit, TagFlags::empty());
    let litbool = comp.nodetypes.new_tag("LITBOOL", t_lit, TagFlags::empty());
    let litstr = comp.nodetypes.new_tag("LITSTR", t_lit, TagFlags::empty());

    let t_decl = comp.nodetypes.new_type("guppy:decl", 3, 0, 0);
    let vardecl = comp.nodetypes.new_tag("VARDECL", t_decl, TagFlags::empty());

    let t_fparam = comp.nodetypes.new_type("guppy:fparam", 2, 0, 1);
    let fparam = comp.nodetypes.new_tag("FPARAM", t_fparam, TagFlags::empty());

    let t_declblock = comp.nodetypes.new_type("guppy:declblock", 2, 0, 0);
    let declblock = comp.nodetypes.new_tag("DECLBLOCK", t_declblock, TagFlags::INDENTED_DECL_LIST);

    let t_fcndef = comp.nodetypes.new_type("guppy:fcndef", 4, 0, 1);
    let fcndef = comp.nodetypes.new_tag("FCNDEF", t_fcndef, TagFlags::INDENTED_PROC);
    let pfcndef = comp.nodetypes.new_tag("PFCNDEF", t_fcndef, TagFlags::INDENTED_PROC);

    let t_instance = comp.nodetypes.new_type("guppy:instance", 2, 0, 0);
    let instance = comp.nodetypes.new_tag("INSTANCE", t_instance, TagFlags::empty());

    let t_ppinstance = comp.nodetypes.new_type("guppy:ppinstance", 3, 0, 0);
    let ppinstance = comp.nodetypes.new_tag("PPINSTANCE", t_ppinstance, TagFlags::empty());

    let t_fvnode = comp.nodetypes.new_type("guppy:fvnode", 2, 0, 0);
    let fvnode = comp.nodetypes.new_tag("FVNODE", t_fvnode, TagFlags::empty());

    let t_fparaminit = comp.nodetypes.new_type("guppy:fparaminit", 2, 0, 0);
    let fparaminit = comp.nodetypes.new_tag("FPARAMINIT", t_fparaminit, TagFlags::empty());

    let t_ret = comp.nodetypes.new_type("guppy:return", 1, 0, 0);
    let ret = comp.nodetypes.new_tag("RETURN", t_ret, TagFlags::empty());

    let t_apicall = comp.nodetypes.new_type("guppy:apicall", 2, 0, 0);
    let apicall = comp.nodetypes.new_tag("APICALL", t_apicall, TagFlags::empty());

    let t_case = comp.nodetypes.new_type("guppy:casenode", 2, 0, 0);
    let case_node = comp.nodetypes.new_tag("CASE", t_case, TagFlags::empty());

    let t_caseopt = comp.nodetypes.new_type("guppy:caseopt", 2, 0, 0);
    let caseopt = comp.nodetypes.new_tag("CASEOPT", t_caseopt, TagFlags::INDENTED_PROC);

    comp.guppy = Some(GuppyTags {
        rawname,
        ndecl,
        nparam,
        nfcndef,
        npfcndef,
        nrepl,
        skip,
        stop,
        int_type,
        bool_type,
        byte_type,
        real_type,
        string_type,
        timer_type,
        chan_type,
        seq,
        par,
        replseq,
        alt,
        prialt,
        guard,
        assign,
        sassign,
        output,
        input,
        timerread,
        timerwait,
        add,
        sub,
        mul,
        div,
        rem,
        and_op,
        or_op,
        after,
        neg,
        not_op,
        litint,
        litreal,
        litbool,
        litstr,
        vardecl,
        fparam,
        declblock,
        fcndef,
        pfcndef,
        instance,
        ppinstance,
        fvnode,
        fparaminit,
        ret,
        apicall,
        case_node,
        caseopt,
    });

    types::register_ops(comp, t_primtype, t_chantype);
    lit::register_ops(comp, t_lit);
    exprs::register_ops(comp, t_dop, t_mop);
    decls::register_ops(
        comp,
        decls::DeclTypes {
            rawname: t_rawname,
            namenode: t_namenode,
            leaf: t_leaf,
            decl: t_decl,
            fparam: t_fparam,
            declblock: t_declblock,
            fcndef: t_fcndef,
            instance: t_instance,
            ppinstance: t_ppinstance,
            fvnode: t_fvnode,
            fparaminit: t_fparaminit,
            ret: t_ret,
        },
    );
    cnode::register_ops(comp, t_cnode, t_replcnode);
    io::register_ops(comp, t_action, t_apicall, t_case, t_caseopt);
    alt::register_ops(comp, t_altnode, t_guard);
}

/// Creates a primitive type node.
pub fn new_primtype(comp: &mut Compiler, tag: TagId, org: Origin) -> NodeId {
    comp.new_node(tag, org)
}

/// Creates a channel-of-`protocol` type node (`None` = ANY protocol).
pub fn new_chantype(comp: &mut Compiler, protocol: Option<NodeId>, org: Origin) -> NodeId {
    let gup = comp.gup();
    comp.create(gup.chan_type, org, &[protocol])
}

/// Declares a fresh name and its canonical name-reference node.
///
/// Returns the name id and the canonical namenode (the node stored on the
/// name; use sites receive copies of it).
pub fn declare_name(
    comp: &mut Compiler,
    ident: &str,
    namenode_tag: TagId,
    decl: Option<NodeId>,
    typ: Option<NodeId>,
    lexlevel: u32,
    org: Origin,
) -> (NameId, NodeId) {
    let id = comp.names.add_scope(ident, decl, typ, None, lexlevel);
    let nn = comp.new_node(namenode_tag, org);
    comp.set_name_slot(nn, 0, Some(id));
    comp.names.get_mut(id).namenode = Some(nn);
    (id, nn)
}

/// A fresh use-site reference to a declared name.
pub fn name_ref(comp: &mut Compiler, id: NameId, org: Origin) -> NodeId {
    let canonical = comp.names.get(id).namenode.expect("declared name has a namenode");
    let tag = comp.tree.tag(canonical);
    let nn = comp.new_node(tag, org);
    comp.set_name_slot(nn, 0, Some(id));
    comp.names.add_ref(id);
    nn
}

/// Allocates a temporary: declares a fresh `NDECL` name of the given type,
/// appends a `VARDECL` to the pass's declaration list, and returns a
/// use-site reference.
///
/// # Panics
/// Panics when the pass state carries no declaration list (the enclosing
/// definition's transform establishes it).
pub fn make_temp(comp: &mut Compiler, decl_list: Option<NodeId>, typ: NodeId, org: Origin) -> NodeId {
    let gup = comp.gup();
    let decl_list = decl_list.expect("temporary requested outside a declaration context");
    let ident = comp.names.temp_ident("tmp");
    let decl = comp.create(gup.vardecl, org, &[None, Some(typ), None]);
    let (id, nn) = declare_name(comp, &ident, gup.ndecl, Some(decl), Some(typ), 0, org);
    comp.set_sub(decl, 0, Some(nn));
    comp.list_add(decl_list, decl);
    name_ref(comp, id, org)
}

/// Reads the attribute bits of an FPARAM node: `(is_result, is_var)`.
#[must_use]
pub fn fparam_attrs(comp: &Compiler, fparam: NodeId) -> (bool, bool) {
    match comp.hook(fparam, 0) {
        Some(Hook::Const(data)) => {
            let bits = data.int_val();
            (bits & FPARAM_RESULT != 0, bits & FPARAM_VAR != 0)
        }
        _ => (false, false),
    }
}

/// Creates an FPARAM node for a parameter namenode.
pub fn new_fparam(comp: &mut Compiler, nn: NodeId, typ: NodeId, attrs: i64) -> NodeId {
    let gup = comp.gup();
    let node = comp.create_from(gup.fparam, nn, &[Some(nn), Some(typ)]);
    comp.set_hook(node, 0, Some(Hook::Const(crate::constants::ConstData::Int(attrs))));
    node
}

/// Creates an API-call node invoking a runtime primitive with `args`.
pub fn new_apicall(comp: &mut Compiler, call: crate::backend::cccsp::ApiCall, args: Vec<NodeId>, org: Origin) -> NodeId {
    let gup = comp.gup();
    let callname = crate::backend::cccsp::create_apicallname(comp, call);
    let arglist = comp.new_list(org);
    for arg in args {
        comp.list_add(arglist, arg);
    }
    comp.create(gup.apicall, org, &[Some(callname), Some(arglist)])
}

/// Frees a node shell after its children have been moved elsewhere.
pub fn free_shell(comp: &mut Compiler, node: NodeId) {
    let nsubs = comp.tree.node(node).subs.len();
    for i in 0..nsubs {
        comp.set_sub(node, i, None);
    }
    comp.free_tree(node);
}

/// Dispatches a compop on a child slot of a node, writing back any
/// replacement.
pub fn subtree_op(
    comp: &mut Compiler,
    state: &mut PassState,
    parent: NodeId,
    slot_idx: usize,
    walk: fn(&mut Compiler, &mut PassState, &mut NodeId),
) {
    if let Some(mut child) = comp.sub(parent, slot_idx) {
        walk(comp, state, &mut child);
        comp.set_sub(parent, slot_idx, Some(child));
    }
}
