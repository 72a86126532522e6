//! Declarations, definitions, and name references: the scoping and mapping
//! heart of the front-end.
//!
//! Raw names resolve here; declaration blocks scope-then-descope their
//! bindings; function definitions thread every pass (scoping, result
//! lowering, mapping, call-graph recording, reallocation, emission).

use crate::{
    backend::{
        alloc::{self, word_ceil},
        cccsp::{self, ApiCall},
        codegen::codegen_subtree,
        map,
    },
    chook::Chook,
    compiler::Compiler,
    names::LookupError,
    nodetype::TypeId,
    ops::{CompOp, LangOp, LangReq},
    origin::OpOrigin,
    passes::{self, PassState, scope},
    tree::{FcnDefInfo, Hook, NodeId},
};

use super::{FPARAM_RESULT, FPARAM_VAR, fparam_attrs, name_ref};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:decls");

/// Type ids this module registers operations on.
#[derive(Debug, Clone, Copy)]
pub struct DeclTypes {
    pub rawname: TypeId,
    pub namenode: TypeId,
    pub leaf: TypeId,
    pub decl: TypeId,
    pub fparam: TypeId,
    pub declblock: TypeId,
    pub fcndef: TypeId,
    pub instance: TypeId,
    pub ppinstance: TypeId,
    pub fvnode: TypeId,
    pub fparaminit: TypeId,
    pub ret: TypeId,
}

pub(super) fn register_ops(comp: &mut Compiler, t: DeclTypes) {
    comp.set_compop(t.rawname, CompOp::ScopeIn, scopein_rawname, ORIGIN);
    comp.set_langop(t.rawname, LangOp::GetName, getname_rawname, ORIGIN);

    comp.set_langop(t.namenode, LangOp::GetName, getname_namenode, ORIGIN);
    comp.set_langop(t.namenode, LangOp::GetType, gettype_namenode, ORIGIN);
    comp.set_langop(t.namenode, LangOp::IsVar, isvar_namenode, ORIGIN);
    comp.set_langop(t.namenode, LangOp::DoUsagecheck, usagecheck_namenode, ORIGIN);
    comp.set_compop(t.namenode, CompOp::Fetrans15, fetrans15_value, ORIGIN);
    comp.set_compop(t.namenode, CompOp::Codegen, codegen_namenode, ORIGIN);

    comp.set_compop(t.leaf, CompOp::Codegen, codegen_leaf, ORIGIN);
    comp.set_compop(t.leaf, CompOp::Dcg, dcg_leaf, ORIGIN);

    comp.set_compop(t.decl, CompOp::ScopeIn, scopein_vardecl, ORIGIN);
    comp.set_compop(t.decl, CompOp::Fetrans15, fetrans15_no_descend, ORIGIN);
    comp.set_compop(t.decl, CompOp::Namemap, namemap_vardecl, ORIGIN);
    comp.set_compop(t.decl, CompOp::Codegen, codegen_vardecl, ORIGIN);

    comp.set_langop(t.fparam, LangOp::GetType, gettype_fparam, ORIGIN);
    comp.set_compop(t.fparam, CompOp::Fetrans15, fetrans15_no_descend, ORIGIN);

    comp.set_compop(t.declblock, CompOp::ScopeIn, scopein_declblock, ORIGIN);
    comp.set_compop(t.declblock, CompOp::Autoseq, autoseq_declblock, ORIGIN);
    comp.set_compop(t.declblock, CompOp::Fetrans15, fetrans15_declblock, ORIGIN);
    comp.set_compop(t.declblock, CompOp::Betrans, betrans_declblock, ORIGIN);
    comp.set_compop(t.declblock, CompOp::Lpreallocate, lprealloc_declblock, ORIGIN);
    comp.set_compop(t.declblock, CompOp::Codegen, codegen_declblock, ORIGIN);

    comp.set_compop(t.fcndef, CompOp::Prescope, prescope_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::ScopeIn, scopein_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Declify, declify_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Autoseq, autoseq_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Fetrans, fetrans_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Fetrans1, fetrans1_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Fetrans15, fetrans15_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Fetrans3, fetrans3_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Namemap, namemap_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Lpreallocate, lprealloc_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Dcg, dcg_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Reallocate, reallocate_fcndef, ORIGIN);
    comp.set_compop(t.fcndef, CompOp::Codegen, codegen_fcndef, ORIGIN);
    comp.set_langop(t.fcndef, LangOp::GetName, getname_fcndef, ORIGIN);
    comp.set_langop(t.fcndef, LangOp::GuessTlp, guesstlp_fcndef, ORIGIN);

    comp.set_compop(t.instance, CompOp::Typecheck, typecheck_instance, ORIGIN);
    comp.set_compop(t.instance, CompOp::Fetrans15, fetrans15_no_descend, ORIGIN);
    comp.set_compop(t.instance, CompOp::Dcg, dcg_instance, ORIGIN);
    comp.set_compop(t.instance, CompOp::Codegen, codegen_instance, ORIGIN);

    comp.set_compop(t.ppinstance, CompOp::Fetrans15, fetrans15_no_descend, ORIGIN);
    comp.set_compop(t.ppinstance, CompOp::Dcg, dcg_ppinstance, ORIGIN);

    comp.set_compop(t.fvnode, CompOp::Fetrans, fetrans_orphan_fvnode, ORIGIN);

    comp.set_compop(t.fparaminit, CompOp::Codegen, codegen_fparaminit, ORIGIN);

    comp.set_compop(t.ret, CompOp::Fetrans1, fetrans1_return, ORIGIN);
    comp.set_compop(t.ret, CompOp::Codegen, codegen_return, ORIGIN);
}

// ==========================
// raw names and name references

fn rawname_ident(comp: &Compiler, node: NodeId) -> String {
    match comp.hook(node, 0) {
        Some(Hook::Text(ident)) => ident.clone(),
        _ => panic!("raw name node without an identifier hook"),
    }
}

/// Resolves a raw name: looks the identifier up (namespace-aware),
/// substitutes the binding's name reference, and records PAR captures.
fn scopein_rawname(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let ident = rawname_ident(comp, node);
    let ss = state.scope();
    let visible: Vec<_> = ss.visible_ns.clone();
    let current_level = ss.lexlevel;

    let name_id = match comp.names.lookup_scoped(&ident, &visible) {
        Ok(id) => id,
        Err(LookupError::NamespaceNotVisible(ns)) => {
            comp.error_at(node, format!("namespace [{ns}] is not visible"));
            return false;
        }
        Err(LookupError::NotFound) => {
            comp.error_at(node, format!("[{ident}] is not declared"));
            return false;
        }
    };

    let org = comp.tree.origin(node);
    let nn = name_ref(comp, name_id, org);
    let name_level = comp.names.get(name_id).lexlevel;
    if name_level < current_level {
        scope::record_capture(comp, state.scope(), nn, name_level);
    }
    comp.promote_chooks(node, nn);
    comp.free_tree(node);
    *slot = nn;
    false
}

fn getname_rawname(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetName { result } = req {
        *result = Some(rawname_ident(comp, node));
        true
    } else {
        false
    }
}

fn getname_namenode(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::GetName { result } = req else { return false };
    let id = comp.name_expect(node, 0);
    *result = Some(comp.names.ident(id).to_owned());
    true
}

fn gettype_namenode(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::GetType { result, .. } = req else { return false };
    let id = comp.name_expect(node, 0);
    *result = comp.names.get(id).typ;
    true
}

fn isvar_namenode(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::IsVar { result } = req else { return false };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    *result = tag == gup.ndecl || tag == gup.nparam || tag == gup.nrepl;
    true
}

fn usagecheck_namenode(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::DoUsagecheck { reads, .. } = req else { return false };
    reads.push(comp.name_expect(node, 0));
    true
}

/// A value where a process is expected: warn and substitute `skip`.
///
/// This covers results dropped from instances and stray value expressions;
/// it never hardens into an error and never reaches code generation.
pub(super) fn fetrans15_value(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    if !state.fetrans15().expt_proc {
        return false;
    }
    let node = *slot;
    comp.warn_at(node, "result lost from instance".to_owned());
    let gup = comp.gup();
    let skip = comp.create_from(gup.skip, node, &[]);
    comp.promote_chooks(node, skip);
    comp.free_tree(node);
    *slot = skip;
    false
}

/// Declarative structure carries no process expectation below it.
pub(super) fn fetrans15_no_descend(_comp: &mut Compiler, _state: &mut PassState, _slot: &mut NodeId) -> bool {
    false
}

/// Only a definition's body is a process position.
fn fetrans15_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    super::subtree_op(comp, state, *slot, 2, |c, s, body| {
        passes::compop_walk(c, s, body, CompOp::Fetrans15);
    });
    false
}

/// Only a declaration block's body is a process position.
fn fetrans15_declblock(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    super::subtree_op(comp, state, *slot, 1, |c, s, body| {
        passes::compop_walk(c, s, body, CompOp::Fetrans15);
    });
    false
}

/// Walks an expression's children with a value expected.
pub(super) fn fetrans15_expr_children(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let saved = state.fetrans15().expt_proc;
    state.fetrans15().expt_proc = false;
    comp.for_each_child_slot(*slot, &mut |c, child| {
        passes::compop_walk(c, state, child, CompOp::Fetrans15);
    });
    state.fetrans15().expt_proc = saved;
    false
}

fn codegen_namenode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let id = comp.name_expect(node, 0);
    let ident = comp.names.ident(id).to_owned();
    let indir = map::indir_of(comp, node);
    let def_level = match comp.names.get(id).typ {
        Some(t) => comp.def_pointer_level(t),
        None => 0,
    };
    if indir > def_level {
        let stars = "*".repeat((indir - def_level) as usize);
        state.codegen().write(&format!("({stars}{ident})"));
    } else {
        state.codegen().write(&ident);
    }
    false
}

// ==========================
// leaves

fn codegen_leaf(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let gup = comp.gup();
    if comp.tree.tag(*slot) == gup.stop {
        state.codegen().line("StopProc (wptr);");
    } else {
        state.codegen().comment("skip");
    }
    false
}

fn dcg_leaf(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let gup = comp.gup();
    if comp.tree.tag(*slot) == gup.stop
        && let Some(fcn) = state.dcg().thisfcn.clone()
    {
        let entry = comp.sfi.lookup_or_new(&fcn);
        entry.framesize = entry.framesize.max(ApiCall::StopProc.stack_words() * 4);
    }
    true
}

// ==========================
// variable declarations

/// Declares a variable into the enclosing scope: the type and initialiser
/// resolve first, then the name binds for the remaining siblings. The
/// enclosing block's mark descopes it.
fn scopein_vardecl(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(comp.sub_expect(node, 0)) != gup.rawname {
        // already bound (a block re-scoping its declarations)
        return false;
    }
    super::subtree_op(comp, state, node, 1, scope::scope_subtree);
    super::subtree_op(comp, state, node, 2, scope::scope_subtree);

    let lexlevel = state.scope().lexlevel;
    let raw = comp.sub_expect(node, 0);
    let ident = rawname_ident(comp, raw);
    let typ = comp.sub(node, 1);
    let org = comp.tree.origin(raw);
    let (_, nn) = super::declare_name(comp, &ident, gup.ndecl, Some(node), typ, lexlevel, org);
    comp.free_tree(raw);
    comp.set_sub(node, 0, Some(nn));
    false
}

fn namemap_vardecl(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let nn = comp.sub_expect(node, 0);
    // parameters unpacked into block statics were mapped by the definition
    if map::backend_name_of(comp, nn).is_some() {
        return true;
    }
    // locals carry concrete storage
    map::create_ename(comp, nn, 0);
    true
}

fn codegen_vardecl(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let nn = comp.sub_expect(node, 0);
    let id = comp.name_expect(nn, 0);
    let ident = comp.names.ident(id).to_owned();
    let typ = comp.sub(node, 1);
    let ctype = typ.and_then(|t| comp.ctype_of(t)).unwrap_or_else(|| "int".to_owned());
    let stars = "*".repeat(map::indir_of(comp, nn).max(0) as usize);
    state.codegen().write(&format!("{ctype} {stars}{ident}"));
    let init = comp.sub(node, 2).or_else(|| {
        map::backend_name_of(comp, nn).and_then(|be| comp.sub(be, 1))
    });
    if let Some(init) = init {
        state.codegen().write(" = ");
        codegen_subtree(comp, state, init);
    }
    state.codegen().write(";");
    state.codegen().end_line();
    false
}

fn gettype_fparam(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetType { result, .. } = req {
        *result = comp.sub(node, 1);
        true
    } else {
        false
    }
}

// ==========================
// declaration blocks

/// Scopes a declaration block: declaration types and initialisers resolve
/// in the outer scope, the names bind, the body resolves, and the mark is
/// descoped on the way out.
fn scopein_declblock(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let mark = comp.names.mark_scope();
    let lexlevel = state.scope().lexlevel;

    let decls = comp.sub_expect(node, 0);
    for decl in comp.list_items(decls) {
        let raw = comp.sub_expect(decl, 0);
        if comp.tree.tag(raw) != gup.rawname {
            // already bound
            continue;
        }
        // resolve the type and any initialiser before the name binds
        super::subtree_op(comp, state, decl, 1, scope::scope_subtree);
        super::subtree_op(comp, state, decl, 2, scope::scope_subtree);

        let ident = rawname_ident(comp, raw);
        let typ = comp.sub(decl, 1);
        let org = comp.tree.origin(raw);
        let (_, nn) = super::declare_name(comp, &ident, gup.ndecl, Some(decl), typ, lexlevel, org);
        comp.free_tree(raw);
        comp.set_sub(decl, 0, Some(nn));
    }

    super::subtree_op(comp, state, node, 1, scope::scope_subtree);
    comp.names.mark_descope(mark);
    false
}

/// A list body under a declaration block becomes a `seq`.
fn autoseq_declblock(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if let Some(body) = comp.sub(node, 1)
        && comp.is_list(body)
    {
        let seq = comp.create_from(gup.seq, body, &[None, Some(body)]);
        comp.set_sub(node, 1, Some(seq));
    }
    true
}

/// Synthesises initialiser/finaliser calls for declarations whose types
/// need them, sequencing them around the body.
fn betrans_declblock(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let decls = comp.sub_expect(node, 0);
    let mut inits = Vec::new();
    let mut frees = Vec::new();
    for decl in comp.list_items(decls) {
        if comp.tree.tag(decl) != gup.vardecl {
            continue;
        }
        let Some(typ) = comp.sub(decl, 1) else { continue };
        let nn = comp.sub_expect(decl, 0);
        let id = comp.name_expect(nn, 0);
        let org = comp.tree.origin(decl);
        let var_for_init = name_ref(comp, id, org);
        if let Some(call) = comp.init_call(typ, var_for_init) {
            inits.push(call);
        } else {
            comp.free_tree(var_for_init);
        }
        let var_for_free = name_ref(comp, id, org);
        if let Some(call) = comp.free_call(typ, var_for_free) {
            frees.push(call);
        } else {
            comp.free_tree(var_for_free);
        }
    }
    if inits.is_empty() && frees.is_empty() {
        return true;
    }
    let body = comp.sub_expect(node, 1);
    let org = comp.tree.origin(body);
    let list = comp.new_list(org);
    for call in inits {
        comp.list_add(list, call);
    }
    comp.list_add(list, body);
    for call in frees {
        comp.list_add(list, call);
    }
    let seq = comp.create(gup.seq, org, &[None, Some(list)]);
    comp.set_sub(node, 1, Some(seq));
    true
}

/// Declarations contribute their byte sizes to the enclosing collect.
/// Workspace reservations in PAR blocks are spawned storage, not frame
/// storage, and don't count here.
fn lprealloc_declblock(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let decls = comp.sub_expect(node, 0);
    let mut bytes = 0i64;
    for decl in comp.list_items(decls) {
        if comp.tree.tag(decl) != gup.vardecl {
            continue;
        }
        if let Some(typ) = comp.sub(decl, 1) {
            bytes += comp.bytes_for(typ).unwrap_or(4);
        }
    }
    state.preallocate().collect += bytes;
    true
}

fn codegen_declblock(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let ws_tag = comp.ccsp().workspace;
    state.codegen().open_block();
    let decls = comp.sub_expect(node, 0);
    for decl in comp.list_items(decls) {
        if comp.tree.tag(decl) == ws_tag {
            let wsname = crate::backend::cccsp::workspace_cname(comp, decl);
            state.codegen().line(&format!("Workspace {wsname};"));
        } else {
            codegen_subtree(comp, state, decl);
        }
    }
    if let Some(body) = comp.sub(node, 1) {
        codegen_subtree(comp, state, body);
    }
    state.codegen().close_block();
    false
}

// ==========================
// function definitions

fn fcninfo_of(comp: &Compiler, node: NodeId) -> FcnDefInfo {
    match comp.hook(node, 0) {
        Some(Hook::FcnInfo(info)) => *info,
        _ => FcnDefInfo::default(),
    }
}

fn fcn_ident(comp: &Compiler, node: NodeId) -> String {
    let nn = comp.sub_expect(node, 0);
    let id = comp.name_expect(nn, 0);
    comp.names.ident(id).to_owned()
}

fn fcn_entryname(comp: &Compiler, node: NodeId) -> String {
    match comp.chook(node, comp.core_chooks.sfi_entry) {
        Some(Chook::SfiEntry(name)) => name.clone(),
        _ => {
            let info = fcninfo_of(comp, node);
            cccsp::make_entryname(&fcn_ident(comp, node), info.is_par)
        }
    }
}

/// Normalises shape and attaches the definition metadata hook.
fn prescope_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    comp.ensure_list_in_slot(node, 1);
    comp.ensure_list_in_slot(node, 3);
    let lexlevel = state.prescope().lexlevel;
    let is_par = comp.tree.tag(node) == gup.pfcndef;
    comp.set_hook(
        node,
        0,
        Some(Hook::FcnInfo(FcnDefInfo {
            lexlevel,
            is_public: lexlevel == 0,
            is_toplevel: lexlevel == 0,
            is_par,
        })),
    );
    state.prescope().lexlevel += 1;
    comp.for_each_child_slot(node, &mut |c, child| {
        passes::compop_walk(c, state, child, CompOp::Prescope);
    });
    state.prescope().lexlevel -= 1;
    false
}

/// Scopes a definition: the function name binds in the enclosing scope
/// (before the body, so later definitions and the body itself can call it);
/// parameters bind one lexical level down, for the body only.
fn scopein_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let is_par = comp.tree.tag(node) == gup.pfcndef;
    let nn_tag = if is_par { gup.npfcndef } else { gup.nfcndef };
    let outer_level = state.scope().lexlevel;

    let raw = comp.sub_expect(node, 0);
    let ident = rawname_ident(comp, raw);
    let params = comp.sub_expect(node, 1);
    let org = comp.tree.origin(raw);
    let (_, nn) = super::declare_name(comp, &ident, nn_tag, Some(node), Some(params), outer_level, org);
    comp.free_tree(raw);
    comp.set_sub(node, 0, Some(nn));

    let mark = comp.names.mark_scope();
    state.scope().lexlevel = outer_level + 1;

    for param in comp.list_items(params) {
        super::subtree_op(comp, state, param, 1, scope::scope_subtree);
        let raw = comp.sub_expect(param, 0);
        let ident = rawname_ident(comp, raw);
        let typ = comp.sub(param, 1);
        let org = comp.tree.origin(raw);
        let (_, pnn) = super::declare_name(comp, &ident, gup.nparam, Some(param), typ, outer_level + 1, org);
        comp.free_tree(raw);
        comp.set_sub(param, 0, Some(pnn));
    }
    // result types resolve in the outer scope but carry no names
    super::subtree_op(comp, state, node, 3, scope::scope_subtree);
    super::subtree_op(comp, state, node, 2, scope::scope_subtree);

    comp.names.mark_descope(mark);
    state.scope().lexlevel = outer_level;
    false
}

/// A definition body that is still a raw list gets its declarations
/// nested into blocks.
fn declify_fcndef(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let body = comp.sub_expect(node, 2);
    if comp.is_list(body) {
        let items = comp.list_items(body);
        let new_items = super::cnode::declify_items(comp, items);
        if let Some(Hook::List(stored)) = comp.hook_mut(body, 0) {
            *stored = new_items;
        }
    }
    true
}

/// A list body under a definition becomes a `seq`.
fn autoseq_fcndef(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if let Some(body) = comp.sub(node, 2)
        && comp.is_list(body)
    {
        let seq = comp.create_from(gup.seq, body, &[None, Some(body)]);
        comp.set_sub(node, 2, Some(seq));
    }
    true
}

/// Creates the proc-abstraction wrapper for public/top-level definitions.
fn fetrans_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let info = fcninfo_of(comp, node);
    if comp.tree.tag(node) != gup.fcndef || !(info.is_public || info.is_toplevel) {
        return true;
    }
    // results make this a function, wrapped only after fetrans1 lowers them
    if comp.list_count(comp.sub_expect(node, 3)) > 0 {
        return true;
    }

    let org = comp.tree.origin(node);
    let ident = fcn_ident(comp, node);
    let wrapper_ident = format!("{ident}$wrapper");
    if comp.names.lookup(&wrapper_ident).is_some() {
        return true;
    }

    // wrapper params mirror the original's
    let params = comp.sub_expect(node, 1);
    let wparams = comp.new_list(org);
    let mut wargs = Vec::new();
    for param in comp.list_items(params) {
        let typ = comp.sub_expect(param, 1);
        let wtyp = comp.copy_tree(typ);
        let pident = {
            let pnn = comp.sub_expect(param, 0);
            let id = comp.name_expect(pnn, 0);
            comp.names.ident(id).to_owned()
        };
        let (pid, pnn) = super::declare_name(comp, &pident, gup.nparam, None, Some(wtyp), 1, org);
        let (is_result, is_var) = fparam_attrs(comp, param);
        let mut attrs = 0;
        if is_result {
            attrs |= FPARAM_RESULT;
        }
        if is_var {
            attrs |= FPARAM_VAR;
        }
        let wparam = super::new_fparam(comp, pnn, wtyp, attrs);
        comp.set_sub(wparam, 0, Some(pnn));
        comp.list_add(wparams, wparam);
        wargs.push(pid);
    }

    let fn_id = {
        let fn_nn = comp.sub_expect(node, 0);
        comp.name_expect(fn_nn, 0)
    };
    let call_args = comp.new_list(org);
    let fn_ref = name_ref(comp, fn_id, org);
    for pid in wargs {
        let arg = name_ref(comp, pid, org);
        comp.list_add(call_args, arg);
    }
    let body = comp.create(gup.instance, org, &[Some(fn_ref), Some(call_args)]);

    let results = comp.new_list(org);
    let (_, wnn) = super::declare_name(comp, &wrapper_ident, gup.npfcndef, None, Some(wparams), 0, org);
    let wrapper = comp.create(gup.pfcndef, org, &[Some(wnn), Some(wparams), Some(body), Some(results)]);
    comp.set_hook(
        wrapper,
        0,
        Some(Hook::FcnInfo(FcnDefInfo {
            lexlevel: 0,
            is_public: false,
            is_toplevel: false,
            is_par: true,
        })),
    );
    if let Some(id) = comp.name_slot(wnn, 0) {
        comp.names.get_mut(id).decl = Some(wrapper);
    }
    state.fetrans().new_defs.push(wrapper);
    true
}

/// Lowers result types into trailing result parameters and establishes the
/// declaration insert point for temporaries.
fn fetrans1_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let saved_decls = state.fetrans1().decl_list.take();
    let saved_results = std::mem::take(&mut state.fetrans1().result_params);

    let results = comp.sub_expect(node, 3);
    let result_types = comp.list_items(results);
    if !result_types.is_empty() {
        let params = comp.sub_expect(node, 1);
        if let Some(Hook::List(items)) = comp.hook_mut(results, 0) {
            items.clear();
        }
        for typ in result_types {
            let org = comp.tree.origin(typ);
            let ident = comp.names.temp_ident("res");
            let (id, pnn) = super::declare_name(comp, &ident, gup.nparam, None, Some(typ), 1, org);
            let fp = super::new_fparam(comp, pnn, typ, FPARAM_RESULT);
            comp.list_add(params, fp);
            let use_ref = name_ref(comp, id, org);
            state.fetrans1().result_params.push(use_ref);
        }
    }

    // the body's declaration block is the insert point for temporaries
    let body = comp.sub_expect(node, 2);
    let body = if comp.tree.tag(body) == gup.declblock {
        body
    } else {
        let org = comp.tree.origin(body);
        let decls = comp.new_list(org);
        let block = comp.create(gup.declblock, org, &[Some(decls), Some(body)]);
        comp.set_sub(node, 2, Some(block));
        block
    };
    state.fetrans1().decl_list = Some(comp.sub_expect(body, 0));

    super::subtree_op(comp, state, node, 2, |c, s, slot| {
        passes::compop_walk(c, s, slot, CompOp::Fetrans1);
    });

    for nn in std::mem::replace(&mut state.fetrans1().result_params, saved_results) {
        comp.free_tree(nn);
    }
    state.fetrans1().decl_list = saved_decls;
    false
}

/// Establishes the declaration insert point for ALT selection variables.
fn fetrans3_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let saved = state.fetrans3().decl_list.take();
    let body = comp.sub_expect(node, 2);
    if comp.tree.tag(body) == gup.declblock {
        state.fetrans3().decl_list = Some(comp.sub_expect(body, 0));
    }
    super::subtree_op(comp, state, node, 2, |c, s, slot| {
        passes::compop_walk(c, s, slot, CompOp::Fetrans3);
    });
    state.fetrans3().decl_list = saved;
    false
}

/// Maps a definition: entry name, SFI entry, parameter carriers, the
/// workspace-pointer parameter at slot 0, and the back-end body block.
fn namemap_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let info = fcninfo_of(comp, node);
    let is_par = comp.tree.tag(node) == gup.pfcndef;
    let ident = fcn_ident(comp, node);
    let entryname = cccsp::make_entryname(&ident, is_par);
    comp.set_chook(node, comp.core_chooks.sfi_entry, Chook::SfiEntry(entryname.clone()));
    let entry = comp.sfi.lookup_or_new(&entryname);
    entry.proc_abstracted = is_par;

    // wrap the body in a back-end block carrying the statics
    let body = comp.sub_expect(node, 2);
    let beblk = cccsp::create_backend_block(comp, body, info.lexlevel);
    comp.set_sub(node, 2, Some(beblk));
    let statics = comp.sub_expect(beblk, 0);

    let params = comp.sub_expect(node, 1);
    state.namemap().inparamlist = true;
    for (index, param) in comp.list_items(params).into_iter().enumerate() {
        if comp.tree.tag(param) != gup.fparam {
            continue;
        }
        let pnn = comp.sub_expect(param, 0);
        let (is_result, is_var) = fparam_attrs(comp, param);
        let typ = comp.sub(param, 1);
        let base = typ.map_or(0, |t| comp.def_pointer_level(t));
        let extra = i32::from(is_result || is_var);
        let bename = map::create_ename(comp, pnn, base + extra);
        if is_par {
            // process-abstracted parameters unpack out of the workspace at
            // entry: a local declaration initialised from GetProcParam
            let org = comp.tree.origin(param);
            let idx = super::lit::new_litint(comp, org, index as i64);
            let nn_ref = comp.copy_tree(pnn);
            let init = comp.create(gup.fparaminit, org, &[Some(nn_ref), Some(idx)]);
            cccsp::set_initialiser(comp, bename, init);
            let decl_nn = comp.copy_tree(pnn);
            let decl_typ = typ.map(|t| comp.copy_tree(t));
            let decl = comp.create(gup.vardecl, org, &[Some(decl_nn), decl_typ, None]);
            comp.list_add(statics, decl);
        }
    }
    state.namemap().inparamlist = false;

    // the workspace pointer becomes parameter 0
    let org = comp.tree.origin(node);
    let wptr = cccsp::create_wptr(comp, org);
    comp.list_insert_at(params, 0, wptr);
    state.namemap().process_id = Some(wptr);

    super::subtree_op(comp, state, node, 2, |c, s, slot| {
        passes::compop_walk(c, s, slot, CompOp::Namemap);
    });
    state.namemap().process_id = None;
    false
}

/// Collects this definition's own frame demand: declared locals plus a
/// fixed call overhead, merged with any gcc-seeded figure.
fn lprealloc_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let saved = state.preallocate().collect;
    state.preallocate().collect = 0;
    if let Some(body) = comp.sub(node, 2) {
        alloc::preallocate_subtree(comp, state, body);
    }
    let collect = state.preallocate().collect;
    state.preallocate().collect = saved;

    let entryname = fcn_entryname(comp, node);
    let entry = comp.sfi.lookup_or_new(&entryname);
    entry.framesize = entry.framesize.max(16 + collect);
    false
}

/// Records call edges under this definition's SFI entry.
fn dcg_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let entryname = fcn_entryname(comp, node);
    let saved = state.dcg().thisfcn.replace(entryname);
    if let Some(body) = comp.sub(node, 2) {
        alloc::dcg_subtree(comp, state, body);
    }
    state.dcg().thisfcn = saved;
    false
}

/// Sizes the definition's block storage from the closed allocsize, adding
/// the PAR workspace tally.
fn reallocate_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let saved_maxpar = state.reallocate().maxpar;
    state.reallocate().maxpar = 0;

    super::subtree_op(comp, state, node, 2, |c, s, slot| {
        alloc::reallocate_subtree(c, s, slot);
    });

    let maxpar = state.reallocate().maxpar;
    state.reallocate().maxpar = saved_maxpar;

    let entryname = fcn_entryname(comp, node);
    let (framesize, allocsize) = match comp.sfi.get(&entryname) {
        Some(entry) => (entry.framesize, entry.allocsize),
        None => (0, 0),
    };
    let body = comp.sub_expect(node, 2);
    if comp.tree.tag(body) == comp.ccsp().backend_block {
        let my_size = word_ceil(framesize);
        let nest_size = (word_ceil(allocsize) - word_ceil(framesize)).max(0) + maxpar;
        cccsp::set_blockspace(comp, body, my_size, nest_size);
    } else {
        let tag = comp.tag_name_of(body).to_owned();
        comp.error_at(node, format!("definition body is not a back-end block, found [{tag}]"));
        state.reallocate().error += 1;
    }
    false
}

fn codegen_fcndef(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let is_par = comp.tree.tag(node) == gup.pfcndef;
    let info = fcninfo_of(comp, node);
    let entryname = fcn_entryname(comp, node);

    // signature: process-abstracted entries take only the workspace
    let mut sig = format!("void {entryname} (Workspace wptr");
    let params = comp.sub_expect(node, 1);
    if !is_par {
        for param in comp.list_items(params) {
            if comp.tree.tag(param) != gup.fparam {
                continue;
            }
            let pnn = comp.sub_expect(param, 0);
            let id = comp.name_expect(pnn, 0);
            let ident = comp.names.ident(id).to_owned();
            let typ = comp.sub(param, 1);
            let ctype = typ.and_then(|t| comp.ctype_of(t)).unwrap_or_else(|| "int".to_owned());
            let def_level = typ.map_or(0, |t| comp.def_pointer_level(t));
            let indir = map::indir_of(comp, pnn);
            let stars = "*".repeat(indir.max(def_level) as usize);
            sig.push_str(&format!(", {ctype} {stars}{ident}"));
        }
    }
    sig.push(')');

    state.codegen().line("");
    let body = comp.sub_expect(node, 2);
    let (my_size, nest_size) = if comp.tree.tag(body) == comp.ccsp().backend_block {
        cccsp::get_blockspace(comp, body)
    } else {
        (0, 0)
    };
    state.codegen().set_ws_size(my_size, nest_size);
    state.codegen().line(&sig);
    state.codegen().proc_external(&entryname);
    codegen_subtree(comp, state, body);

    if info.is_toplevel && !is_par {
        let mut req = LangReq::GuessTlp { result: false };
        if comp.call_langop(node, LangOp::GuessTlp, &mut req)
            && let LangReq::GuessTlp { result: true } = req
        {
            state.codegen().toplevel_entry = Some(entryname);
        }
    }
    false
}

fn getname_fcndef(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetName { result } = req {
        *result = Some(fcn_ident(comp, node));
        true
    } else {
        false
    }
}

/// A definition looks like a top-level process when every parameter is a
/// channel (or it has none).
fn guesstlp_fcndef(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::GuessTlp { result } = req else { return false };
    let gup = comp.gup();
    let params = comp.sub_expect(node, 1);
    *result = comp.list_items(params).into_iter().all(|param| {
        if comp.tree.tag(param) != gup.fparam {
            return true; // the workspace pointer
        }
        comp.sub(param, 1).is_some_and(|t| comp.tree.tag(t) == gup.chan_type)
    });
    true
}

// ==========================
// instances

/// Checks actual arguments against the definition's formals.
fn typecheck_instance(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    super::subtree_op(comp, state, node, 1, crate::passes::typecheck::typecheck_subtree);

    let fn_nn = comp.sub_expect(node, 0);
    let id = comp.name_expect(fn_nn, 0);
    let Some(params) = comp.names.get(id).typ else {
        return false;
    };
    let args = comp.sub_expect(node, 1);
    let formals: Vec<NodeId> = comp
        .list_items(params)
        .into_iter()
        .filter(|&p| comp.tree.tag(p) == gup.fparam)
        .collect();
    let actuals = comp.list_items(args);
    if formals.len() != actuals.len() {
        let ident = comp.names.ident(id).to_owned();
        comp.error_at(
            node,
            format!("[{ident}] expects {} argument(s), found {}", formals.len(), actuals.len()),
        );
        return false;
    }
    for (formal, actual) in formals.into_iter().zip(actuals) {
        let Some(ftype) = comp.get_type(formal, None) else { continue };
        let Some(atype) = comp.get_type(actual, None) else { continue };
        crate::passes::typecheck::check_type_actual(comp, ftype, atype, node);
        let (is_result, is_var) = fparam_attrs(comp, formal);
        if (is_result || is_var) && !comp.is_var(actual) {
            comp.error_at(node, "modifiable argument must be a variable".to_owned());
        }
    }
    false
}

fn dcg_instance(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let fn_nn = comp.sub_expect(node, 0);
    record_call_edge(comp, state, fn_nn);
    true
}

fn dcg_ppinstance(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let fn_nn = comp.sub_expect(node, 0);
    record_call_edge(comp, state, fn_nn);
    true
}

fn record_call_edge(comp: &mut Compiler, state: &mut PassState, fn_nn: NodeId) {
    let Some(caller) = state.dcg().thisfcn.clone() else { return };
    let gup = comp.gup();
    let id = comp.name_expect(fn_nn, 0);
    let ident = comp.names.ident(id).to_owned();
    let procabs = comp.tree.tag(fn_nn) == gup.npfcndef;
    let callee = cccsp::make_entryname(&ident, procabs);
    comp.sfi.add_child(&caller, &callee);
    if procabs {
        comp.sfi.lookup_or_new(&callee).proc_abstracted = true;
    }
}

fn codegen_instance(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let fn_nn = comp.sub_expect(node, 0);
    let id = comp.name_expect(fn_nn, 0);
    let ident = comp.names.ident(id).to_owned();
    let entryname = cccsp::make_entryname(&ident, comp.tree.tag(fn_nn) == gup.npfcndef);

    let formals: Vec<Option<NodeId>> = match comp.names.get(id).typ {
        Some(params) => comp
            .list_items(params)
            .into_iter()
            .filter(|&p| comp.tree.tag(p) == gup.fparam)
            .map(Some)
            .collect(),
        None => Vec::new(),
    };
    let args = comp.list_items(comp.sub_expect(node, 1));

    state.codegen().write(&format!("{entryname} (wptr"));
    for (i, arg) in args.into_iter().enumerate() {
        state.codegen().write(", ");
        let by_ref = formals.get(i).copied().flatten().is_some_and(|f| {
            let (is_result, is_var) = fparam_attrs(comp, f);
            is_result || is_var
        });
        let arg_indir = map::indir_of(comp, arg);
        if by_ref && arg_indir == 0 {
            state.codegen().write("&(");
            codegen_subtree(comp, state, arg);
            state.codegen().write(")");
        } else {
            codegen_subtree(comp, state, arg);
        }
    }
    state.codegen().write(");");
    state.codegen().end_line();
    false
}

// ==========================
// odds and ends

/// A free-variable wrapper that survived into fetrans outside a PAR is a
/// pipeline invariant violation.
fn fetrans_orphan_fvnode(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let tag = comp.tag_name_of(*slot).to_owned();
    panic!("free-variable wrapper [{tag}] outside a PAR during fetrans");
}

fn codegen_fparaminit(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let nn = comp.sub_expect(node, 0);
    let idx = comp.sub_expect(node, 1);
    let id = comp.name_expect(nn, 0);
    let typ = comp.names.get(id).typ;
    let ctype = typ.and_then(|t| comp.ctype_of(t)).unwrap_or_else(|| "int".to_owned());
    let indir = map::indir_of(comp, nn);
    let stars = "*".repeat(indir as usize);
    state.codegen().write("GetProcParam (wptr, ");
    codegen_subtree(comp, state, idx);
    state.codegen().write(&format!(", {ctype} {stars}"));
    state.codegen().write(")");
    false
}

/// Rewrites `return e1, e2` into assignments to the result parameters.
fn fetrans1_return(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let exprs = match comp.sub(node, 0) {
        Some(list) if comp.is_list(list) => comp.list_items(list),
        Some(single) => vec![single],
        None => Vec::new(),
    };
    if exprs.is_empty() {
        return false;
    }
    let result_params = state.fetrans1().result_params.clone();
    if exprs.len() != result_params.len() {
        comp.error_at(
            node,
            format!("return yields {} value(s), definition has {}", exprs.len(), result_params.len()),
        );
        return false;
    }

    let org = comp.tree.origin(node);
    let list = comp.new_list(org);
    for (res, expr) in result_params.into_iter().zip(exprs) {
        let res_ref = comp.copy_tree(res);
        let assign = comp.create(gup.assign, org, &[Some(res_ref), Some(expr), None]);
        comp.list_add(list, assign);
    }
    let bare = comp.create(gup.ret, org, &[None]);
    comp.list_add(list, bare);
    let seq = comp.create(gup.seq, org, &[None, Some(list)]);

    // the expressions moved into the assignments; drop the old shell
    comp.set_sub(node, 0, None);
    comp.promote_chooks(node, seq);
    super::free_shell(comp, node);
    *slot = seq;
    false
}

fn codegen_return(_comp: &mut Compiler, state: &mut PassState, _slot: &mut NodeId) -> bool {
    state.codegen().line("return;");
    false
}
