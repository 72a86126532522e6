//! Constructor processes: `seq`, `par`, and the replicated forms.
//!
//! PAR is where most of the pipeline's machinery concentrates: scoping
//! wraps each arm with its captured free variables, fetrans splits arms
//! into process-abstracted definitions, namemap allocates per-arm
//! workspaces and the runtime spawn, and reallocate sums the arm stack
//! demands into the enclosing function's tally.

use crate::{
    backend::{
        alloc::word_ceil,
        cccsp::{self, ApiCall, ParInfo, ParInfoEntry, Subtarget},
        codegen::codegen_subtree,
    },
    chook::Chook,
    compiler::Compiler,
    nodetype::TypeId,
    ops::CompOp,
    origin::OpOrigin,
    passes::{PassState, scope::{self, CrossScope}},
    tree::{FcnDefInfo, Hook, NodeId},
};

use super::{FPARAM_VAR, name_ref};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:cnode");

pub(super) fn register_ops(comp: &mut Compiler, t_cnode: TypeId, t_replcnode: TypeId) {
    comp.set_compop(t_cnode, CompOp::Prescope, prescope_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::ScopeIn, scopein_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Declify, declify_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Flattenseq, flattenseq_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Fetrans, fetrans_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Namemap, namemap_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Lpreallocate, lprealloc_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Reallocate, reallocate_cnode, ORIGIN);
    comp.set_compop(t_cnode, CompOp::Codegen, codegen_cnode, ORIGIN);

    comp.set_compop(t_replcnode, CompOp::ScopeIn, scopein_replcnode, ORIGIN);
    comp.set_compop(t_replcnode, CompOp::Autoseq, autoseq_replcnode, ORIGIN);
    comp.set_compop(t_replcnode, CompOp::Codegen, codegen_replcnode, ORIGIN);
}

fn prescope_cnode(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    comp.ensure_list_in_slot(*slot, 1);
    true
}

/// Scopes a constructor. PAR arms each get a cross list; after an arm is
/// scoped, the captures collected for it wrap the arm in a free-variable
/// node so fetrans can parameterise the generated definition.
fn scopein_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.par {
        return true;
    }

    let body = comp.sub_expect(node, 1);
    let arm_level = state.scope().lexlevel + 1;
    for (i, arm) in comp.list_items(body).into_iter().enumerate() {
        let org = comp.tree.origin(arm);
        let fvlist = comp.new_list(org);
        state.scope().crosses.push(CrossScope {
            par_lexlevel: arm_level,
            fvlist,
        });
        state.scope().lexlevel = arm_level;

        let mut arm_slot = arm;
        scope::scope_subtree(comp, state, &mut arm_slot);

        state.scope().lexlevel = arm_level - 1;
        let cross = state.scope().crosses.pop().expect("cross list pushed above");
        let wrapped = comp.create_from(gup.fvnode, arm_slot, &[Some(arm_slot), Some(cross.fvlist)]);
        comp.list_set_nth(body, i, wrapped);
    }
    false
}

/// Splits a mixed declaration/process list into nested declaration blocks.
pub(super) fn declify_items(comp: &mut Compiler, items: Vec<NodeId>) -> Vec<NodeId> {
    let gup = comp.gup();
    let Some(first) = items.iter().position(|&n| comp.tree.tag(n) == gup.vardecl) else {
        return items;
    };
    let mut run_end = first;
    while run_end < items.len() && comp.tree.tag(items[run_end]) == gup.vardecl {
        run_end += 1;
    }
    let (head, tail) = items.split_at(first);
    let (decls, rest) = tail.split_at(run_end - first);

    let org = comp.tree.origin(decls[0]);
    let decl_list = comp.new_list(org);
    for &d in decls {
        comp.list_add(decl_list, d);
    }
    let rest = declify_items(comp, rest.to_vec());
    let rest_list = comp.new_list(org);
    for r in rest {
        comp.list_add(rest_list, r);
    }
    let dblk = comp.create(gup.declblock, org, &[Some(decl_list), Some(rest_list)]);

    let mut out = head.to_vec();
    out.push(dblk);
    out
}

fn declify_cnode(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let body = comp.sub_expect(node, 1);
    let items = comp.list_items(body);
    let new_items = declify_items(comp, items);
    if let Some(Hook::List(stored)) = comp.hook_mut(body, 0) {
        *stored = new_items;
    }
    true
}

/// Eliminates redundant constructors: an empty `seq`/`par` becomes `skip`,
/// a singleton becomes its sole member.
fn flattenseq_cnode(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let body = comp.sub_expect(node, 1);
    match comp.list_count(body) {
        0 => {
            let skip = comp.create_from(gup.skip, node, &[]);
            comp.promote_chooks(node, skip);
            comp.free_tree(node);
            *slot = skip;
        }
        1 => {
            let mut only = comp.list_delete_at(body, 0);
            // a wrapped PAR arm collapses to its body; an empty capture
            // list is the common case here
            if comp.tree.tag(only) == gup.fvnode {
                let inner = comp.sub_expect(only, 0);
                let fvlist = comp.sub_expect(only, 1);
                comp.set_sub(only, 0, None);
                comp.free_tree(only);
                let _ = fvlist;
                only = inner;
            }
            comp.promote_chooks(node, only);
            comp.free_tree(node);
            *slot = only;
        }
        _ => {}
    }
    false
}

/// Splits each PAR arm into a process-abstracted definition parameterised
/// by its captured free variables; the arm becomes an instance node with a
/// workspace slot.
fn fetrans_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.par {
        return true;
    }

    let body = comp.sub_expect(node, 1);
    for (i, arm) in comp.list_items(body).into_iter().enumerate() {
        let arm_tag = comp.tree.tag(arm);
        if arm_tag == gup.ppinstance {
            continue;
        }
        assert!(
            arm_tag == gup.fvnode,
            "expected FVNODE/PPINSTANCE in PAR but got [{}]",
            comp.tag_name_of(arm)
        );

        let org = comp.tree.origin(arm);
        let mut proc_body = comp.sub_expect(arm, 0);
        let fvlist = comp.sub_expect(arm, 1);

        // one formal per captured variable; the body is rewritten to use it
        let params = comp.new_list(org);
        for fv in comp.list_items(fvlist) {
            let outer_id = comp.name_expect(fv, 0);
            let ident = comp.names.ident(outer_id).to_owned();
            let typ = match comp.names.get(outer_id).typ {
                Some(t) => comp.copy_tree(t),
                None => comp.new_node(gup.int_type, org),
            };
            let (pid, pnn) = super::declare_name(comp, &ident, gup.nparam, None, Some(typ), 1, org);
            let def_level = comp.def_pointer_level(typ);
            let attrs = if def_level == 0 { FPARAM_VAR } else { 0 };
            let fp = super::new_fparam(comp, pnn, typ, attrs);
            comp.list_add(params, fp);

            comp.modprewalk(&mut proc_body, &mut |c, s| {
                if c.name_slot_of_namenode(*s) == Some(outer_id) {
                    let use_org = c.tree.origin(*s);
                    let replacement = name_ref(c, pid, use_org);
                    c.promote_chooks(*s, replacement);
                    c.free_tree(*s);
                    *s = replacement;
                    false
                } else {
                    true
                }
            });
        }

        let def_ident = comp.names.temp_ident("parproc");
        let (def_id, def_nn) = super::declare_name(comp, &def_ident, gup.npfcndef, None, Some(params), 0, org);
        let results = comp.new_list(org);
        let newdef = comp.create(gup.pfcndef, org, &[Some(def_nn), Some(params), Some(proc_body), Some(results)]);
        comp.set_hook(
            newdef,
            0,
            Some(Hook::FcnInfo(FcnDefInfo {
                lexlevel: 0,
                is_public: false,
                is_toplevel: false,
                is_par: true,
            })),
        );
        comp.names.get_mut(def_id).decl = Some(newdef);
        state.fetrans().new_defs.push(newdef);

        // the capture list becomes the instance's argument list
        let def_ref = name_ref(comp, def_id, org);
        let inst = comp.create(gup.ppinstance, org, &[Some(def_ref), None, Some(fvlist)]);
        comp.list_set_nth(body, i, inst);
        super::free_shell(comp, arm);
    }
    false
}

/// Maps a PAR: one workspace declaration per arm in a fresh declaration
/// block above the PAR, parinfo entries on the PAR itself.
fn namemap_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.par {
        return true;
    }

    let org = comp.tree.origin(node);
    let body = comp.sub_expect(node, 1);
    let decls = comp.new_list(org);
    let mut parinfo = ParInfo::new();
    for arm in comp.list_items(body) {
        assert!(
            comp.tree.tag(arm) == gup.ppinstance,
            "expected PPINSTANCE in mapped PAR but got [{}]",
            comp.tag_name_of(arm)
        );
        let wsname = comp.names.temp_ident("wsp");
        let ws = cccsp::create_workspace(comp, org, &wsname);
        let nargs = comp.list_count(comp.sub_expect(arm, 2));
        cccsp::set_workspace_nparams(comp, ws, i32::try_from(nargs).expect("argument count fits i32"));
        comp.set_sub(arm, 1, Some(ws));
        comp.list_add(decls, ws);

        let entry = ParInfoEntry {
            namenode: comp.sub_expect(arm, 0),
            wsspace: ws,
        };
        state.namemap().thisentry = Some(entry);
        parinfo.link(entry);
    }
    state.namemap().thisentry = None;
    comp.set_chook(node, comp.core_chooks.parinfo, Chook::ParInfo(parinfo));

    let dblk = comp.create(gup.declblock, org, &[Some(decls), Some(node)]);
    *slot = dblk;
    false
}

/// PAR spawning costs runtime stack on top of the arms themselves.
fn lprealloc_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) == gup.par {
        let words = ApiCall::ProcPar.stack_words() + ApiCall::LightProcInit.stack_words();
        state.preallocate().collect += words * 4;
    }
    true
}

/// Sums each arm's allocation (word-padded) into the arm workspace slots,
/// the PAR's word total, and the enclosing function's tally.
fn reallocate_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.par {
        return true;
    }
    let Some(Chook::ParInfo(parinfo)) = comp.chook(node, comp.core_chooks.parinfo) else {
        comp.error_at(node, "mapped PAR has no parinfo".to_owned());
        state.reallocate().error += 1;
        return false;
    };
    let entries = parinfo.entries.clone();
    let mut total = 0i64;
    for entry in &entries {
        if comp.tree.tag(entry.namenode) != gup.npfcndef {
            let tag = comp.tag_name_of(entry.namenode).to_owned();
            comp.error_at(node, format!("parallel process name is not process-abstracted, found [{tag}]"));
            state.reallocate().error += 1;
            continue;
        }
        let id = comp.name_expect(entry.namenode, 0);
        let ident = comp.names.ident(id).to_owned();
        let entryname = cccsp::make_entryname(&ident, true);
        let allocsize = comp.sfi.get(&entryname).map_or(0, |e| e.allocsize);
        let nwords = word_ceil(allocsize);
        cccsp::set_workspace_nwords(comp, entry.wsspace, nwords);
        total += nwords;
    }
    if let Some(Chook::ParInfo(parinfo)) = comp.chook_mut(node, comp.core_chooks.parinfo) {
        parinfo.nwords = total;
    }
    state.reallocate().maxpar = state.reallocate().maxpar.max(total);
    false
}

fn codegen_cnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let body = comp.sub_expect(node, 1);
    if comp.tree.tag(node) == gup.seq {
        for item in comp.list_items(body) {
            codegen_subtree(comp, state, item);
        }
        return false;
    }

    // PAR: initialise per-arm workspaces, pass parameters, spawn
    let arms = comp.list_items(body);
    for arm in &arms {
        let ws = comp.sub_expect(*arm, 1);
        let wsname = cccsp::workspace_cname(comp, ws);
        let (_, nwords) = cccsp::workspace_sizes(comp, ws);
        state.codegen().line(&format!("{wsname} = LightProcInit (wptr, {nwords});"));
        for (j, arg) in comp.list_items(comp.sub_expect(*arm, 2)).into_iter().enumerate() {
            state.codegen().write(&format!("ProcParam (wptr, {wsname}, {j}, "));
            emit_param_source(comp, state, arg);
            state.codegen().write(");");
            state.codegen().end_line();
        }
    }
    state.codegen().write(&format!("ProcPar (wptr, {}", arms.len()));
    for arm in &arms {
        let ws = comp.sub_expect(*arm, 1);
        let wsname = cccsp::workspace_cname(comp, ws);
        let id = comp.name_expect(comp.sub_expect(*arm, 0), 0);
        let ident = comp.names.ident(id).to_owned();
        let entryname = cccsp::make_entryname(&ident, true);
        state.codegen().write(&format!(", {wsname}, {entryname}"));
    }
    state.codegen().write(");");
    state.codegen().end_line();

    if state.codegen().subtarget == Subtarget::Ev3 {
        for arm in &arms {
            let ws = comp.sub_expect(*arm, 1);
            let wsname = cccsp::workspace_cname(comp, ws);
            state.codegen().line(&format!("LightProcFree (wptr, {wsname});"));
        }
    }
    false
}

/// Emits an argument as the spawned process will unpack it: concrete
/// storage passes its address, pointer-carrying names pass through raw.
fn emit_param_source(comp: &mut Compiler, state: &mut PassState, arg: NodeId) {
    super::io::emit_value_ptr(comp, state, arg);
}

// ==========================
// replicated constructors

/// Scopes `seq i = start for count`: the replicator name is visible in the
/// body only.
fn scopein_replcnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    super::subtree_op(comp, state, node, 1, scope::scope_subtree);
    super::subtree_op(comp, state, node, 2, scope::scope_subtree);

    let mark = comp.names.mark_scope();
    let lexlevel = state.scope().lexlevel;
    let raw = comp.sub_expect(node, 0);
    let ident = match comp.hook(raw, 0) {
        Some(Hook::Text(ident)) => ident.clone(),
        _ => panic!("replicator name is not a raw name"),
    };
    let org = comp.tree.origin(raw);
    let int_type = comp.create_from(gup.int_type, raw, &[]);
    let (_, nn) = super::declare_name(comp, &ident, gup.nrepl, Some(node), Some(int_type), lexlevel, org);
    comp.free_tree(raw);
    comp.set_sub(node, 0, Some(nn));

    super::subtree_op(comp, state, node, 3, scope::scope_subtree);
    comp.names.mark_descope(mark);
    false
}

fn autoseq_replcnode(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if let Some(body) = comp.sub(node, 3)
        && comp.is_list(body)
    {
        let seq = comp.create_from(gup.seq, body, &[None, Some(body)]);
        comp.set_sub(node, 3, Some(seq));
    }
    true
}

fn codegen_replcnode(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let nn = comp.sub_expect(node, 0);
    let id = comp.name_expect(nn, 0);
    let ident = comp.names.ident(id).to_owned();
    let start = comp.sub_expect(node, 1);
    let count = comp.sub_expect(node, 2);

    state.codegen().write(&format!("for (int {ident} = "));
    codegen_subtree(comp, state, start);
    state.codegen().write(&format!("; {ident} < ("));
    codegen_subtree(comp, state, start);
    state.codegen().write(" + ");
    codegen_subtree(comp, state, count);
    state.codegen().write(&format!("); {ident}++)"));
    state.codegen().end_line();
    state.codegen().open_block();
    if let Some(body) = comp.sub(node, 3) {
        codegen_subtree(comp, state, body);
    }
    state.codegen().close_block();
    false
}
