//! ALT guarded choice: checking and late lowering.
//!
//! A full ALT decomposes into a runtime selection call that writes a chosen
//! index into a fresh variable, followed by a case dispatch whose options
//! hold each guard's communication and continuation. `pri alt` preserves
//! guard order; a skip guard is permitted only last, and only in `pri alt`.

use crate::{
    backend::cccsp::ApiCall,
    compiler::Compiler,
    nodetype::TypeId,
    ops::CompOp,
    origin::OpOrigin,
    passes::{PassState, typecheck},
    tree::NodeId,
};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:alt");

pub(super) fn register_ops(comp: &mut Compiler, t_altnode: TypeId, t_guard: TypeId) {
    comp.set_compop(t_altnode, CompOp::Prescope, prescope_alt, ORIGIN);
    comp.set_compop(t_altnode, CompOp::Typecheck, typecheck_alt, ORIGIN);
    comp.set_compop(t_altnode, CompOp::Fetrans3, fetrans3_alt, ORIGIN);
    comp.set_compop(t_guard, CompOp::Autoseq, autoseq_guard, ORIGIN);
}

/// A list body under a guard becomes a `seq`.
fn autoseq_guard(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
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

fn prescope_alt(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    comp.ensure_list_in_slot(*slot, 0);
    true
}

/// Checks guard shape: each guard's action is a channel input or `skip`;
/// a skip guard is last-only and `pri alt`-only.
fn typecheck_alt(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let is_pri = comp.tree.tag(node) == gup.prialt;
    let guards = comp.list_items(comp.sub_expect(node, 0));
    let last = guards.len().saturating_sub(1);
    for (i, guard) in guards.into_iter().enumerate() {
        if comp.tree.tag(guard) != gup.guard {
            let tag = comp.tag_name_of(guard).to_owned();
            comp.error_at(guard, format!("expected a guard, found [{tag}]"));
            continue;
        }
        let action = comp.sub_expect(guard, 0);
        let action_tag = comp.tree.tag(action);
        if action_tag == gup.skip {
            if !is_pri {
                comp.error_at(guard, "skip guard only allowed in pri alt".to_owned());
            } else if i != last {
                comp.error_at(guard, "skip guard must be the last guard".to_owned());
            }
        } else if action_tag == gup.input {
            super::subtree_op(comp, state, guard, 0, typecheck::typecheck_subtree);
        } else {
            let tag = comp.tag_name_of(action).to_owned();
            comp.error_at(guard, format!("guard action must be an input or skip, found [{tag}]"));
        }
        super::subtree_op(comp, state, guard, 1, typecheck::typecheck_subtree);
    }
    false
}

/// Lowers the ALT into selection-call-then-case.
fn fetrans3_alt(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let is_pri = comp.tree.tag(node) == gup.prialt;
    let org = comp.tree.origin(node);
    let guards = comp.list_items(comp.sub_expect(node, 0));

    let decl_list = state.fetrans3().decl_list;
    let int_type = comp.new_node(gup.int_type, org);
    let sel = super::make_temp(comp, decl_list, int_type, org);

    // selection call: the chosen guard index lands in the variable; -1
    // selects the skip guard when nothing is ready
    let mut call_args = Vec::new();
    let sel_addr = {
        let sel_copy = comp.copy_tree(sel);
        crate::backend::cccsp::create_addrof(comp, sel_copy)
    };
    call_args.push(sel_addr);
    let mut has_skip = false;
    let mut opts = Vec::new();
    for (i, guard) in guards.into_iter().enumerate() {
        let action = comp.sub_expect(guard, 0);
        let body = comp.sub_expect(guard, 1);
        comp.set_sub(guard, 0, None);
        comp.set_sub(guard, 1, None);
        if comp.tree.tag(action) == gup.skip {
            has_skip = true;
            comp.free_tree(action);
            let value = super::lit::new_litint(comp, org, -1);
            let opt = comp.create(gup.caseopt, org, &[Some(value), Some(body)]);
            opts.push(opt);
        } else {
            let chan = comp.sub_expect(action, 0);
            let chan_copy = comp.copy_tree(chan);
            call_args.push(chan_copy);

            let value = super::lit::new_litint(comp, org, i64::try_from(i).expect("guard index fits i64"));
            let list = comp.new_list(org);
            comp.list_add(list, action);
            comp.list_add(list, body);
            let body_seq = comp.create(gup.seq, org, &[None, Some(list)]);
            let opt = comp.create(gup.caseopt, org, &[Some(value), Some(body_seq)]);
            opts.push(opt);
        }
        super::free_shell(comp, guard);
    }
    let skip_flag = super::lit::new_litint(comp, org, i64::from(has_skip));
    call_args.push(skip_flag);

    let call = if is_pri { ApiCall::ProcAlt } else { ApiCall::AltStart };
    let apicall = super::new_apicall(comp, call, call_args, org);

    let sel_ref = comp.copy_tree(sel);
    let optlist = comp.new_list(org);
    for opt in opts {
        comp.list_add(optlist, opt);
    }
    let case = comp.create(gup.case_node, org, &[Some(sel_ref), Some(optlist)]);

    let list = comp.new_list(org);
    comp.list_add(list, apicall);
    comp.list_add(list, case);
    let seq = comp.create(gup.seq, org, &[None, Some(list)]);

    comp.set_sub(node, 0, None);
    comp.promote_chooks(node, seq);
    super::free_shell(comp, node);
    comp.free_tree(sel);
    *slot = seq;
    true
}
