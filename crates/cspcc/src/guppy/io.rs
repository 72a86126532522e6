//! Action nodes: assignment, channel communication, and timers; plus the
//! lowered API-call and case forms the later passes produce.

use crate::{
    backend::{cccsp, codegen::codegen_subtree, map},
    compiler::Compiler,
    nodetype::TypeId,
    ops::{CompOp, LangOp, LangReq},
    origin::OpOrigin,
    passes::{PassState, typecheck},
    tree::NodeId,
};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:io");

pub(super) fn register_ops(comp: &mut Compiler, t_action: TypeId, t_apicall: TypeId, t_case: TypeId, t_caseopt: TypeId) {
    comp.set_compop(t_action, CompOp::Typecheck, typecheck_action, ORIGIN);
    comp.set_compop(t_action, CompOp::Typeresolve, typeresolve_action, ORIGIN);
    comp.set_compop(t_action, CompOp::Fetrans1, fetrans1_action, ORIGIN);
    comp.set_compop(t_action, CompOp::Fetrans2, fetrans2_action, ORIGIN);
    comp.set_compop(t_action, CompOp::Fetrans3, fetrans3_action, ORIGIN);
    comp.set_compop(t_action, CompOp::Fetrans15, super::decls::fetrans15_expr_children, ORIGIN);
    comp.set_compop(t_action, CompOp::Codegen, codegen_action, ORIGIN);
    comp.set_langop(t_action, LangOp::DoUsagecheck, usagecheck_action, ORIGIN);

    comp.set_compop(t_apicall, CompOp::Codegen, codegen_apicall, ORIGIN);
    comp.set_compop(t_apicall, CompOp::Lpreallocate, lprealloc_apicall, ORIGIN);

    comp.set_compop(t_case, CompOp::Codegen, codegen_case, ORIGIN);
    comp.set_compop(t_caseopt, CompOp::Autoseq, autoseq_caseopt, ORIGIN);
}

fn chan_protocol(comp: &mut Compiler, chan_expr: NodeId) -> Option<(NodeId, Option<NodeId>)> {
    let gup = comp.gup();
    let chan_type = comp.get_type(chan_expr, None)?;
    if comp.tree.tag(chan_type) != gup.chan_type {
        return None;
    }
    Some((chan_type, comp.sub(chan_type, 0)))
}

/// Types an action. Channel actions resolve their protocol; assignments
/// check both sides; the resolved type lands in subnode 2.
fn typecheck_action(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    super::subtree_op(comp, state, node, 0, typecheck::typecheck_subtree);
    super::subtree_op(comp, state, node, 1, typecheck::typecheck_subtree);

    let tag = comp.tree.tag(node);
    let lhs = comp.sub_expect(node, 0);

    if tag == gup.assign || tag == gup.sassign {
        let rhs = comp.sub_expect(node, 1);
        if !comp.is_var(lhs) {
            comp.error_at(node, "assignment target is not a variable".to_owned());
            return false;
        }
        let Some(lhs_type) = comp.get_type(lhs, None) else {
            comp.error_at(node, "untyped assignment target".to_owned());
            return false;
        };
        // a function-call right-hand side types later, when its results
        // are lifted into the call
        if tag == gup.sassign && comp.tree.tag(rhs) == gup.instance {
            let typ = comp.copy_tree(lhs_type);
            comp.set_sub(node, 2, Some(typ));
            return false;
        }
        let Some(rhs_type) = comp.get_type(rhs, None) else {
            comp.error_at(node, "untyped assignment source".to_owned());
            return false;
        };
        if typecheck::check_type_actual(comp, lhs_type, rhs_type, node).is_some() {
            let typ = comp.copy_tree(lhs_type);
            comp.set_sub(node, 2, Some(typ));
        }
        return false;
    }

    if tag == gup.output || tag == gup.input {
        // timers resolve in typeresolve, not here
        if let Some(lhs_type) = comp.get_type(lhs, None)
            && comp.tree.tag(lhs_type) == gup.timer_type
        {
            return false;
        }
        let Some((_, protocol)) = chan_protocol(comp, lhs) else {
            comp.error_at(node, "communication target is not a channel".to_owned());
            return false;
        };
        let rhs = comp.sub_expect(node, 1);
        if tag == gup.input && !comp.is_var(rhs) {
            comp.error_at(node, "input target is not a variable".to_owned());
            return false;
        }
        let Some(rhs_type) = comp.get_type(rhs, None) else {
            comp.error_at(node, "untyped communicated value".to_owned());
            return false;
        };
        match protocol {
            Some(proto) => {
                if typecheck::check_type_actual(comp, proto, rhs_type, node).is_some() {
                    let typ = comp.copy_tree(proto);
                    comp.set_sub(node, 2, Some(typ));
                }
            }
            None => {
                // ANY protocol: the value's own type stands
                let typ = comp.copy_tree(rhs_type);
                comp.set_sub(node, 2, Some(typ));
            }
        }
    }
    false
}

/// Rewrites timer communication: an input from a timer becomes a dedicated
/// timer-read, or a timer-wait when the value is an `after` expression.
fn typeresolve_action(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.input {
        return true;
    }
    let lhs = comp.sub_expect(node, 0);
    let Some(lhs_type) = comp.get_type(lhs, None) else {
        return true;
    };
    if comp.tree.tag(lhs_type) != gup.timer_type {
        return true;
    }
    let rhs = comp.sub_expect(node, 1);
    if comp.tree.tag(rhs) == gup.after {
        let deadline = comp.sub_expect(rhs, 0);
        comp.set_sub(rhs, 0, None);
        super::free_shell(comp, rhs);
        comp.set_sub(node, 1, Some(deadline));
        comp.tree.change_tag(node, gup.timerwait);
    } else {
        comp.tree.change_tag(node, gup.timerread);
    }
    false
}

/// An output of a non-addressable expression gets a fresh temporary: the
/// value is assigned first, then the temporary is sent.
fn fetrans1_action(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.output {
        return true;
    }
    let rhs = comp.sub_expect(node, 1);
    if comp.name_slot_of_namenode(rhs).is_some() {
        return true;
    }
    let org = comp.tree.origin(node);
    let typ = match comp.sub(node, 2) {
        Some(t) => comp.copy_tree(t),
        None => comp.new_node(gup.int_type, org),
    };
    let decl_list = state.fetrans1().decl_list;
    let tmp = super::make_temp(comp, decl_list, typ, org);
    let tmp_for_send = comp.copy_tree(tmp);

    let assign = comp.create(gup.assign, org, &[Some(tmp), Some(rhs), None]);
    comp.set_sub(node, 1, Some(tmp_for_send));
    let list = comp.new_list(org);
    comp.list_add(list, assign);
    comp.list_add(list, node);
    let seq = comp.create(gup.seq, org, &[None, Some(list)]);
    *slot = seq;
    false
}

/// A function-call right-hand side swallows the assignment: the target
/// joins the call's result parameters and the call stands alone.
fn fetrans2_action(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.sassign {
        return true;
    }
    let rhs = comp.sub_expect(node, 1);
    if comp.tree.tag(rhs) != gup.instance {
        return true;
    }
    let lhs = comp.sub_expect(node, 0);
    let args = comp.sub_expect(rhs, 1);
    comp.list_add(args, lhs);
    comp.set_sub(node, 0, None);
    comp.set_sub(node, 1, None);
    comp.promote_chooks(node, rhs);
    super::free_shell(comp, node);
    *slot = rhs;
    false
}

/// An input over an ANY-protocol channel is preceded by an output of the
/// value type's hash on the same channel.
fn fetrans3_action(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.input {
        return false;
    }
    let lhs = comp.sub_expect(node, 0);
    let Some((_, protocol)) = chan_protocol(comp, lhs) else {
        return false;
    };
    if protocol.is_some() {
        return false;
    }
    let rhs = comp.sub_expect(node, 1);
    let value_type = comp.get_type(rhs, None);
    let hash = value_type.map_or(0, |t| comp.type_hash(t));

    let org = comp.tree.origin(node);
    let chan_copy = comp.copy_tree(lhs);
    let hash_lit = super::lit::new_litint(comp, org, i64::from(hash));
    let tag_out = comp.create(gup.output, org, &[Some(chan_copy), Some(hash_lit), None]);
    let list = comp.new_list(org);
    comp.list_add(list, tag_out);
    comp.list_add(list, node);
    let seq = comp.create(gup.seq, org, &[None, Some(list)]);
    *slot = seq;
    false
}

fn usagecheck_action(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::DoUsagecheck {
        reads,
        writes,
        inputs,
        outputs,
    } = req
    else {
        return false;
    };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    if tag == gup.assign || tag == gup.sassign {
        if let Some(lhs) = comp.sub(node, 0)
            && let Some(id) = comp.name_slot_of_namenode(lhs)
        {
            writes.push(id);
        }
    } else if tag == gup.input {
        // the channel operand is an input endpoint, not a plain read
        if let Some(chan) = comp.sub(node, 0)
            && let Some(id) = comp.name_slot_of_namenode(chan)
        {
            inputs.push(id);
        }
        if let Some(target) = comp.sub(node, 1)
            && let Some(id) = comp.name_slot_of_namenode(target)
        {
            writes.push(id);
        }
    } else if tag == gup.timerread {
        if let Some(timer) = comp.sub(node, 0)
            && let Some(id) = comp.name_slot_of_namenode(timer)
        {
            reads.push(id);
        }
        if let Some(target) = comp.sub(node, 1)
            && let Some(id) = comp.name_slot_of_namenode(target)
        {
            writes.push(id);
        }
    } else if tag == gup.output
        && let Some(chan) = comp.sub(node, 0)
        && let Some(id) = comp.name_slot_of_namenode(chan)
    {
        outputs.push(id);
    }
    true
}

/// Emits an expression where the runtime expects a pointer to it: names
/// already carrying a pointer pass through raw (no dereference), concrete
/// storage passes its address.
pub(super) fn emit_value_ptr(comp: &mut Compiler, state: &mut PassState, value: NodeId) {
    if map::indir_of(comp, value) >= 1 {
        if let Some(id) = comp.name_slot_of_namenode(value) {
            let ident = comp.names.ident(id).to_owned();
            state.codegen().write(&ident);
        } else {
            codegen_subtree(comp, state, value);
        }
    } else {
        state.codegen().write("&(");
        codegen_subtree(comp, state, value);
        state.codegen().write(")");
    }
}

/// Emits a channel expression where the runtime expects a `Channel *`.
fn emit_chan_arg(comp: &mut Compiler, state: &mut PassState, chan: NodeId) {
    if map::indir_of(comp, chan) >= 1 {
        codegen_subtree(comp, state, chan);
    } else {
        state.codegen().write("&(");
        codegen_subtree(comp, state, chan);
        state.codegen().write(")");
    }
}

fn action_bytes(comp: &mut Compiler, node: NodeId) -> i64 {
    comp.sub(node, 2)
        .and_then(|t| comp.bytes_for(t))
        .unwrap_or(4)
}

fn codegen_action(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let tag = comp.tree.tag(node);

    if tag == gup.assign || tag == gup.sassign {
        let lhs = comp.sub_expect(node, 0);
        let rhs = comp.sub_expect(node, 1);
        let is_string = comp.sub(node, 2).is_some_and(|t| comp.tree.tag(t) == gup.string_type);
        if is_string {
            state.codegen().write("GuppyStringAssign (wptr, ");
            emit_chan_arg(comp, state, lhs);
            state.codegen().write(", ");
            codegen_subtree(comp, state, rhs);
            state.codegen().write(");");
        } else {
            codegen_subtree(comp, state, lhs);
            state.codegen().write(" = ");
            codegen_subtree(comp, state, rhs);
            state.codegen().write(";");
        }
        state.codegen().end_line();
        return false;
    }
    if tag == gup.output || tag == gup.input {
        let call = if tag == gup.output { "ChanOut" } else { "ChanIn" };
        let chan = comp.sub_expect(node, 0);
        let value = comp.sub_expect(node, 1);
        let bytes = action_bytes(comp, node);
        state.codegen().write(&format!("{call} (wptr, "));
        emit_chan_arg(comp, state, chan);
        state.codegen().write(", ");
        emit_value_ptr(comp, state, value);
        state.codegen().write(&format!(", {bytes});"));
        state.codegen().end_line();
        return false;
    }
    if tag == gup.timerread {
        let target = comp.sub_expect(node, 1);
        codegen_subtree(comp, state, target);
        state.codegen().write(" = TimerRead (wptr);");
        state.codegen().end_line();
        return false;
    }
    if tag == gup.timerwait {
        let deadline = comp.sub_expect(node, 1);
        state.codegen().write("TimerWait (wptr, ");
        codegen_subtree(comp, state, deadline);
        state.codegen().write(");");
        state.codegen().end_line();
        return false;
    }
    state.codegen().error_count += 1;
    false
}

// ==========================
// API calls

fn codegen_apicall(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let callname = comp.sub_expect(node, 0);
    let call = cccsp::apicall_of(comp, callname);
    let args = comp.list_items(comp.sub_expect(node, 1));
    state.codegen().write(&format!("{} (wptr", call.c_name()));
    for arg in args {
        state.codegen().write(", ");
        // names of pointer-carried types (channels, strings) pass as
        // pointers; everything else emits as-is
        let typ = comp.name_slot_of_namenode(arg).and_then(|id| comp.names.get(id).typ);
        let ptrish = typ.is_some_and(|t| comp.def_pointer_level(t) >= 1);
        if ptrish {
            emit_value_ptr(comp, state, arg);
        } else {
            codegen_subtree(comp, state, arg);
        }
    }
    state.codegen().write(");");
    state.codegen().end_line();
    false
}

fn lprealloc_apicall(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let callname = comp.sub_expect(node, 0);
    state.preallocate().collect += cccsp::stkwords_of_call(comp, callname) * 4;
    true
}

// ==========================
// case dispatch (lowered ALTs)

fn codegen_case(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let sel = comp.sub_expect(node, 0);
    state.codegen().write("switch (");
    codegen_subtree(comp, state, sel);
    state.codegen().write(")");
    state.codegen().end_line();
    state.codegen().open_block();
    for opt in comp.list_items(comp.sub_expect(node, 1)) {
        let value = comp.sub_expect(opt, 0);
        state.codegen().write("case ");
        codegen_subtree(comp, state, value);
        state.codegen().write(":");
        state.codegen().end_line();
        state.codegen().open_block();
        if let Some(body) = comp.sub(opt, 1) {
            codegen_subtree(comp, state, body);
        }
        state.codegen().line("break;");
        state.codegen().close_block();
    }
    state.codegen().close_block();
    false
}

fn autoseq_caseopt(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
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
