//! Operation-table override semantics: callthrough cascades run the
//! resolved implementation exactly once, and overrides shadow cleanly.

use cspcc::{
    CompOp, CompOpts, Compiler, Origin, PassState,
    nodetype::TagFlags,
    origin::OpOrigin,
    passes::TypecheckState,
    tree::NodeId,
};

fn counting_impl(_comp: &mut Compiler, state: &mut PassState, _slot: &mut NodeId) -> bool {
    state.typecheck().errors += 1;
    false
}

fn loud_impl(_comp: &mut Compiler, state: &mut PassState, _slot: &mut NodeId) -> bool {
    state.typecheck().errors += 100;
    false
}

#[test]
fn callthrough_chain_runs_the_bottom_implementation_exactly_once() {
    let mut comp = Compiler::new(CompOpts::default());
    let typ = comp.nodetypes.new_type("test:chained", 0, 0, 0);
    let tag = comp.nodetypes.new_tag("CHAINED", typ, TagFlags::empty());

    // C implements the op; A and B sit above as pure callthrough tables
    comp.set_compop(typ, CompOp::Typecheck, counting_impl, OpOrigin::CORE);
    comp.nodetypes.compops_mut(typ).insert_above(); // B
    comp.nodetypes.compops_mut(typ).insert_above(); // A

    let mut node = comp.new_node(tag, Origin::BUILTIN);
    let mut state = PassState::Typecheck(TypecheckState::default());
    let handled = comp.call_compop(&mut state, &mut node, CompOp::Typecheck);

    assert_eq!(handled, Some(false));
    assert_eq!(state.typecheck().errors, 1, "implementation ran exactly once");
}

#[test]
fn top_override_shadows_and_remove_restores() {
    let mut comp = Compiler::new(CompOpts::default());
    let typ = comp.nodetypes.new_type("test:shadowed", 0, 0, 0);
    let tag = comp.nodetypes.new_tag("SHADOWED", typ, TagFlags::empty());

    comp.set_compop(typ, CompOp::Typecheck, counting_impl, OpOrigin::CORE);
    comp.nodetypes.compops_mut(typ).insert_above();
    comp.set_compop(typ, CompOp::Typecheck, loud_impl, OpOrigin::frontend("test"));

    let mut node = comp.new_node(tag, Origin::BUILTIN);
    let mut state = PassState::Typecheck(TypecheckState::default());
    comp.call_compop(&mut state, &mut node, CompOp::Typecheck);
    assert_eq!(state.typecheck().errors, 100, "override wins");

    comp.nodetypes.compops_mut(typ).remove_top();
    let mut state = PassState::Typecheck(TypecheckState::default());
    comp.call_compop(&mut state, &mut node, CompOp::Typecheck);
    assert_eq!(state.typecheck().errors, 1, "base implementation restored");
}

#[test]
fn set_bottom_installs_under_existing_overrides() {
    let mut comp = Compiler::new(CompOpts::default());
    let typ = comp.nodetypes.new_type("test:bottomed", 0, 0, 0);
    let tag = comp.nodetypes.new_tag("BOTTOMED", typ, TagFlags::empty());

    comp.set_compop(typ, CompOp::Typecheck, loud_impl, OpOrigin::frontend("test"));
    comp.nodetypes.compops_mut(typ).insert_above();
    // install constprop at the bottom: the typecheck override is untouched
    comp.nodetypes
        .compops_mut(typ)
        .set_bottom(CompOp::Constprop as usize, counting_impl, OpOrigin::CORE);

    let mut node = comp.new_node(tag, Origin::BUILTIN);
    let mut state = PassState::Typecheck(TypecheckState::default());
    comp.call_compop(&mut state, &mut node, CompOp::Typecheck);
    assert_eq!(state.typecheck().errors, 100);

    let mut state = PassState::Typecheck(TypecheckState::default());
    comp.call_compop(&mut state, &mut node, CompOp::Constprop);
    assert_eq!(state.typecheck().errors, 1);
}

#[test]
fn missing_op_reports_unhandled() {
    let mut comp = Compiler::new(CompOpts::default());
    let typ = comp.nodetypes.new_type("test:bare", 0, 0, 0);
    let tag = comp.nodetypes.new_tag("BARE", typ, TagFlags::empty());

    let mut node = comp.new_node(tag, Origin::BUILTIN);
    let mut state = PassState::Typecheck(TypecheckState::default());
    assert_eq!(comp.call_compop(&mut state, &mut node, CompOp::Typecheck), None);
    assert!(!comp.has_compop(node, CompOp::Typecheck));
}
