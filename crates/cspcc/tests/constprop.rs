//! Constant propagation: folding, idempotence, and diagnostics.

use cspcc::{CompOp, CompOpts, Compiler, ConstData, Origin, PassState, passes};
use pretty_assertions::assert_eq;

fn fold_expr(comp: &mut Compiler, mut root: cspcc::NodeId) -> cspcc::NodeId {
    let mut state = PassState::Constprop;
    passes::compop_postwalk(comp, &mut state, &mut root, CompOp::Constprop);
    root
}

#[test]
fn dyadic_folding_collapses_to_a_constant() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    // (2 + 3) * 4
    let two = cspcc::guppy::lit::new_litint(&mut comp, org, 2);
    let three = cspcc::guppy::lit::new_litint(&mut comp, org, 3);
    let add = comp.create(gup.add, org, &[Some(two), Some(three), None]);
    let four = cspcc::guppy::lit::new_litint(&mut comp, org, 4);
    let mul = comp.create(gup.mul, org, &[Some(add), Some(four), None]);

    let folded = fold_expr(&mut comp, mul);
    assert!(comp.is_const_node(folded));
    assert_eq!(comp.const_data_of(folded), ConstData::Int(20));
}

#[test]
fn constprop_is_idempotent() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    let a = cspcc::guppy::lit::new_litint(&mut comp, org, 10);
    let b = cspcc::guppy::lit::new_litint(&mut comp, org, 4);
    let sub = comp.create(gup.sub, org, &[Some(a), Some(b), None]);

    let once = fold_expr(&mut comp, sub);
    let dump_once = comp.dump_tree(once);
    let twice = fold_expr(&mut comp, once);
    let dump_twice = comp.dump_tree(twice);

    assert_eq!(once, twice, "a folded tree does not change identity");
    assert_eq!(dump_once, dump_twice, "a folded tree does not change shape");
}

#[test]
fn negation_folds_through_the_monadic_operator() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    let five = cspcc::guppy::lit::new_litint(&mut comp, org, 5);
    let neg = comp.create(gup.neg, org, &[Some(five), None]);
    let folded = fold_expr(&mut comp, neg);
    assert_eq!(comp.const_data_of(folded), ConstData::Int(-5));
}

#[test]
fn division_by_zero_is_reported_not_folded() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    let one = cspcc::guppy::lit::new_litint(&mut comp, org, 1);
    let zero = cspcc::guppy::lit::new_litint(&mut comp, org, 0);
    let div = comp.create(gup.div, org, &[Some(one), Some(zero), None]);

    let result = fold_expr(&mut comp, div);
    assert!(!comp.is_const_node(result), "unfoldable node is left in place");
    assert_eq!(comp.reporter.error_count(), 1);
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("division by zero"), "{rendered}");
}

#[test]
fn out_of_range_literal_warns_on_narrow_type() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    // a byte-typed literal out of range
    let lit = cspcc::guppy::lit::new_litint(&mut comp, org, 300);
    let byte_type = comp.new_node(gup.byte_type, org);
    comp.set_sub(lit, 0, Some(byte_type));

    let mut state = PassState::Typecheck(cspcc::passes::TypecheckState::default());
    let mut slot = lit;
    passes::compop_walk(&mut comp, &mut state, &mut slot, CompOp::Typecheck);

    assert_eq!(comp.reporter.warning_count(), 1);
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("truncated"), "{rendered}");
}
