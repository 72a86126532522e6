//! Dyadic and monadic expression nodes: typing, folding, emission.

use crate::{
    compiler::Compiler,
    constants::{ConstData, FoldOp, fold_dyadic},
    nodetype::{TagFlags, TypeId},
    ops::{CompOp, LangOp, LangReq},
    origin::OpOrigin,
    passes::{PassState, typecheck},
    tree::NodeId,
};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:exprs");

pub(super) fn register_ops(comp: &mut Compiler, t_dop: TypeId, t_mop: TypeId) {
    comp.set_compop(t_dop, CompOp::Typecheck, typecheck_dop, ORIGIN);
    comp.set_compop(t_dop, CompOp::Constprop, constprop_dop, ORIGIN);
    comp.set_compop(t_dop, CompOp::Fetrans15, super::decls::fetrans15_expr_children, ORIGIN);
    comp.set_compop(t_dop, CompOp::Codegen, codegen_dop, ORIGIN);
    comp.set_langop(t_dop, LangOp::GetType, gettype_dop, ORIGIN);
    comp.set_langop(t_dop, LangOp::IsConst, isconst_dop, ORIGIN);

    comp.set_compop(t_mop, CompOp::Typecheck, typecheck_mop, ORIGIN);
    comp.set_compop(t_mop, CompOp::Constprop, constprop_mop, ORIGIN);
    comp.set_compop(t_mop, CompOp::Fetrans15, super::decls::fetrans15_expr_children, ORIGIN);
    comp.set_compop(t_mop, CompOp::Codegen, codegen_mop, ORIGIN);
    comp.set_langop(t_mop, LangOp::GetType, gettype_mop, ORIGIN);
}

fn fold_op_of(comp: &Compiler, node: NodeId) -> Option<FoldOp> {
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    if tag == gup.add {
        Some(FoldOp::Add)
    } else if tag == gup.sub {
        Some(FoldOp::Sub)
    } else if tag == gup.mul {
        Some(FoldOp::Mul)
    } else if tag == gup.div {
        Some(FoldOp::Div)
    } else if tag == gup.rem {
        Some(FoldOp::Rem)
    } else {
        None
    }
}

fn c_operator(comp: &Compiler, node: NodeId) -> &'static str {
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    if tag == gup.add {
        "+"
    } else if tag == gup.sub {
        "-"
    } else if tag == gup.mul {
        "*"
    } else if tag == gup.div {
        "/"
    } else if tag == gup.rem {
        "%"
    } else if tag == gup.and_op {
        "&&"
    } else if tag == gup.or_op {
        "||"
    } else {
        // AFTER is lowered by typeresolve and never reaches emission
        "/*?*/"
    }
}

/// Types a dyadic operator: operand types must agree; boolean operators
/// yield BOOL, arithmetic yields the operand type. The result lands in
/// subnode 2.
fn typecheck_dop(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    super::subtree_op(comp, state, node, 0, typecheck::typecheck_subtree);
    super::subtree_op(comp, state, node, 1, typecheck::typecheck_subtree);

    let lhs = comp.sub_expect(node, 0);
    let rhs = comp.sub_expect(node, 1);
    let Some(lhs_type) = comp.get_type(lhs, None) else {
        comp.error_at(node, "untyped left operand".to_owned());
        return false;
    };
    let Some(rhs_type) = comp.get_type(rhs, None) else {
        comp.error_at(node, "untyped right operand".to_owned());
        return false;
    };
    if typecheck::check_type_actual(comp, lhs_type, rhs_type, node).is_none() {
        return false;
    }
    let gup = comp.gup();
    let result_type = if comp.tag_flag(node, TagFlags::BOOL_OP) {
        comp.create_from(gup.bool_type, node, &[])
    } else {
        comp.copy_tree(lhs_type)
    };
    comp.set_sub(node, 2, Some(result_type));
    false
}

fn gettype_dop(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetType { result, .. } = req {
        *result = comp.sub(node, 2);
        true
    } else {
        false
    }
}

fn isconst_dop(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::IsConst { result } = req else { return false };
    let lhs = comp.sub_expect(node, 0);
    let rhs = comp.sub_expect(node, 1);
    *result = fold_op_of(comp, node).is_some() && comp.is_const(lhs) && comp.is_const(rhs);
    true
}

/// Folds constant integer operands into a constant node. Division by zero
/// is reported and left unfolded.
fn constprop_dop(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let Some(op) = fold_op_of(comp, node) else { return false };
    let lhs = comp.sub_expect(node, 0);
    let rhs = comp.sub_expect(node, 1);
    let (Some(ConstData::Int(a)), Some(ConstData::Int(b))) = (comp.const_val_of(lhs), comp.const_val_of(rhs)) else {
        return false;
    };
    let Some(folded) = fold_dyadic(op, a, b) else {
        if matches!(op, FoldOp::Div | FoldOp::Rem) && b == 0 {
            comp.error_at(node, "division by zero in constant expression".to_owned());
        } else {
            comp.error_at(node, "overflow in constant expression".to_owned());
        }
        return false;
    };
    let typ = comp.sub(node, 2).map(|t| comp.copy_tree(t));
    let cnode = comp.new_const(node, typ, ConstData::Int(folded));
    comp.promote_chooks(node, cnode);
    comp.free_tree(node);
    *slot = cnode;
    false
}

fn codegen_dop(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let op = c_operator(comp, node);
    let lhs = comp.sub_expect(node, 0);
    let rhs = comp.sub_expect(node, 1);
    state.codegen().write("(");
    crate::backend::codegen::codegen_subtree(comp, state, lhs);
    state.codegen().write(&format!(" {op} "));
    crate::backend::codegen::codegen_subtree(comp, state, rhs);
    state.codegen().write(")");
    false
}

fn typecheck_mop(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    super::subtree_op(comp, state, node, 0, typecheck::typecheck_subtree);
    let operand = comp.sub_expect(node, 0);
    let Some(op_type) = comp.get_type(operand, None) else {
        comp.error_at(node, "untyped operand".to_owned());
        return false;
    };
    let gup = comp.gup();
    let result_type = if comp.tag_flag(node, TagFlags::BOOL_OP) {
        comp.create_from(gup.bool_type, node, &[])
    } else {
        comp.copy_tree(op_type)
    };
    comp.set_sub(node, 1, Some(result_type));
    false
}

fn gettype_mop(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetType { result, .. } = req {
        *result = comp.sub(node, 1);
        true
    } else {
        false
    }
}

/// Folds negation of a constant integer.
fn constprop_mop(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.neg {
        return false;
    }
    let operand = comp.sub_expect(node, 0);
    let Some(ConstData::Int(v)) = comp.const_val_of(operand) else {
        return false;
    };
    let Some(folded) = v.checked_neg() else { return false };
    let typ = comp.sub(node, 1).map(|t| comp.copy_tree(t));
    let cnode = comp.new_const(node, typ, ConstData::Int(folded));
    comp.promote_chooks(node, cnode);
    comp.free_tree(node);
    *slot = cnode;
    false
}

fn codegen_mop(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let sym = if comp.tree.tag(node) == gup.not_op { "!" } else { "-" };
    let operand = comp.sub_expect(node, 0);
    state.codegen().write(&format!("({sym}"));
    crate::backend::codegen::codegen_subtree(comp, state, operand);
    state.codegen().write(")");
    false
}
