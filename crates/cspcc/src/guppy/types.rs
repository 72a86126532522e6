//! Guppy's primitive and channel types: the langop query surface.

use crate::{
    backend::cccsp::ApiCall,
    compiler::Compiler,
    nodetype::TypeId,
    ops::{LangOp, LangReq},
    origin::OpOrigin,
    tree::NodeId,
};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:types");

pub(super) fn register_ops(comp: &mut Compiler, t_primtype: TypeId, t_chantype: TypeId) {
    comp.set_langop(t_primtype, LangOp::BytesFor, prim_bytes_for, ORIGIN);
    comp.set_langop(t_primtype, LangOp::IsSigned, prim_is_signed, ORIGIN);
    comp.set_langop(t_primtype, LangOp::IsType, is_type, ORIGIN);
    comp.set_langop(t_primtype, LangOp::IsDefPointer, prim_def_pointer, ORIGIN);
    comp.set_langop(t_primtype, LangOp::GetCTypeOf, prim_ctype, ORIGIN);
    comp.set_langop(t_primtype, LangOp::TypeActual, prim_type_actual, ORIGIN);
    comp.set_langop(t_primtype, LangOp::TypeHash, prim_type_hash, ORIGIN);
    comp.set_langop(t_primtype, LangOp::ValByRef, prim_val_by_ref, ORIGIN);
    comp.set_langop(t_primtype, LangOp::InitCall, prim_init_call, ORIGIN);
    comp.set_langop(t_primtype, LangOp::FreeCall, prim_free_call, ORIGIN);

    comp.set_langop(t_chantype, LangOp::BytesFor, chan_bytes_for, ORIGIN);
    comp.set_langop(t_chantype, LangOp::IsType, is_type, ORIGIN);
    comp.set_langop(t_chantype, LangOp::IsDefPointer, chan_def_pointer, ORIGIN);
    comp.set_langop(t_chantype, LangOp::GetCTypeOf, chan_ctype, ORIGIN);
    comp.set_langop(t_chantype, LangOp::TypeActual, chan_type_actual, ORIGIN);
    comp.set_langop(t_chantype, LangOp::TypeHash, chan_type_hash, ORIGIN);
    comp.set_langop(t_chantype, LangOp::InitCall, chan_init_call, ORIGIN);
    comp.set_langop(t_chantype, LangOp::GetSubType, chan_subtype, ORIGIN);
}

fn prim_bytes_for(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::BytesFor { result } = req else { return false };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    *result = Some(if tag == gup.byte_type {
        1
    } else if tag == gup.real_type {
        8
    } else {
        // int, bool, string (pointer), timer
        4
    });
    true
}

fn prim_is_signed(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::IsSigned { result } = req else { return false };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    *result = tag == gup.int_type || tag == gup.real_type;
    true
}

fn is_type(_comp: &mut Compiler, _node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::IsType { result } = req {
        *result = true;
        true
    } else {
        false
    }
}

fn prim_def_pointer(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::IsDefPointer { result } = req else { return false };
    let gup = comp.gup();
    // strings are carried as pointers; scalar types by value
    *result = i32::from(comp.tree.tag(node) == gup.string_type);
    true
}

fn prim_ctype(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::GetCTypeOf { result } = req else { return false };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    *result = Some(
        if tag == gup.byte_type {
            "unsigned char"
        } else if tag == gup.real_type {
            "double"
        } else if tag == gup.string_type {
            "GuppyString"
        } else if tag == gup.timer_type {
            "Time"
        } else {
            "int"
        }
        .to_owned(),
    );
    true
}

/// Primitive compatibility: identical types, or a BYTE actual promoting to
/// an INT formal.
fn prim_type_actual(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::TypeActual { actual, result, .. } = req else {
        return false;
    };
    let gup = comp.gup();
    let formal_tag = comp.tree.tag(node);
    let actual_tag = comp.tree.tag(*actual);
    if formal_tag == actual_tag || (formal_tag == gup.int_type && actual_tag == gup.byte_type) {
        *result = Some(node);
    }
    true
}

fn prim_type_hash(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::TypeHash { result } = req else { return false };
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    *result = if tag == gup.int_type {
        0x494e_5401
    } else if tag == gup.bool_type {
        0x424f_4f01
    } else if tag == gup.byte_type {
        0x4259_5401
    } else if tag == gup.real_type {
        0x5245_4c01
    } else if tag == gup.string_type {
        0x5354_5201
    } else {
        0x544d_5201
    };
    true
}

fn prim_val_by_ref(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::ValByRef { result } = req else { return false };
    let gup = comp.gup();
    *result = comp.tree.tag(node) == gup.string_type;
    true
}

/// Strings need runtime initialisation before first use.
fn prim_init_call(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::InitCall { var, result } = req else { return false };
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.string_type {
        return true;
    }
    let var = *var;
    let org = comp.tree.origin(var);
    let addr = crate::backend::cccsp::create_addrof(comp, var);
    *result = Some(super::new_apicall(comp, ApiCall::StrInit, vec![addr], org));
    true
}

fn prim_free_call(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::FreeCall { var, result } = req else { return false };
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.string_type {
        return true;
    }
    let var = *var;
    let org = comp.tree.origin(var);
    let addr = crate::backend::cccsp::create_addrof(comp, var);
    *result = Some(super::new_apicall(comp, ApiCall::StrFree, vec![addr], org));
    true
}

fn chan_bytes_for(_comp: &mut Compiler, _node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::BytesFor { result } = req {
        *result = Some(4);
        true
    } else {
        false
    }
}

fn chan_def_pointer(_comp: &mut Compiler, _node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::IsDefPointer { result } = req {
        *result = 1;
        true
    } else {
        false
    }
}

fn chan_ctype(_comp: &mut Compiler, _node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetCTypeOf { result } = req {
        *result = Some("Channel".to_owned());
        true
    } else {
        false
    }
}

/// Channel compatibility: an ANY-protocol formal accepts any channel;
/// otherwise protocols must agree.
fn chan_type_actual(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::TypeActual { actual, result, .. } = req else {
        return false;
    };
    let actual = *actual;
    if comp.tree.tag(actual) != comp.tree.tag(node) {
        return true;
    }
    let formal_proto = comp.sub(node, 0);
    let actual_proto = comp.sub(actual, 0);
    match (formal_proto, actual_proto) {
        (None, _) => *result = Some(node),
        (Some(f), Some(a)) => {
            if comp.type_actual(f, a).is_some() {
                *result = Some(node);
            }
        }
        (Some(_), None) => {}
    }
    true
}

fn chan_type_hash(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::TypeHash { result } = req else { return false };
    let proto_hash = match comp.sub(node, 0) {
        Some(proto) => comp.type_hash(proto),
        None => 0,
    };
    *result = 0x4348_414e ^ proto_hash.rotate_left(7);
    true
}

fn chan_init_call(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::InitCall { var, result } = req else { return false };
    let _ = node;
    let var = *var;
    let org = comp.tree.origin(var);
    let addr = crate::backend::cccsp::create_addrof(comp, var);
    *result = Some(super::new_apicall(comp, ApiCall::ChanInit, vec![addr], org));
    true
}

fn chan_subtype(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetSubType { result } = req {
        *result = comp.sub(node, 0);
        true
    } else {
        false
    }
}
