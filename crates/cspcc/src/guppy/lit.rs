//! Literals: construction, typing, folding, and emission.
//!
//! Integer/bool/real literals fold into generic constant nodes during
//! constprop; string literals stay as literal nodes and are lifted to
//! file scope through the precode machinery.

use crate::{
    compiler::Compiler,
    constants::ConstData,
    nodetype::TypeId,
    ops::{CompOp, LangOp, LangReq},
    origin::{OpOrigin, Origin},
    passes::PassState,
    tree::{Hook, NodeId},
};

const ORIGIN: OpOrigin = OpOrigin::frontend("guppy:lit");

pub(super) fn register_ops(comp: &mut Compiler, t_lit: TypeId) {
    comp.set_compop(t_lit, CompOp::Typecheck, typecheck_lit, ORIGIN);
    comp.set_compop(t_lit, CompOp::Constprop, constprop_lit, ORIGIN);
    comp.set_compop(t_lit, CompOp::Precode, precode_lit, ORIGIN);
    comp.set_compop(t_lit, CompOp::Codegen, codegen_lit, ORIGIN);
    comp.set_compop(t_lit, CompOp::Fetrans15, super::decls::fetrans15_value, ORIGIN);
    comp.set_langop(t_lit, LangOp::GetType, gettype_lit, ORIGIN);
    comp.set_langop(t_lit, LangOp::IsConst, isconst_lit, ORIGIN);
    comp.set_langop(t_lit, LangOp::ConstValOf, constvalof_lit, ORIGIN);
}

/// Creates an integer literal, typed INT.
pub fn new_litint(comp: &mut Compiler, org: Origin, value: i64) -> NodeId {
    let gup = comp.gup();
    let typ = comp.new_node(gup.int_type, org);
    let node = comp.create(gup.litint, org, &[Some(typ)]);
    comp.set_hook(node, 0, Some(Hook::Const(ConstData::Int(value))));
    node
}

/// Creates a boolean literal, typed BOOL.
pub fn new_litbool(comp: &mut Compiler, org: Origin, value: bool) -> NodeId {
    let gup = comp.gup();
    let typ = comp.new_node(gup.bool_type, org);
    let node = comp.create(gup.litbool, org, &[Some(typ)]);
    comp.set_hook(node, 0, Some(Hook::Const(ConstData::Bool(value))));
    node
}

/// Creates a real literal, typed REAL.
pub fn new_litreal(comp: &mut Compiler, org: Origin, value: f64) -> NodeId {
    let gup = comp.gup();
    let typ = comp.new_node(gup.real_type, org);
    let node = comp.create(gup.litreal, org, &[Some(typ)]);
    comp.set_hook(node, 0, Some(Hook::Const(ConstData::Double(value))));
    node
}

/// Creates a string literal from decoded bytes, typed STRING.
pub fn new_litstr(comp: &mut Compiler, org: Origin, bytes: Vec<u8>) -> NodeId {
    let gup = comp.gup();
    let typ = comp.new_node(gup.string_type, org);
    let node = comp.create(gup.litstr, org, &[Some(typ)]);
    comp.set_hook(node, 0, Some(Hook::Bytes(bytes)));
    node
}

fn gettype_lit(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetType { result, .. } = req {
        *result = comp.sub(node, 0);
        true
    } else {
        false
    }
}

fn isconst_lit(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::IsConst { result } = req else { return false };
    let gup = comp.gup();
    *result = comp.tree.tag(node) != gup.litstr;
    true
}

fn constvalof_lit(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::ConstValOf { result } = req else { return false };
    if let Some(Hook::Const(data)) = comp.hook(node, 0) {
        *result = Some(*data);
    }
    true
}

/// Range-checks integer literals against their declared width.
fn typecheck_lit(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) == gup.litint
        && let Some(Hook::Const(data)) = comp.hook(node, 0)
    {
        let data = *data;
        if let Some(typ) = comp.sub(node, 0) {
            let tag = comp.tree.tag(typ);
            let (signed, bits) = if tag == gup.byte_type { (false, 8) } else { (true, 32) };
            if !data.fits(signed, bits) {
                let value = data.int_val();
                comp.warn_at(node, format!("literal {value} out of range, truncated to {bits} bits"));
            }
        }
    }
    false
}

/// Folds scalar literals into generic constant nodes.
fn constprop_lit(comp: &mut Compiler, _state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) == gup.litstr {
        return false;
    }
    let Some(Hook::Const(data)) = comp.hook(node, 0) else {
        return false;
    };
    let data = *data;
    let typ = comp.sub(node, 0);
    // keep the type node on the constant; detach before freeing the shell
    let folded = comp.new_const(node, typ, data);
    comp.set_sub(node, 0, None);
    comp.promote_chooks(node, folded);
    comp.free_tree(node);
    *slot = folded;
    false
}

/// Queues string literals for file-scope emission, naming them.
fn precode_lit(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    if comp.tree.tag(node) != gup.litstr {
        return false;
    }
    if comp.hook(node, 1).is_none() {
        let cname = comp.names.temp_ident("slit");
        comp.set_hook(node, 1, Some(Hook::Text(cname)));
        state.precode().items.push(node);
    }
    false
}

fn codegen_lit(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let gup = comp.gup();
    let tag = comp.tree.tag(node);
    if tag == gup.litstr {
        let cname = match comp.hook(node, 1) {
            Some(Hook::Text(name)) => name.clone(),
            _ => {
                state.codegen().error_count += 1;
                return false;
            }
        };
        if state.codegen().filescope {
            let bytes = match comp.hook(node, 0) {
                Some(Hook::Bytes(b)) => b.clone(),
                _ => Vec::new(),
            };
            let escaped: String = bytes.iter().flat_map(|&b| std::ascii::escape_default(b)).map(char::from).collect();
            state
                .codegen()
                .insert_filescope(&format!("static const char {cname}[] = \"{escaped}\";\n"));
        } else {
            state.codegen().write(&cname);
        }
        return false;
    }
    match comp.hook(node, 0) {
        Some(Hook::Const(ConstData::Int(v))) => state.codegen().write(&v.to_string()),
        Some(Hook::Const(ConstData::Byte(v))) => state.codegen().write(&v.to_string()),
        Some(Hook::Const(ConstData::Bool(v))) => state.codegen().write(if *v { "1" } else { "0" }),
        Some(Hook::Const(ConstData::Ull(v))) => state.codegen().write(&format!("{v}ULL")),
        Some(Hook::Const(ConstData::Double(v))) => {
            let text = crate::backend::codegen::CodeGen::format_double(*v);
            state.codegen().write(&text);
        }
        _ => state.codegen().error_count += 1,
    }
    false
}
