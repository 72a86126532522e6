//! The CCSP runtime API layer and the back-end node set.
//!
//! The runtime surface is a closed enumeration: every primitive the emitted
//! C may call, each with a fixed C-stack word cost that feeds the allocsize
//! computation. The back-end also owns the node types that carry target
//! data through namemap and reallocate: back-end names, blocks, workspace
//! nodes, and the workspace-pointer placeholder.

use strum::EnumCount;

use crate::{
    compiler::Compiler,
    constants::ConstData,
    nodetype::{TagFlags, TagId},
    ops::{CompOp, LangOp, LangReq},
    origin::{OpOrigin, Origin},
    passes::PassState,
    tree::{Hook, NodeId},
};

const ORIGIN: OpOrigin = OpOrigin::backend("cccsp");

/// Code-generation subtarget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Subtarget {
    #[default]
    Default,
    /// LEGO EV3: parallel processes are explicitly freed after the join.
    Ev3,
}

/// The closed set of runtime primitives.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
    strum::FromRepr,
    strum::IntoStaticStr,
)]
#[repr(u8)]
pub enum ApiCall {
    NoApi = 0,
    ChanIn = 1,
    ChanOut = 2,
    StopProc = 3,
    ProcPar = 4,
    LightProcInit = 5,
    ProcParam = 6,
    GetProcParam = 7,
    MemAlloc = 8,
    MemRelease = 9,
    MemReleaseChk = 10,
    StrInit = 11,
    StrFree = 12,
    StrAssign = 13,
    StrConcat = 14,
    StrClear = 15,
    ChanInit = 16,
    TimerRead = 17,
    TimerWait = 18,
    Shutdown = 19,
    AltStart = 20,
    AltEnd = 21,
    AltEnbc = 22,
    AltDisc = 23,
    AltWait = 24,
    ProcAlt = 25,
    LightProcFree = 26,
    ArrayInit = 27,
    ArrayInitAlloc = 28,
    ArrayFree = 29,
}

impl ApiCall {
    /// The C symbol the emitter writes for this primitive.
    #[must_use]
    pub fn c_name(self) -> &'static str {
        match self {
            Self::NoApi => "(noapi)",
            Self::ChanIn => "ChanIn",
            Self::ChanOut => "ChanOut",
            Self::StopProc => "StopProc",
            Self::ProcPar => "ProcPar",
            Self::LightProcInit => "LightProcInit",
            Self::ProcParam => "ProcParam",
            Self::GetProcParam => "GetProcParam",
            Self::MemAlloc => "MAlloc",
            Self::MemRelease => "MRelease",
            Self::MemReleaseChk => "MReleaseChk",
            Self::StrInit => "GuppyStringInit",
            Self::StrFree => "GuppyStringFree",
            Self::StrAssign => "GuppyStringAssign",
            Self::StrConcat => "GuppyStringConcat",
            Self::StrClear => "GuppyStringClear",
            Self::ChanInit => "ChanInit",
            Self::TimerRead => "TimerRead",
            Self::TimerWait => "TimerWait",
            Self::Shutdown => "Shutdown",
            Self::AltStart => "Alt",
            Self::AltEnd => "AltEnd",
            Self::AltEnbc => "AltEnbc",
            Self::AltDisc => "AltDisc",
            Self::AltWait => "AltWait",
            Self::ProcAlt => "ProcAlt",
            Self::LightProcFree => "LightProcFree",
            Self::ArrayInit => "GuppyArrayInit",
            Self::ArrayInitAlloc => "GuppyArrayInitAlloc",
            Self::ArrayFree => "GuppyArrayFree",
        }
    }

    /// C stack words this primitive needs, excluding its parameters.
    #[must_use]
    pub fn stack_words(self) -> i64 {
        match self {
            Self::NoApi => 0,
            Self::ProcParam | Self::GetProcParam | Self::ChanInit => 4,
            Self::StopProc | Self::TimerRead | Self::Shutdown => 8,
            Self::ChanIn
            | Self::ChanOut
            | Self::LightProcInit
            | Self::MemAlloc
            | Self::MemRelease
            | Self::MemReleaseChk
            | Self::StrInit
            | Self::StrFree
            | Self::StrClear
            | Self::TimerWait
            | Self::AltStart
            | Self::AltEnd
            | Self::AltEnbc
            | Self::AltDisc
            | Self::AltWait
            | Self::LightProcFree => 16,
            Self::StrAssign | Self::StrConcat | Self::ArrayInit | Self::ArrayFree => 24,
            Self::ProcPar | Self::ProcAlt | Self::ArrayInitAlloc => 32,
        }
    }

    /// Number of distinct primitives.
    #[must_use]
    pub fn count() -> usize {
        Self::COUNT
    }
}

/// One PAR arm's workspace bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParInfoEntry {
    /// Name node of the process-abstracted definition instanced by the arm.
    pub namenode: NodeId,
    /// Workspace reservation node for this instance.
    pub wsspace: NodeId,
}

/// Per-PAR workspace info, attached through the parinfo chook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParInfo {
    pub entries: Vec<ParInfoEntry>,
    /// Total workspace words across all arms (filled by reallocate).
    pub nwords: i64,
}

impl ParInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&mut self, entry: ParInfoEntry) {
        self.entries.push(entry);
    }
}

/// Mangles a definition name into its C entry symbol.
///
/// Process-abstracted wrappers get a distinct prefix so instance dispatch
/// and plain calls can never collide.
#[must_use]
pub fn make_entryname(name: &str, procabs: bool) -> String {
    let clean: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if procabs {
        format!("gproc_{clean}")
    } else {
        format!("gcf_{clean}")
    }
}

/// Back-end node tags, registered once at startup.
#[derive(Debug, Clone, Copy)]
pub struct CccspTags {
    /// Target name carrier: subs = (front-end name node, initialiser);
    /// hook = bytes + indirection.
    pub backend_name: TagId,
    /// Back-end block: subs = (statics list, body); hook = sizing.
    pub backend_block: TagId,
    /// The workspace-pointer placeholder of the enclosing process.
    pub wptr: TagId,
    /// A workspace reservation: hooks = (sizing, C identifier).
    pub workspace: TagId,
    /// Name of a runtime primitive: hook holds the call number.
    pub apicallname: TagId,
    /// Address-of wrapper: sub 0 is the operand.
    pub addrof: TagId,
    /// The not-a-process placeholder.
    pub notprocess: TagId,
}

/// Registers the back-end node set and its operations.
pub fn register(comp: &mut Compiler) {
    let t_name = comp.nodetypes.new_type("cccsp:name", 2, 0, 1);
    let backend_name = comp.nodetypes.new_tag("BACKENDNAME", t_name, TagFlags::empty());

    let t_block = comp.nodetypes.new_type("cccsp:block", 2, 0, 1);
    let backend_block = comp.nodetypes.new_tag("BACKENDBLOCK", t_block, TagFlags::empty());

    let t_wptr = comp.nodetypes.new_type("cccsp:wptr", 0, 0, 0);
    let wptr = comp.nodetypes.new_tag("WPTR", t_wptr, TagFlags::empty());

    let t_ws = comp.nodetypes.new_type("cccsp:workspace", 0, 0, 2);
    let workspace = comp.nodetypes.new_tag("WORKSPACE", t_ws, TagFlags::empty());

    let t_apiname = comp.nodetypes.new_type("cccsp:apicallname", 0, 0, 1);
    let apicallname = comp.nodetypes.new_tag("APICALLNAME", t_apiname, TagFlags::empty());

    let t_addrof = comp.nodetypes.new_type("cccsp:addrof", 1, 0, 0);
    let addrof = comp.nodetypes.new_tag("ADDROF", t_addrof, TagFlags::empty());

    let t_notprocess = comp.nodetypes.new_type("cccsp:notprocess", 0, 0, 0);
    let notprocess = comp.nodetypes.new_tag("NOTPROCESS", t_notprocess, TagFlags::empty());

    comp.set_compop(t_name, CompOp::Codegen, codegen_backend_name, ORIGIN);
    comp.set_langop(t_name, LangOp::GetCTypeOf, ctype_backend_name, ORIGIN);
    comp.set_compop(t_block, CompOp::Codegen, codegen_backend_block, ORIGIN);
    comp.set_compop(t_wptr, CompOp::Codegen, codegen_wptr, ORIGIN);
    comp.set_compop(t_ws, CompOp::Codegen, codegen_workspace, ORIGIN);
    comp.set_compop(t_apiname, CompOp::Codegen, codegen_apicallname, ORIGIN);
    comp.set_compop(t_addrof, CompOp::Codegen, codegen_addrof, ORIGIN);

    // the reserved core types emit through the back-end as well
    let t_list = comp.nodetypes.lookup_type("core:list").expect("core list type registered");
    comp.set_compop(t_list, CompOp::Codegen, codegen_core_list, ORIGIN);
    let t_const = comp.nodetypes.lookup_type("core:const").expect("core const type registered");
    comp.set_compop(t_const, CompOp::Codegen, codegen_core_const, ORIGIN);
    comp.set_langop(t_const, LangOp::GetType, gettype_core_const, ORIGIN);

    comp.cccsp = Some(CccspTags {
        backend_name,
        backend_block,
        wptr,
        workspace,
        apicallname,
        addrof,
        notprocess,
    });
}

// ==========================
// node builders

/// Creates the workspace-pointer placeholder node.
pub fn create_wptr(comp: &mut Compiler, org: Origin) -> NodeId {
    let tags = comp.ccsp();
    comp.new_node(tags.wptr, org)
}

/// Creates a named workspace reservation node.
pub fn create_workspace(comp: &mut Compiler, org: Origin, cname: &str) -> NodeId {
    let tags = comp.ccsp();
    let node = comp.new_node(tags.workspace, org);
    comp.set_hook(node, 0, Some(Hook::Workspace { nparams: 0, nwords: 0 }));
    comp.set_hook(node, 1, Some(Hook::Text(cname.to_owned())));
    node
}

/// Sets the parameter count a workspace must carry.
pub fn set_workspace_nparams(comp: &mut Compiler, ws: NodeId, nparams: i32) {
    if let Some(Hook::Workspace { nparams: p, .. }) = comp.hook_mut(ws, 0) {
        *p = nparams;
    } else {
        panic!("set_workspace_nparams on a non-workspace node");
    }
}

/// Sets the word count of a workspace reservation.
pub fn set_workspace_nwords(comp: &mut Compiler, ws: NodeId, nwords: i64) {
    if let Some(Hook::Workspace { nwords: w, .. }) = comp.hook_mut(ws, 0) {
        *w = nwords;
    } else {
        panic!("set_workspace_nwords on a non-workspace node");
    }
}

/// Reads `(nparams, nwords)` off a workspace reservation.
#[must_use]
pub fn workspace_sizes(comp: &Compiler, ws: NodeId) -> (i32, i64) {
    match comp.hook(ws, 0) {
        Some(Hook::Workspace { nparams, nwords }) => (*nparams, *nwords),
        _ => panic!("workspace_sizes on a non-workspace node"),
    }
}

/// C identifier of a workspace reservation.
#[must_use]
pub fn workspace_cname(comp: &Compiler, ws: NodeId) -> String {
    match comp.hook(ws, 1) {
        Some(Hook::Text(name)) => name.clone(),
        _ => panic!("workspace node without a name hook"),
    }
}

/// Creates the name node for a runtime primitive.
pub fn create_apicallname(comp: &mut Compiler, call: ApiCall) -> NodeId {
    let tags = comp.ccsp();
    let node = comp.new_node(tags.apicallname, Origin::BUILTIN);
    comp.set_hook(node, 0, Some(Hook::Const(ConstData::Int(i64::from(call as u8)))));
    node
}

/// The primitive named by an apicallname node.
#[must_use]
pub fn apicall_of(comp: &Compiler, node: NodeId) -> ApiCall {
    let tags = comp.ccsp();
    assert!(
        comp.tree.tag(node) == tags.apicallname,
        "apicall_of on [{}]",
        comp.tag_name_of(node)
    );
    match comp.hook(node, 0) {
        Some(Hook::Const(data)) => {
            let raw = u8::try_from(data.int_val()).expect("api call number fits u8");
            ApiCall::from_repr(raw).expect("api call number in range")
        }
        _ => panic!("apicallname node without a call number"),
    }
}

/// Stack words required by the primitive an API-call node invokes.
///
/// `call` is the call-number subnode of an APICALL node.
#[must_use]
pub fn stkwords_of_call(comp: &Compiler, callname: NodeId) -> i64 {
    apicall_of(comp, callname).stack_words()
}

/// Wraps a node in address-of.
pub fn create_addrof(comp: &mut Compiler, arg: NodeId) -> NodeId {
    let tags = comp.ccsp();
    comp.create_from(tags.addrof, arg, &[Some(arg)])
}

/// Creates a back-end name carrier for a front-end name node.
pub fn create_backend_name(comp: &mut Compiler, fename: NodeId, bytes: i64, indir: i32) -> NodeId {
    let tags = comp.ccsp();
    let node = comp.create_from(tags.backend_name, fename, &[Some(fename), None]);
    comp.set_hook(node, 0, Some(Hook::BackendName { bytes, indir }));
    node
}

/// Attaches an initialiser expression to a back-end name.
pub fn set_initialiser(comp: &mut Compiler, bename: NodeId, init: NodeId) {
    comp.set_sub(bename, 1, Some(init));
}

/// Sets the pointer-indirection level of a back-end name.
pub fn set_indir(comp: &mut Compiler, bename: NodeId, indir: i32) {
    if let Some(Hook::BackendName { indir: level, .. }) = comp.hook_mut(bename, 0) {
        *level = indir;
    } else {
        panic!("set_indir on a non-backend-name node");
    }
}

/// Pointer-indirection level of a back-end name.
#[must_use]
pub fn get_indir(comp: &Compiler, bename: NodeId) -> i32 {
    match comp.hook(bename, 0) {
        Some(Hook::BackendName { indir, .. }) => *indir,
        _ => panic!("get_indir on a non-backend-name node"),
    }
}

/// Creates a back-end block wrapping `body`, with an empty statics list.
pub fn create_backend_block(comp: &mut Compiler, body: NodeId, lexlevel: u32) -> NodeId {
    let tags = comp.ccsp();
    let org = comp.tree.origin(body);
    let statics = comp.new_list(org);
    let block = comp.create(tags.backend_block, org, &[Some(statics), Some(body)]);
    comp.set_hook(
        block,
        0,
        Some(Hook::Block {
            lexlevel,
            my_size: 0,
            nest_size: 0,
        }),
    );
    block
}

/// Reads `(my_size, nest_size)` off a back-end block.
#[must_use]
pub fn get_blockspace(comp: &Compiler, beblk: NodeId) -> (i64, i64) {
    match comp.hook(beblk, 0) {
        Some(Hook::Block { my_size, nest_size, .. }) => (*my_size, *nest_size),
        _ => panic!("get_blockspace on a non-block node"),
    }
}

/// Stores `(my_size, nest_size)` on a back-end block.
pub fn set_blockspace(comp: &mut Compiler, beblk: NodeId, my_size: i64, nest_size: i64) {
    if let Some(Hook::Block {
        my_size: m,
        nest_size: n,
        ..
    }) = comp.hook_mut(beblk, 0)
    {
        *m = my_size;
        *n = nest_size;
    } else {
        panic!("set_blockspace on a non-block node");
    }
}

// ==========================
// codegen operations for the back-end node set

fn codegen_backend_name(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let fename = comp.sub_expect(node, 0);
    let name = comp.get_name(fename).unwrap_or_else(|| "anon".to_owned());
    state.codegen().write(&name);
    false
}

fn ctype_backend_name(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    let LangReq::GetCTypeOf { result } = req else {
        return false;
    };
    let fename = comp.sub_expect(node, 0);
    *result = comp.ctype_of(fename);
    result.is_some()
}

fn codegen_backend_block(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let node = *slot;
    let (my_size, nest_size) = get_blockspace(comp, node);
    state.codegen().open_block();
    state
        .codegen()
        .comment(&format!("block: {my_size} own words, {nest_size} nested"));
    // statics: declarations mapped into this block
    let statics = comp.sub_expect(node, 0);
    for decl in comp.list_items(statics) {
        crate::backend::codegen::codegen_subtree(comp, state, decl);
    }
    if let Some(body) = comp.sub(node, 1) {
        crate::backend::codegen::codegen_subtree(comp, state, body);
    }
    state.codegen().close_block();
    false
}

fn codegen_wptr(_comp: &mut Compiler, state: &mut PassState, _slot: &mut NodeId) -> bool {
    state.codegen().write("wptr");
    false
}

fn codegen_workspace(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let name = workspace_cname(comp, *slot);
    state.codegen().write(&name);
    false
}

fn codegen_apicallname(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let call = apicall_of(comp, *slot);
    state.codegen().write(call.c_name());
    false
}

fn codegen_addrof(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let arg = comp.sub_expect(*slot, 0);
    state.codegen().write("&(");
    crate::backend::codegen::codegen_subtree(comp, state, arg);
    state.codegen().write(")");
    false
}

fn codegen_core_list(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    for item in comp.list_items(*slot) {
        crate::backend::codegen::codegen_subtree(comp, state, item);
    }
    false
}

fn codegen_core_const(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId) -> bool {
    let data = comp.const_data_of(*slot);
    let text = match data {
        ConstData::Bool(b) => if b { "1".to_owned() } else { "0".to_owned() },
        ConstData::Byte(b) => b.to_string(),
        ConstData::Int(i) => i.to_string(),
        ConstData::Ull(u) => format!("{u}ULL"),
        ConstData::Double(d) => crate::backend::codegen::CodeGen::format_double(d),
    };
    state.codegen().write(&text);
    false
}

fn gettype_core_const(comp: &mut Compiler, node: NodeId, req: &mut LangReq) -> bool {
    if let LangReq::GetType { result, .. } = req {
        *result = comp.sub(node, 0);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_apicall_enumeration_is_closed() {
        assert_eq!(ApiCall::count(), 30);
        for call in ApiCall::iter() {
            if call != ApiCall::NoApi {
                assert!(call.stack_words() > 0, "{call} has a cost");
                assert!(!call.c_name().is_empty());
            }
        }
        assert_eq!(ApiCall::from_repr(4), Some(ApiCall::ProcPar));
        assert_eq!(ApiCall::from_repr(26), Some(ApiCall::LightProcFree));
    }

    #[test]
    fn test_entryname_mangling_distinguishes_procabs() {
        assert_eq!(make_entryname("main", false), "gcf_main");
        assert_eq!(make_entryname("main", true), "gproc_main");
        assert_eq!(make_entryname("do.thing", false), "gcf_do_thing");
    }
}
