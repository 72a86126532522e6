//! Name-mapping support: turning front-end declarations into back-end name
//! carriers.
//!
//! The front-end's namemap operations decide *what* to map; the helpers here
//! decide *how*: sizing from the type's byte count, indirection chosen by
//! the declaring construct, and the mapchook link so later references find
//! their carrier. The chook lives on the name's canonical reference node,
//! so every use-site copy resolves to the same carrier.

use crate::{
    backend::cccsp::{self, ParInfoEntry},
    chook::Chook,
    compiler::Compiler,
    tree::NodeId,
};

/// State threaded through the namemap pass.
#[derive(Debug, Default)]
pub struct MapState {
    pub lexlevel: u32,
    /// Extra indirection requested by the construct being mapped.
    pub target_indir: i32,
    /// Workspace-pointer node of the process being mapped.
    pub process_id: Option<NodeId>,
    /// Mapping a formal-parameter list (parameters get the workspace
    /// parameter inserted ahead of them).
    pub inparamlist: bool,
    /// The PAR-arm entry being mapped, when inside a PAR.
    pub thisentry: Option<ParInfoEntry>,
}

impl MapState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The canonical reference node of the name a reference points at.
///
/// Non-name nodes (constants, expressions) resolve to themselves, which
/// carry no mapchook and therefore no indirection.
fn canonical_of(comp: &Compiler, fename: NodeId) -> NodeId {
    match comp.name_slot_of_namenode(fename) {
        Some(id) => comp.names.get(id).namenode.unwrap_or(fename),
        None => fename,
    }
}

/// Creates (and links) the back-end name for a front-end name node.
///
/// Sizing comes from the name's type; `indir` is decided by the declaring
/// construct: locals carry concrete storage (0), formals carry the type's
/// default pointer level plus 1 when result or modifiable.
pub fn create_ename(comp: &mut Compiler, fename: NodeId, indir: i32) -> NodeId {
    let name_id = comp.name_expect(fename, 0);
    let typ = comp.names.get(name_id).typ;
    let bytes = match typ {
        Some(t) => comp.bytes_for(t).unwrap_or(4),
        None => 4,
    };
    let canonical = canonical_of(comp, fename);
    let bename = cccsp::create_backend_name(comp, canonical, bytes, indir);
    comp.set_chook(canonical, comp.core_chooks.mapchook, Chook::BackendName(bename));
    bename
}

/// The back-end carrier previously mapped for a name reference.
#[must_use]
pub fn backend_name_of(comp: &Compiler, fename: NodeId) -> Option<NodeId> {
    let canonical = canonical_of(comp, fename);
    match comp.chook(canonical, comp.core_chooks.mapchook) {
        Some(Chook::BackendName(bename)) => Some(*bename),
        _ => None,
    }
}

/// Pointer-indirection level a name reference carries (0 when unmapped).
#[must_use]
pub fn indir_of(comp: &Compiler, fename: NodeId) -> i32 {
    backend_name_of(comp, fename).map_or(0, |be| cccsp::get_indir(comp, be))
}
