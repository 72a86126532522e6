//! The pass driver: orders the tree-rewriting passes and carries their
//! states.
//!
//! Every pass is a deterministic tree walk that dispatches one compop;
//! passes never fail — they record diagnostics, and the driver checks the
//! accumulated error count between passes, refusing code emission once any
//! error exists.

pub mod fetrans;
pub mod scope;
pub mod typecheck;
pub mod usagecheck;

use crate::{
    backend::{
        alloc::{self, DcgState, PreallocState, ReallocState},
        codegen::{self, CodeGen},
        map::MapState,
    },
    chook::Chook,
    compiler::Compiler,
    ops::CompOp,
    report::{CompileError, Severity},
    tree::NodeId,
};

pub use fetrans::{BetransState, Fetrans1State, Fetrans2State, Fetrans3State, Fetrans15State, FetransState};
pub use scope::{CrossScope, ScopeState};
pub use typecheck::TypecheckState;

/// State for the prescope walk.
#[derive(Debug, Default)]
pub struct PrescopeState {
    pub lexlevel: u32,
}

/// Collected file-scope emissions from the precode walk.
#[derive(Debug, Default)]
pub struct PrecodeState {
    pub items: Vec<NodeId>,
}

/// The state passed to every compop, one variant per pass.
///
/// Implementations fetch their pass's state through the accessors, which
/// treat a mismatch as a violated compiler invariant.
#[derive(Debug)]
pub enum PassState {
    Prescope(PrescopeState),
    Scope(ScopeState),
    Declify,
    Autoseq,
    Flattenseq,
    Typecheck(TypecheckState),
    Typeresolve,
    Constprop,
    Precheck,
    Premap,
    Bemap,
    Fetrans(FetransState),
    Fetrans1(Fetrans1State),
    Fetrans15(Fetrans15State),
    Fetrans2(Fetrans2State),
    Fetrans3(Fetrans3State),
    Betrans(BetransState),
    Namemap(MapState),
    Preallocate(PreallocState),
    Dcg(DcgState),
    Reallocate(ReallocState),
    Precode(PrecodeState),
    Codegen(CodeGen),
}

macro_rules! state_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        /// # Panics
        /// Panics when called under a different pass (compiler bug).
        pub fn $fn_name(&mut self) -> &mut $ty {
            match self {
                Self::$variant(s) => s,
                other => panic!(concat!("pass state mismatch: wanted ", stringify!($variant), ", got {:?}"), other),
            }
        }
    };
}

impl PassState {
    state_accessor!(prescope, Prescope, PrescopeState);
    state_accessor!(scope, Scope, ScopeState);
    state_accessor!(typecheck, Typecheck, TypecheckState);
    state_accessor!(fetrans, Fetrans, FetransState);
    state_accessor!(fetrans1, Fetrans1, Fetrans1State);
    state_accessor!(fetrans15, Fetrans15, Fetrans15State);
    state_accessor!(fetrans2, Fetrans2, Fetrans2State);
    state_accessor!(fetrans3, Fetrans3, Fetrans3State);
    state_accessor!(namemap, Namemap, MapState);
    state_accessor!(preallocate, Preallocate, PreallocState);
    state_accessor!(dcg, Dcg, DcgState);
    state_accessor!(reallocate, Reallocate, ReallocState);
    state_accessor!(precode, Precode, PrecodeState);
    state_accessor!(codegen, Codegen, CodeGen);
}

/// Drives one compop over a subtree, pre-order, descending unless the op
/// says otherwise. Nodes without the op just descend.
pub fn compop_walk(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId, op: CompOp) {
    let descend = comp.call_compop(state, slot, op).unwrap_or(true);
    if descend {
        comp.for_each_child_slot(*slot, &mut |c, child| compop_walk(c, state, child, op));
    }
}

/// Drives one compop post-order: children first, then the node.
pub fn compop_postwalk(comp: &mut Compiler, state: &mut PassState, slot: &mut NodeId, op: CompOp) {
    comp.for_each_child_slot(*slot, &mut |c, child| compop_postwalk(c, state, child, op));
    let _ = comp.call_compop(state, slot, op);
}

/// Final product of the pipeline.
#[derive(Debug)]
pub struct CodegenOutput {
    pub c_code: String,
    /// Lower-hex SHA-256 of the emitted bytes, when requested.
    pub digest: Option<String>,
}

fn check_errors(comp: &Compiler, pass: &'static str) -> Result<(), CompileError> {
    let count = comp.reporter.error_count();
    if count > 0 {
        Err(CompileError::ErrorsReported { pass, count })
    } else {
        Ok(())
    }
}

/// Runs the full pass pipeline over a tree.
///
/// Returns the emitted C (plus optional digest), or `None` when
/// `--stop-after` ended the pipeline early.
pub fn run_pipeline(comp: &mut Compiler, root: &mut NodeId) -> Result<Option<CodegenOutput>, CompileError> {
    macro_rules! pass {
        ($name:literal, $body:expr) => {{
            comp.tracer.on_pass_start($name);
            $body;
            let errors = comp.reporter.error_count();
            comp.tracer.on_pass_end($name, errors);
            if comp.opts.dump_tree {
                let dump = comp.dump_tree(*root);
                comp.report(Severity::Message, None, format!("tree after {}:\n{}", $name, dump));
            }
            check_errors(comp, $name)?;
            if comp.opts.stop_after.as_deref() == Some($name) {
                return Ok(None);
            }
        }};
    }

    pass!("prescope", {
        let mut state = PassState::Prescope(PrescopeState::default());
        compop_walk(comp, &mut state, root, CompOp::Prescope);
    });

    pass!("scope", {
        let mut state = PassState::Scope(ScopeState::new());
        scope::scope_subtree(comp, &mut state, root);
    });

    pass!("declify", {
        let mut state = PassState::Declify;
        compop_walk(comp, &mut state, root, CompOp::Declify);
    });

    pass!("autoseq", {
        let mut state = PassState::Autoseq;
        compop_walk(comp, &mut state, root, CompOp::Autoseq);
    });

    pass!("flattenseq", {
        let mut state = PassState::Flattenseq;
        compop_postwalk(comp, &mut state, root, CompOp::Flattenseq);
    });

    pass!("typecheck", {
        let mut state = PassState::Typecheck(TypecheckState::default());
        compop_walk(comp, &mut state, root, CompOp::Typecheck);
    });

    pass!("typeresolve", {
        let mut state = PassState::Typeresolve;
        compop_walk(comp, &mut state, root, CompOp::Typeresolve);
    });

    pass!("constprop", {
        let mut state = PassState::Constprop;
        compop_postwalk(comp, &mut state, root, CompOp::Constprop);
    });

    pass!("precheck", {
        let mut state = PassState::Precheck;
        compop_walk(comp, &mut state, root, CompOp::Precheck);
    });

    pass!("usagecheck", {
        usagecheck::usagecheck_tree(comp, *root);
    });

    pass!("fetrans", {
        let mut state = PassState::Fetrans(FetransState::default());
        compop_walk(comp, &mut state, root, CompOp::Fetrans);
        let PassState::Fetrans(fe) = state else { unreachable!() };
        // definitions generated for PAR arms join the module list; their
        // bodies may hold nested PARs, so keep transforming until no new
        // definitions appear
        let mut batch = fe.new_defs;
        while !batch.is_empty() {
            let mut state = PassState::Fetrans(FetransState::default());
            for def in &mut batch {
                compop_walk(comp, &mut state, def, CompOp::Fetrans);
            }
            fetrans::splice_new_definitions(comp, root, batch);
            let PassState::Fetrans(fe) = state else { unreachable!() };
            batch = fe.new_defs;
        }
    });

    pass!("fetrans1", {
        let mut state = PassState::Fetrans1(Fetrans1State::default());
        compop_walk(comp, &mut state, root, CompOp::Fetrans1);
    });

    pass!("fetrans15", {
        let mut state = PassState::Fetrans15(Fetrans15State::default());
        compop_walk(comp, &mut state, root, CompOp::Fetrans15);
    });

    pass!("fetrans2", {
        let mut state = PassState::Fetrans2(Fetrans2State);
        compop_walk(comp, &mut state, root, CompOp::Fetrans2);
    });

    pass!("fetrans3", {
        let mut state = PassState::Fetrans3(Fetrans3State::default());
        compop_walk(comp, &mut state, root, CompOp::Fetrans3);
    });

    pass!("betrans", {
        let mut state = PassState::Betrans(BetransState);
        compop_walk(comp, &mut state, root, CompOp::Betrans);
    });

    pass!("premap", {
        let mut state = PassState::Premap;
        compop_walk(comp, &mut state, root, CompOp::Premap);
    });

    pass!("namemap", {
        let mut state = PassState::Namemap(MapState::new());
        compop_walk(comp, &mut state, root, CompOp::Namemap);
    });

    pass!("bemap", {
        let mut state = PassState::Bemap;
        compop_walk(comp, &mut state, root, CompOp::Bemap);
    });

    pass!("preallocate", {
        let mut state = PassState::Preallocate(PreallocState::default());
        alloc::preallocate_subtree(comp, &mut state, *root);
    });

    pass!("dcg", {
        let mut state = PassState::Dcg(DcgState::default());
        load_sfi_side_files(comp)?;
        alloc::dcg_subtree(comp, &mut state, *root);
    });

    pass!("dcgfix", {
        match comp.sfi.calc_alloc() {
            Ok(warnings) => {
                for warning in warnings {
                    comp.report(Severity::Warning, None, warning);
                }
            }
            Err(err) => {
                comp.report(Severity::Error, None, err.to_string());
            }
        }
    });

    pass!("reallocate", {
        let mut state = PassState::Reallocate(ReallocState::default());
        alloc::reallocate_subtree(comp, &mut state, root);
    });

    let precode_items = {
        let mut state = PassState::Precode(PrecodeState::default());
        comp.tracer.on_pass_start("precode");
        compop_walk(comp, &mut state, root, CompOp::Precode);
        // queued precode chooks contribute as well
        let mut items = match state {
            PassState::Precode(p) => p.items,
            _ => unreachable!(),
        };
        collect_precode_chooks(comp, *root, &mut items);
        comp.tracer.on_pass_end("precode", comp.reporter.error_count());
        check_errors(comp, "precode")?;
        if comp.opts.stop_after.as_deref() == Some("precode") {
            return Ok(None);
        }
        items
    };

    // codegen
    comp.tracer.on_pass_start("codegen");
    let mut cg = CodeGen::new(comp.opts.subtarget, comp.opts.codegen_digest);
    cg.comment("generated by cspcc");
    cg.line("#include <cccsp.h>");
    cg.line("");
    cg.set_insert_point_here();
    let mut state = PassState::Codegen(cg);
    state.codegen().filescope = true;
    for item in precode_items {
        codegen::codegen_subtree(comp, &mut state, item);
    }
    state.codegen().filescope = false;
    codegen::codegen_subtree(comp, &mut state, *root);
    let PassState::Codegen(mut cg) = state else { unreachable!() };
    if let Some(entry) = cg.toplevel_entry.take() {
        cg.line("");
        cg.line("void cccsp_register_toplevel (void)");
        cg.open_block();
        cg.line(&format!("SetToplevelProcess ({entry});"));
        cg.close_block();
    }
    if cg.error_count > 0 {
        let count = cg.error_count;
        comp.report(Severity::Error, None, format!("{count} code-generation failure(s)"));
    }
    comp.tracer.on_pass_end("codegen", comp.reporter.error_count());
    check_errors(comp, "codegen")?;

    let (c_code, digest) = cg.finish();
    Ok(Some(CodegenOutput { c_code, digest }))
}

/// Loads the SFI side files named in the options, if any.
fn load_sfi_side_files(comp: &mut Compiler) -> Result<(), CompileError> {
    let calls = comp.opts.sfi_calls_file.clone();
    let usage = comp.opts.sfi_usage_file.clone();
    if let Some(path) = calls {
        let text = std::fs::read_to_string(&path).map_err(|e| CompileError::External(format!("{path}: {e}")))?;
        if let Err(err) = comp.sfi.load_calls(&text) {
            comp.report(Severity::Error, None, format!("{path}: {err}"));
        }
    }
    if let Some(path) = usage {
        let text = std::fs::read_to_string(&path).map_err(|e| CompileError::External(format!("{path}: {e}")))?;
        if let Err(err) = comp.sfi.load_usage(&text) {
            comp.report(Severity::Error, None, format!("{path}: {err}"));
        }
    }
    Ok(())
}

/// Gathers nodes queued through the precode chook anywhere in the tree.
fn collect_precode_chooks(comp: &mut Compiler, root: NodeId, items: &mut Vec<NodeId>) {
    let precode = comp.core_chooks.precode;
    let mut found = Vec::new();
    comp.prewalk(root, &mut |c, n| {
        if let Some(Chook::Precode(queued)) = c.chook(n, precode) {
            found.extend_from_slice(queued);
        }
        true
    });
    items.extend(found);
}
