//! Stack sizing: the SFI allocsize fixpoint, PAR workspace summation, and
//! back-end name indirection.

use cspcc::{
    CompOpts, Compiler, NodeId, Origin, PassState, SfiError, SfiTable,
    backend::{alloc::{self, ReallocState}, cccsp, map},
    chook::Chook,
    compile_tree,
};

#[test]
fn allocsize_closes_over_the_call_graph() {
    let mut sfi = SfiTable::new();
    sfi.load_calls("top: mid other\nmid: leaf\nother: leaf\n").expect("parses");
    sfi.load_usage("leaf 12 static\nmid 20 static\nother 60 static\ntop 8 static\n")
        .expect("parses");
    sfi.calc_alloc().expect("acyclic");

    // allocsize(v) == framesize(v) + max over children
    assert_eq!(sfi.get("leaf").expect("leaf").allocsize, 12);
    assert_eq!(sfi.get("mid").expect("mid").allocsize, 32);
    assert_eq!(sfi.get("other").expect("other").allocsize, 72);
    assert_eq!(sfi.get("top").expect("top").allocsize, 80);
}

#[test]
fn recursion_has_no_fixpoint_and_is_reported() {
    let mut sfi = SfiTable::new();
    sfi.add_child("f", "f");
    sfi.get_mut("f").expect("f").framesize = 8;
    assert!(matches!(sfi.calc_alloc(), Err(SfiError::Recursion { .. })));
}

/// Two arms whose allocsizes are 12 and 20 words produce a PAR whose
/// nwords is 32 and a maxpar contribution of 32.
#[test]
fn par_workspace_summation() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let gup = comp.gup();
    let org = Origin::BUILTIN;

    // arm definitions known to the SFI table: 48 and 80 bytes
    comp.sfi.lookup_or_new("gproc_p1").allocsize = 48;
    comp.sfi.lookup_or_new("gproc_p2").allocsize = 80;

    let (p1, _) = cspcc::guppy::declare_name(&mut comp, "p1", gup.npfcndef, None, None, 0, org);
    let (p2, _) = cspcc::guppy::declare_name(&mut comp, "p2", gup.npfcndef, None, None, 0, org);

    let body = comp.new_list(org);
    let mut parinfo = cccsp::ParInfo::new();
    for id in [p1, p2] {
        let nn = cspcc::guppy::name_ref(&mut comp, id, org);
        let args = comp.new_list(org);
        let wsname = comp.names.temp_ident("wsp");
        let ws = cccsp::create_workspace(&mut comp, org, &wsname);
        let inst = comp.create(gup.ppinstance, org, &[Some(nn), Some(ws), Some(args)]);
        comp.list_add(body, inst);
        parinfo.link(cccsp::ParInfoEntry { namenode: nn, wsspace: ws });
    }
    let par = comp.create(gup.par, org, &[None, Some(body)]);
    comp.set_chook(par, comp.core_chooks.parinfo, Chook::ParInfo(parinfo));

    let mut state = PassState::Reallocate(ReallocState::default());
    let mut slot = par;
    alloc::reallocate_subtree(&mut comp, &mut state, &mut slot);

    let Some(Chook::ParInfo(parinfo)) = comp.chook(par, comp.core_chooks.parinfo) else {
        panic!("parinfo survives reallocation");
    };
    assert_eq!(parinfo.nwords, 32, "12 + 20 words");
    let (_, w1) = cccsp::workspace_sizes(&comp, parinfo.entries[0].wsspace);
    let (_, w2) = cccsp::workspace_sizes(&comp, parinfo.entries[1].wsspace);
    assert_eq!(w1, 12);
    assert_eq!(w2, 20);
    assert_eq!(state.reallocate().maxpar, 32);
}

/// A formal parameter's indirection is its type's default pointer level,
/// plus one when it is a result or modifiable parameter.
#[test]
fn formal_parameter_indirection() {
    let src = "def f (int a, var int b, chan (int) c) -> int\n  return a\n";
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let file = comp.files.open("indir.gpp");
    let mut root = cspcc::guppy::parse::parse_module(&mut comp, src, file);
    let result = compile_tree(&mut comp, &mut root);
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));

    let gup = comp.gup();
    let def = comp
        .list_items(root)
        .into_iter()
        .find(|&d| comp.tree.tag(d) == gup.fcndef)
        .expect("definition present");
    let params = comp.list_items(comp.sub_expect(def, 1));
    let fparams: Vec<NodeId> = params
        .into_iter()
        .filter(|&p| comp.tree.tag(p) == gup.fparam)
        .collect();
    assert_eq!(fparams.len(), 4, "a, b, c plus the lowered result");

    let indir_of = |comp: &Compiler, p: NodeId| map::indir_of(comp, comp.sub_expect(p, 0));
    assert_eq!(indir_of(&comp, fparams[0]), 0, "plain value parameter");
    assert_eq!(indir_of(&comp, fparams[1]), 1, "modifiable adds one level");
    assert_eq!(indir_of(&comp, fparams[2]), 1, "channels default to pointer");
    assert_eq!(indir_of(&comp, fparams[3]), 1, "results add one level");
}

/// After a full compile, every PAR arm's workspace words cover the arm's
/// padded allocsize.
#[test]
fn end_to_end_par_allocation() {
    let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! 1\n    c ? x\n";
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let file = comp.files.open("par.gpp");
    let mut root = cspcc::guppy::parse::parse_module(&mut comp, src, file);
    let result = compile_tree(&mut comp, &mut root);
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));

    let gup = comp.gup();
    let mut pars = Vec::new();
    comp.prewalk(root, &mut |c, n| {
        if c.tree.tag(n) == gup.par {
            pars.push(n);
        }
        true
    });
    assert_eq!(pars.len(), 1);
    let Some(Chook::ParInfo(parinfo)) = comp.chook(pars[0], comp.core_chooks.parinfo) else {
        panic!("mapped PAR carries parinfo");
    };
    assert_eq!(parinfo.entries.len(), 2);
    let mut sum = 0;
    for entry in &parinfo.entries {
        let (_, nwords) = cccsp::workspace_sizes(&comp, entry.wsspace);
        assert!(nwords > 0, "arm workspace was sized");
        sum += nwords;
    }
    assert_eq!(parinfo.nwords, sum, "PAR total is the sum of its arms");

    // the generated arm entries exist in the SFI table with closed sizes
    for entry in comp.sfi.iter().filter(|e| e.name.starts_with("gproc_parproc")) {
        assert!(entry.allocsize >= entry.framesize);
        assert!(entry.framesize > 0, "lpreallocate seeded a frame estimate");
    }
}
