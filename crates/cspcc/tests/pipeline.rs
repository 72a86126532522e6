//! End-to-end pipeline scenarios: structural flattening, PAR splitting,
//! return lowering, and full C emission.

use cspcc::{CompOpts, Compiler, NodeId, compile_source, compile_tree};

fn run_until(src: &str, stop_after: &str) -> (Compiler, NodeId) {
    let mut opts = CompOpts::default();
    opts.stop_after = Some(stop_after.to_owned());
    let mut comp = Compiler::new_guppy(opts);
    let file = comp.files.open("test.gpp");
    let mut root = cspcc::guppy::parse::parse_module(&mut comp, src, file);
    assert_eq!(comp.reporter.error_count(), 0, "{}", comp.reporter.render_all(&comp.files));
    let result = compile_tree(&mut comp, &mut root);
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));
    (comp, root)
}

/// `seq [ seq [ skip ], output(c, 1) ]` flattens to a single containing
/// seq with the inner singleton unwrapped.
#[test]
fn seq_flattening() {
    let src = "def main ()\n  chan (int) c\n  seq\n    seq\n      skip\n    c ! 1\n";
    let (comp, root) = run_until(src, "flattenseq");
    let gup = comp.gup();

    let def = comp.list_nth(root, 0);
    // declarations nested into a block, body autoseq'd then flattened
    let block = comp.sub_expect(def, 2);
    assert_eq!(comp.tag_name_of(block), "DECLBLOCK");
    let body = comp.sub_expect(block, 1);
    assert_eq!(comp.tree.tag(body), gup.seq, "one containing seq");
    let items = comp.list_items(comp.sub_expect(body, 1));
    assert_eq!(items.len(), 2);
    assert_eq!(comp.tree.tag(items[0]), gup.skip, "inner singleton unwrapped");
    assert_eq!(comp.tree.tag(items[1]), gup.output);
}

/// A PAR whose arms capture `(c, x)` and `(c, y)` produces two generated
/// process definitions parameterised by those captures; the arms become
/// PPINSTANCE nodes and the enclosing function gains no parameters.
#[test]
fn par_free_variable_capture() {
    let src = "def main ()\n  chan (int) c\n  int x\n  int y\n  par\n    c ! x\n    c ? y\n";
    let (mut comp, root) = run_until(src, "fetrans");
    let gup = comp.gup();

    // generated definitions joined the module list
    let defs = comp.list_items(root);
    let pfcndefs: Vec<NodeId> = defs
        .iter()
        .copied()
        .filter(|&d| comp.tree.tag(d) == gup.pfcndef)
        .collect();
    // two PAR arms plus the public wrapper for main
    assert_eq!(pfcndefs.len(), 3, "{}", comp.dump_tree(root));

    let main_def = defs
        .iter()
        .copied()
        .find(|&d| comp.tree.tag(d) == gup.fcndef)
        .expect("main survives");
    let main_params = comp.sub_expect(main_def, 1);
    assert_eq!(comp.list_count(main_params), 0, "main gains no parameters");

    // find the PAR and check its arms
    let mut par = None;
    comp.prewalk(main_def, &mut |c, n| {
        if c.tree.tag(n) == gup.par {
            par = Some(n);
        }
        true
    });
    let par = par.expect("PAR survives fetrans");
    let arms = comp.list_items(comp.sub_expect(par, 1));
    assert_eq!(arms.len(), 2);
    for arm in &arms {
        assert_eq!(comp.tree.tag(*arm), gup.ppinstance);
        assert!(comp.sub(*arm, 1).is_none(), "workspace slot filled later, by namemap");
    }
    // arm 1 captured (c, x); arm 2 captured (c, y)
    let arg_idents = |arm: NodeId| -> Vec<String> {
        comp.list_items(comp.sub_expect(arm, 2))
            .into_iter()
            .map(|a| {
                let id = comp.name_slot_of_namenode(a).expect("argument is a name reference");
                comp.names.ident(id).to_owned()
            })
            .collect()
    };
    assert_eq!(arg_idents(arms[0]), vec!["c", "x"]);
    assert_eq!(arg_idents(arms[1]), vec!["c", "y"]);

    // each generated definition takes exactly its captures as formals
    let arm_defs: Vec<NodeId> = pfcndefs
        .iter()
        .copied()
        .filter(|&d| {
            let nn = comp.sub_expect(d, 0);
            let id = comp.name_slot_of_namenode(nn).expect("definition name");
            comp.names.ident(id).starts_with("parproc")
        })
        .collect();
    assert_eq!(arm_defs.len(), 2);
    for def in arm_defs {
        assert_eq!(comp.list_count(comp.sub_expect(def, 1)), 2);
    }
}

/// `f(a) -> int, int` with `return a+1, a-1` becomes a procedure with two
/// trailing result parameters; the return becomes assignments then a bare
/// return.
#[test]
fn return_lowering() {
    let src = "def f (int a) -> int, int\n  return a + 1, a - 1\n";
    let (mut comp, root) = run_until(src, "fetrans1");
    let gup = comp.gup();

    let def = comp.list_items(root)
        .into_iter()
        .find(|&d| comp.tree.tag(d) == gup.fcndef)
        .expect("definition survives");
    let params = comp.sub_expect(def, 1);
    assert_eq!(comp.list_count(params), 3, "a plus two result parameters");
    let results = comp.sub_expect(def, 3);
    assert_eq!(comp.list_count(results), 0, "results lowered away");

    // body: declblock around seq [ assign, assign, return ]
    let mut seqs = Vec::new();
    comp.prewalk(def, &mut |c, n| {
        if c.tree.tag(n) == gup.seq {
            seqs.push(n);
        }
        true
    });
    let lowered = seqs
        .iter()
        .copied()
        .find(|&s| comp.list_count(comp.sub_expect(s, 1)) == 3)
        .expect("lowered return seq");
    let items = comp.list_items(comp.sub_expect(lowered, 1));
    assert_eq!(comp.tree.tag(items[0]), gup.assign);
    assert_eq!(comp.tree.tag(items[1]), gup.assign);
    assert_eq!(comp.tree.tag(items[2]), gup.ret);
}

#[test]
fn full_compile_emits_ccsp_c() {
    let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! 1\n    c ? x\n";
    let (comp, result) = compile_source("prog.gpp", src, CompOpts::default());
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");

    let c = &out.c_code;
    assert!(c.contains("#include <cccsp.h>"), "{c}");
    assert!(c.contains("void gcf_main (Workspace wptr)"), "{c}");
    assert!(c.contains("ProcPar (wptr, 2"), "{c}");
    assert!(c.contains("LightProcInit (wptr,"), "{c}");
    assert!(c.contains("ChanOut (wptr,"), "{c}");
    assert!(c.contains("ChanIn (wptr,"), "{c}");
    assert!(c.contains("ChanInit (wptr,"), "{c}");
    assert!(c.contains("void gproc_parproc_0 (Workspace wptr)"), "{c}");
    assert!(c.contains("GetProcParam (wptr,"), "{c}");
    assert!(c.contains("SetToplevelProcess (gcf_main);"), "{c}");
    assert!(out.digest.is_none());
}

#[test]
fn nested_par_splits_recursively() {
    let src = "def main ()\n  chan (int) c\n  int x\n  int y\n  par\n    par\n      c ! x\n      c ? y\n    skip\n";
    let (comp, result) = compile_source("prog.gpp", src, CompOpts::default());
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");

    let c = &out.c_code;
    // both the outer and the generated inner PAR spawn two processes
    assert_eq!(c.matches("ProcPar (wptr, 2").count(), 2, "{c}");
    let entries = c.matches("extern void gproc_parproc_").count();
    assert_eq!(entries, 4, "two outer arms plus two inner arms\n{c}");
}

#[test]
fn digest_requested_is_stable() {
    let src = "def main ()\n  skip\n";
    let mut opts = CompOpts::default();
    opts.codegen_digest = true;
    let (_, result) = compile_source("prog.gpp", src, opts.clone());
    let first = result.expect("compiles").expect("completes");
    let (_, result) = compile_source("prog.gpp", src, opts);
    let second = result.expect("compiles").expect("completes");

    let d1 = first.digest.expect("digest requested");
    let d2 = second.digest.expect("digest requested");
    assert_eq!(d1, d2, "same input, same emitted bytes");
    assert_eq!(d1.len(), 64);
}

#[test]
fn string_literals_lift_to_file_scope() {
    let src = "def main ()\n  string s\n  s := \"hi\"\n";
    let (comp, result) = compile_source("prog.gpp", src, CompOpts::default());
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");

    let c = &out.c_code;
    assert!(c.contains("static const char slit_"), "{c}");
    assert!(c.contains("GuppyStringInit (wptr,"), "{c}");
    assert!(c.contains("GuppyStringAssign (wptr,"), "{c}");
    assert!(c.contains("GuppyStringFree (wptr,"), "{c}");
}

#[test]
fn timer_input_resolves_to_timer_read() {
    let src = "def main ()\n  timer tim\n  int t\n  tim ? t\n";
    let (comp, result) = compile_source("prog.gpp", src, CompOpts::default());
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");
    assert!(out.c_code.contains("= TimerRead (wptr);"), "{}", out.c_code);
}

#[test]
fn ev3_subtarget_frees_par_processes() {
    let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! 1\n    c ? x\n";
    let mut opts = CompOpts::default();
    opts.subtarget = cspcc::Subtarget::Ev3;
    let (comp, result) = compile_source("prog.gpp", src, opts);
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");
    let frees = out.c_code.matches("LightProcFree (wptr,").count();
    assert_eq!(frees, 2, "one free per arm after the join\n{}", out.c_code);
}

#[test]
fn stop_after_halts_the_pipeline() {
    let src = "def main ()\n  skip\n";
    let mut opts = CompOpts::default();
    opts.stop_after = Some("scope".to_owned());
    let (_, result) = compile_source("prog.gpp", src, opts);
    assert!(matches!(result, Ok(None)), "{result:?}");
}
