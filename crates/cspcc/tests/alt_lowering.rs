//! ALT lowering: selection call plus case dispatch, order preservation,
//! and the skip-guard rule.

use cspcc::{CompOpts, Compiler, NodeId, compile_source, compile_tree};

fn run_until(src: &str, stop_after: &str) -> (Compiler, NodeId) {
    let mut opts = CompOpts::default();
    opts.stop_after = Some(stop_after.to_owned());
    let mut comp = Compiler::new_guppy(opts);
    let file = comp.files.open("alt.gpp");
    let mut root = cspcc::guppy::parse::parse_module(&mut comp, src, file);
    assert_eq!(comp.reporter.error_count(), 0, "{}", comp.reporter.render_all(&comp.files));
    let result = compile_tree(&mut comp, &mut root);
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));
    (comp, root)
}

const PRI_ALT_SRC: &str = "\
def main ()
  chan (int) c
  int v
  pri alt
    c ? v
      skip
    skip
      stop
";

#[test]
fn pri_alt_lowers_to_selection_and_case() {
    let (mut comp, root) = run_until(PRI_ALT_SRC, "fetrans3");
    let gup = comp.gup();

    // the ALT is gone; a selection API call and a case dispatch replace it
    let mut alts = 0usize;
    let mut apicalls = Vec::new();
    let mut cases = Vec::new();
    comp.prewalk(root, &mut |c, n| {
        let tag = c.tree.tag(n);
        if tag == gup.alt || tag == gup.prialt {
            alts += 1;
        } else if tag == gup.apicall {
            apicalls.push(n);
        } else if tag == gup.case_node {
            cases.push(n);
        }
        true
    });
    assert_eq!(alts, 0, "the ALT node is lowered away");
    assert_eq!(apicalls.len(), 1);
    assert_eq!(cases.len(), 1);

    // case options: guard 0 then the skip guard at -1
    let case = cases[0];
    let opts = comp.list_items(comp.sub_expect(case, 1));
    assert_eq!(opts.len(), 2);
    assert_eq!(opt_value(&comp, opts[0]), 0);
    assert_eq!(opt_value(&comp, opts[1]), -1);

    // guard 0 runs the input before its continuation
    let body0 = comp.sub_expect(opts[0], 1);
    assert_eq!(comp.tree.tag(body0), gup.seq);
    let body_items = comp.list_items(comp.sub_expect(body0, 1));
    assert_eq!(comp.tree.tag(body_items[0]), gup.input);
}

/// The selection value of a case option; the lowering builds fresh literal
/// nodes after constprop, so both forms are accepted.
fn opt_value(comp: &Compiler, opt: NodeId) -> i64 {
    let value = comp.sub_expect(opt, 0);
    if comp.is_const_node(value) {
        comp.const_int_of(value)
    } else if let Some(cspcc::Hook::Const(data)) = comp.hook(value, 0) {
        data.int_val()
    } else {
        panic!("case option value is not constant: [{}]", comp.tag_name_of(value));
    }
}

#[test]
fn skip_guard_in_plain_alt_is_an_error() {
    let src = "\
def main ()
  chan (int) c
  int v
  alt
    c ? v
      skip
    skip
      stop
";
    let (comp, result) = compile_source("alt.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("skip guard only allowed in pri alt"), "{rendered}");
}

#[test]
fn skip_guard_not_last_is_an_error() {
    let src = "\
def main ()
  chan (int) c
  int v
  pri alt
    skip
      stop
    c ? v
      skip
";
    let (comp, result) = compile_source("alt.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("skip guard must be the last guard"), "{rendered}");
}

#[test]
fn lowered_alt_emits_switch() {
    let (comp, result) = compile_source("alt.gpp", PRI_ALT_SRC, CompOpts::default());
    let out = result
        .unwrap_or_else(|e| panic!("{e}\n{}", comp.reporter.render_all(&comp.files)))
        .expect("pipeline ran to completion");
    let c = &out.c_code;
    assert!(c.contains("ProcAlt (wptr,"), "{c}");
    assert!(c.contains("switch ("), "{c}");
    assert!(c.contains("case 0:"), "{c}");
    assert!(c.contains("case -1:"), "{c}");
    assert!(c.contains("ChanIn (wptr,"), "{c}");
}
