//! Parallel usage checking: PAR arms may not write the same variable, and
//! a channel has at most one sending and one receiving arm.

use cspcc::{CompOpts, compile_source};

#[test]
fn par_arms_writing_the_same_variable_is_an_error() {
    let src = "def main ()\n  int x\n  par\n    x := 1\n    x := 2\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("parallel processes both write [x]"), "{rendered}");
}

#[test]
fn disjoint_writes_pass() {
    let src = "def main ()\n  int x\n  int y\n  par\n    x := 1\n    y := 2\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));
}

#[test]
fn two_senders_on_one_channel_is_an_error() {
    let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! x\n    c ! 1\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("parallel processes both output on [c]"), "{rendered}");
}

#[test]
fn two_receivers_on_one_channel_is_an_error() {
    let src = "def main ()\n  chan (int) c\n  int x\n  int y\n  par\n    c ? x\n    c ? y\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("parallel processes both input on [c]"), "{rendered}");
}

#[test]
fn one_sender_one_receiver_passes() {
    let src = "def main ()\n  chan (int) c\n  int x\n  par\n    c ! 1\n    c ? x\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_ok(), "{result:?}\n{}", comp.reporter.render_all(&comp.files));
}

#[test]
fn input_target_counts_as_a_write() {
    let src = "def main ()\n  chan (int) c\n  int v\n  par\n    c ? v\n    v := 3\n";
    let (comp, result) = compile_source("usage.gpp", src, CompOpts::default());
    assert!(result.is_err());
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("both write [v]"), "{rendered}");
}
