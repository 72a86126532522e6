//! Scoping behavior: mark/descope symmetry, namespace visibility, and the
//! scope pass binding raw names end to end.

use cspcc::{CompOpts, Compiler, names::LookupError};

#[test]
fn mark_descope_restores_the_visible_set() {
    let mut comp = Compiler::new(CompOpts::default());
    comp.names.add_scope("outer", None, None, None, 0);
    let before = comp.names.visible_names();

    let mark = comp.names.mark_scope();
    comp.names.add_scope("n1", None, None, None, 1);
    comp.names.add_scope("n2", None, None, None, 1);
    assert_eq!(comp.names.visible_names().len(), 3);

    comp.names.mark_descope(mark);
    assert_eq!(comp.names.visible_names(), before);
}

#[test]
fn hidden_namespace_fails_lookup_but_keeps_storage() {
    let mut comp = Compiler::new(CompOpts::default());
    let ns = comp.names.new_namespace("lib");
    let id = comp.names.add_scope("foo", None, None, Some(ns), 0);

    assert_eq!(comp.names.lookup_scoped("lib.foo", &[ns]), Ok(id));
    comp.names.hide_namespace(ns);
    assert_eq!(
        comp.names.lookup_scoped("lib.foo", &[ns]),
        Err(LookupError::NamespaceNotVisible("lib".into()))
    );
    // the name itself still exists in storage
    assert_eq!(comp.names.ident(id), "foo");
    assert_eq!(comp.names.qualified_ident(id), "lib.foo");

    comp.names.unhide_namespace(ns);
    assert_eq!(comp.names.lookup_scoped("lib.foo", &[ns]), Ok(id));
}

#[test]
fn scope_pass_binds_raw_names_and_reports_unknowns() {
    let mut comp = Compiler::new_guppy(CompOpts::default());
    let file = comp.files.open("scope.gpp");
    let src = "def main ()\n  int x\n  x := nope\n";
    let mut root = cspcc::guppy::parse::parse_module(&mut comp, src, file);
    let result = cspcc::compile_tree(&mut comp, &mut root);

    assert!(result.is_err(), "unknown name stops the pipeline");
    let rendered = comp.reporter.render_all(&comp.files);
    assert!(rendered.contains("[nope] is not declared"), "{rendered}");
    // the good name bound: no error mentions [x]
    assert!(!rendered.contains("[x] is not declared"), "{rendered}");
}

#[test]
fn inner_binding_shadows_outer_until_descope() {
    let mut comp = Compiler::new(CompOpts::default());
    let outer = comp.names.add_scope("v", None, None, None, 0);
    let mark = comp.names.mark_scope();
    let inner = comp.names.add_scope("v", None, None, None, 1);

    assert_eq!(comp.names.lookup("v"), Some(inner));
    comp.names.mark_descope(mark);
    assert_eq!(comp.names.lookup("v"), Some(outer));
}
