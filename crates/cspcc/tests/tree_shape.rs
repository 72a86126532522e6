//! Tree-shape invariants: copy round-trips, walk totality, selective
//! copy-or-alias, and the combined pre/post walk decisions.

use cspcc::{Compiler, CompOpts, CopyControl, Hook, NodeId, Origin};
use pretty_assertions::assert_eq;

fn guppy() -> Compiler {
    Compiler::new_guppy(CompOpts::default())
}

/// Builds `seq [ skip, output(c, x) ]` with real declared names.
fn build_seq(comp: &mut Compiler) -> NodeId {
    let gup = comp.gup();
    let org = Origin::BUILTIN;
    let int_type = comp.new_node(gup.int_type, org);
    let chan_type = cspcc::guppy::new_chantype(comp, Some(int_type), org);
    let (c_id, _) = cspcc::guppy::declare_name(comp, "c", gup.ndecl, None, Some(chan_type), 0, org);
    let int_type2 = comp.new_node(gup.int_type, org);
    let (x_id, _) = cspcc::guppy::declare_name(comp, "x", gup.ndecl, None, Some(int_type2), 0, org);

    let skip = comp.new_node(gup.skip, org);
    let c_ref = cspcc::guppy::name_ref(comp, c_id, org);
    let x_ref = cspcc::guppy::name_ref(comp, x_id, org);
    let output = comp.create(gup.output, org, &[Some(c_ref), Some(x_ref), None]);

    let list = comp.new_list(org);
    comp.list_add(list, skip);
    comp.list_add(list, output);
    comp.create(gup.seq, org, &[None, Some(list)])
}

#[test]
fn copy_tree_round_trips_and_copies_are_independent() {
    let mut comp = guppy();
    let tree = build_seq(&mut comp);

    let copy = comp.copy_tree(tree);
    assert_ne!(copy, tree);
    assert!(comp.tree_eq(tree, copy), "copy is structurally equal");

    let live_before = comp.tree.live_count();
    comp.free_tree(copy);
    assert!(comp.tree.is_live(tree), "freeing the copy leaves the original");
    assert!(comp.tree.live_count() < live_before);
    // the original still dumps cleanly (no dangling children)
    let dump = comp.dump_tree(tree);
    assert!(dump.contains("SEQ"));
    assert!(dump.contains("OUTPUT"));
}

#[test]
fn prewalk_visits_every_node_and_list_element_once() {
    let mut comp = guppy();
    let tree = build_seq(&mut comp);

    let mut visited: Vec<NodeId> = Vec::new();
    comp.prewalk(tree, &mut |_, n| {
        visited.push(n);
        true
    });
    // seq, list, skip, output, c, x (type nodes hang off names, not the tree)
    assert_eq!(visited.len(), 6);
    let mut unique = visited.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), visited.len(), "no node visited twice");
}

#[test]
fn postwalk_runs_children_first() {
    let mut comp = guppy();
    let tree = build_seq(&mut comp);

    let mut order: Vec<NodeId> = Vec::new();
    comp.postwalk(tree, &mut |_, n| order.push(n));
    assert_eq!(order.len(), 6);
    assert_eq!(*order.last().expect("non-empty"), tree, "root is visited last");
}

#[test]
fn prewalk_prune_skips_subtree() {
    let mut comp = guppy();
    let tree = build_seq(&mut comp);
    let gup = comp.gup();

    let mut count = 0usize;
    comp.prewalk(tree, &mut |c, n| {
        count += 1;
        // prune below the output action
        c.tree.tag(n) != gup.output
    });
    // seq, list, skip, output visited; the output's name refs are pruned
    assert_eq!(count, 4);
}

#[test]
fn copy_or_alias_preserves_leaf_aliases() {
    let mut comp = guppy();
    let tree = build_seq(&mut comp);
    let gup = comp.gup();

    let namenode_tag = gup.ndecl;
    let copy = comp.copy_or_alias_tree(tree, &move |c, n| {
        if c.tree.tag(n) == namenode_tag {
            CopyControl::Alias
        } else {
            CopyControl::DEEP
        }
    });
    assert_ne!(copy, tree);

    let mut originals = Vec::new();
    comp.prewalk(tree, &mut |c, n| {
        if c.tree.tag(n) == gup.ndecl {
            originals.push(n);
        }
        true
    });
    let mut aliased = Vec::new();
    comp.prewalk(copy, &mut |c, n| {
        if c.tree.tag(n) == gup.ndecl {
            aliased.push(n);
        }
        true
    });
    assert_eq!(originals, aliased, "name references are shared, not copied");
}

#[test]
fn modprepostwalk_decision_matrix() {
    let mut comp = guppy();
    let mut tree = build_seq(&mut comp);
    let gup = comp.gup();

    // zero: skip descent but still run post; negative: suppress post too
    let mut posts = 0usize;
    let mut pre_count = 0usize;
    comp.modprepostwalk(
        &mut tree,
        &mut |c, slot| {
            pre_count += 1;
            let tag = c.tree.tag(*slot);
            if tag == gup.output {
                0
            } else if tag == gup.skip {
                -1
            } else {
                1
            }
        },
        &mut |_, _| posts += 1,
    );
    // seq, list, skip, output visited in pre; output's children skipped
    assert_eq!(pre_count, 4);
    // post runs for all but the skip node
    assert_eq!(posts, 3);
}

#[test]
fn list_hook_payloads_compare_in_tree_eq() {
    let mut comp = guppy();
    let org = Origin::BUILTIN;
    let a = cspcc::guppy::lit::new_litint(&mut comp, org, 7);
    let b = cspcc::guppy::lit::new_litint(&mut comp, org, 7);
    let c = cspcc::guppy::lit::new_litint(&mut comp, org, 8);
    assert!(comp.tree_eq(a, b));
    assert!(!comp.tree_eq(a, c), "different constant payloads differ");

    // hooks survive copying
    let copy = comp.copy_tree(a);
    match comp.hook(copy, 0) {
        Some(Hook::Const(data)) => assert_eq!(data.int_val(), 7),
        other => panic!("expected a constant hook, found {other:?}"),
    }
}
