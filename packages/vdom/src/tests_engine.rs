/// Phase-ordering and failure-isolation tests for the patch engine
use crate::address::Address;
use crate::engine::PatchEngine;
use crate::errors::{PatchError, ResolveError};
use crate::morph::MorphOptions;
use crate::node::VNode;
use crate::patch::{Patch, Phase};
use crate::resolver::{resolve, significant_children};
use crate::tree::LiveTree;

fn list(n: usize) -> LiveTree {
    LiveTree::new(
        &VNode::element("ul").with_stable_id("list").with_children((0..n).map(|i| {
            VNode::element("li")
                .with_stable_id(format!("li{i}"))
                .with_child(VNode::text(i.to_string()))
        })),
    )
}

fn item(label: &str) -> VNode {
    VNode::element("li").with_child(VNode::text(label))
}

fn labels(tree: &LiveTree) -> Vec<String> {
    significant_children(tree, tree.root())
        .into_iter()
        .map(|c| tree.text_content(c))
        .collect()
}

#[test]
fn test_removals_apply_highest_index_first() {
    let orders: [[usize; 3]; 3] = [[0, 2, 4], [4, 2, 0], [2, 0, 4]];
    for order in orders {
        let mut tree = list(6);
        let patches: Vec<Patch> = order
            .iter()
            .map(|i| Patch::remove_child(Address::id("list"), *i))
            .collect();

        let report = PatchEngine::new().apply(&mut tree, &patches);

        assert!(report.is_success(), "order {:?}: {:?}", order, report.failures);
        assert_eq!(significant_children(&tree, tree.root()).len(), 3);
        assert_eq!(labels(&tree), vec!["1", "3", "5"]);
    }
}

#[test]
fn test_removals_run_before_inserts() {
    let mut tree = list(2);
    let patches = vec![
        Patch::insert_child(Address::root(), 0, item("x")),
        Patch::remove_child(Address::root(), 0),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.is_success());
    assert_eq!(labels(&tree), vec!["x", "1"]);
}

#[test]
fn test_node_ops_resolve_after_structural_phases() {
    let mut tree = list(2);
    let patches = vec![
        Patch::set_text(Address::path(vec![1]), "z"),
        Patch::insert_child(Address::root(), 0, item("x")),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.is_success());
    assert_eq!(labels(&tree), vec!["x", "z", "1"]);
}

#[test]
fn test_consecutive_inserts_use_a_block() {
    let mut tree = list(2);
    let patches = vec![
        Patch::insert_child(Address::root(), 3, item("c")),
        Patch::insert_child(Address::root(), 1, item("a")),
        Patch::insert_child(Address::root(), 2, item("b")),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.is_success());
    assert_eq!(report.block_inserts, 1);
    assert_eq!(report.applied, 3);
    assert_eq!(labels(&tree), vec!["0", "a", "b", "c", "1"]);
}

#[test]
fn test_short_runs_insert_individually() {
    let mut tree = list(1);
    let patches = vec![
        Patch::insert_child(Address::root(), 1, item("a")),
        Patch::insert_child(Address::root(), 2, item("b")),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert_eq!(report.block_inserts, 0);
    assert_eq!(labels(&tree), vec!["0", "a", "b"]);
}

#[test]
fn test_move_preserves_identity() {
    let mut tree = list(3);
    let before = tree.by_stable_id("li0").unwrap();
    let patches = vec![Patch::move_child(Address::id("list"), 0, 2, Some("li0".to_string()))];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.is_success());
    assert_eq!(labels(&tree), vec!["1", "2", "0"]);
    assert_eq!(resolve(&tree, &Address::id("li0")).unwrap(), before);
}

#[test]
fn test_moves_are_resolved_before_any_move() {
    let mut tree = list(3);
    let patches = vec![
        Patch::move_child(Address::root(), 0, 2, None),
        Patch::move_child(Address::root(), 2, 0, None),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.is_success());
    assert_eq!(labels(&tree), vec!["2", "1", "0"]);
}

#[test]
fn test_failed_patch_does_not_stop_siblings() {
    let mut tree = list(2);
    let patches = vec![
        Patch::set_text(Address::path(vec![9]), "lost"),
        Patch::set_attribute(Address::id("li1"), "class", "done"),
        Patch::remove_child(Address::id("missing"), 0),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(!report.is_success());
    assert_eq!(report.applied, 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].index, 2);
    assert_eq!(report.failures[0].phase, Phase::Remove);
    assert_eq!(report.failures[1].index, 0);
    assert_eq!(report.failures[1].phase, Phase::Node);

    let li1 = tree.by_stable_id("li1").unwrap();
    assert_eq!(tree.attr(li1, "class"), Some("done"));
}

#[test]
fn test_root_replace_is_refused() {
    let mut tree = list(1);
    let report = PatchEngine::new().apply(&mut tree, &[Patch::replace(Address::root(), item("x"))]);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error, PatchError::RootImmutable);
    assert_eq!(labels(&tree), vec!["0"]);
}

#[test]
fn test_out_of_range_child_index_fails() {
    let mut tree = list(2);
    let report = PatchEngine::new().apply(&mut tree, &[Patch::remove_child(Address::root(), 5)]);

    assert_eq!(
        report.failures[0].error,
        PatchError::IndexOutOfRange { index: 5, len: 2 }
    );
}

#[test]
fn test_unresolvable_path_reports_resolve_error() {
    let mut tree = list(1);
    let report = PatchEngine::new().apply(
        &mut tree,
        &[Patch::insert_child(Address::path(vec![0, 0, 3]), 0, item("x"))],
    );

    assert!(matches!(
        report.failures[0].error,
        PatchError::Resolve(ResolveError::PathOutOfRange { .. })
    ));
}

#[test]
fn test_touched_lists_mutated_subtrees() {
    let mut tree = list(2);
    let li1 = tree.by_stable_id("li1").unwrap();
    let patches = vec![
        Patch::set_attribute(Address::id("li1"), "class", "on"),
        Patch::insert_child(Address::root(), 2, item("x")),
    ];

    let report = PatchEngine::new().apply(&mut tree, &patches);

    assert!(report.touched.contains(&tree.root()));
    assert!(report.touched.contains(&li1));
}

#[test]
fn test_replace_drops_old_identity_from_touched() {
    let mut tree = list(2);
    let old = tree.by_stable_id("li0").unwrap();
    let report = PatchEngine::new().apply(
        &mut tree,
        &[Patch::replace(Address::id("li0"), item("new").with_stable_id("li0"))],
    );

    let new = tree.by_stable_id("li0").unwrap();
    assert_ne!(old, new);
    assert_eq!(report.touched, vec![new]);
}

#[test]
fn test_focused_control_keeps_value_unless_broadcast() {
    let form = VNode::element("form")
        .with_child(VNode::element("input").with_stable_id("q").with_attr("value", "typed locally"))
        .with_child(VNode::element("textarea").with_stable_id("t").with_child(VNode::text("draft")));
    let patches = vec![
        Patch::set_attribute(Address::id("q"), "value", "server"),
        Patch::set_attribute(Address::id("q"), "class", "dirty"),
        Patch::set_text(Address::path(vec![1, 0]), "reset"),
    ];

    let mut tree = LiveTree::new(&form);
    let q = tree.by_stable_id("q").unwrap();
    let t = tree.by_stable_id("t").unwrap();
    let options = MorphOptions {
        broadcast: false,
        focused: Some(q),
    };
    let report = PatchEngine::new().apply_with(&mut tree, &patches, &options);
    assert!(report.is_success());
    assert_eq!(report.focus_preserved, 1);
    assert_eq!(tree.attr(q, "value"), Some("typed locally"));
    assert_eq!(tree.attr(q, "class"), Some("dirty"));
    assert_eq!(tree.text_content(t), "reset");

    // A focused textarea keeps its text
    let mut tree = LiveTree::new(&form);
    let t = tree.by_stable_id("t").unwrap();
    let options = MorphOptions {
        broadcast: false,
        focused: Some(t),
    };
    let report = PatchEngine::new().apply_with(&mut tree, &patches, &options);
    assert_eq!(report.focus_preserved, 1);
    assert_eq!(tree.text_content(t), "draft");

    // Remote content wins
    let mut tree = LiveTree::new(&form);
    let q = tree.by_stable_id("q").unwrap();
    let options = MorphOptions {
        broadcast: true,
        focused: Some(q),
    };
    let report = PatchEngine::new().apply_with(&mut tree, &patches, &options);
    assert_eq!(report.focus_preserved, 0);
    assert_eq!(tree.attr(q, "value"), Some("server"));
}
