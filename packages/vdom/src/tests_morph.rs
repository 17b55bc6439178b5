/// Reconciler tests: identity reuse, ignore regions and focus protection
use crate::morph::{morph, MorphOptions};
use crate::node::VNode;
use crate::resolver::significant_children;
use crate::tree::LiveTree;

fn keyed_list(keys: &[&str]) -> VNode {
    VNode::element("ul").with_children(keys.iter().map(|k| {
        VNode::element("li")
            .with_key(*k)
            .with_child(VNode::text(k.to_uppercase()))
    }))
}

fn labels(tree: &LiveTree) -> Vec<String> {
    significant_children(tree, tree.root())
        .into_iter()
        .map(|c| tree.text_content(c))
        .collect()
}

#[test]
fn test_morph_identical_is_noop() {
    let desired = keyed_list(&["a", "b", "c"]);
    let mut tree = LiveTree::new(&desired);
    let before = tree.structural_mutations();
    let root = tree.root();

    let stats = morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert!(stats.is_noop(), "{:?}", stats);
    assert_eq!(tree.structural_mutations(), before);
}

#[test]
fn test_morph_is_idempotent() {
    let mut tree = LiveTree::new(&keyed_list(&["a", "b"]));
    let root = tree.root();
    let desired = keyed_list(&["c", "a"]);

    morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();
    let second = morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert_eq!(second.structural(), 0);
    assert_eq!(tree.snapshot(root), Some(desired));
}

#[test]
fn test_keyed_reorder_keeps_identity() {
    let mut tree = LiveTree::new(&keyed_list(&["a", "b", "c"]));
    let root = tree.root();
    let ids = significant_children(&tree, root);

    let stats = morph(&mut tree, root, &keyed_list(&["c", "a", "b"]), &MorphOptions::default()).unwrap();

    assert_eq!(stats.created, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(labels(&tree), vec!["C", "A", "B"]);
    assert_eq!(significant_children(&tree, root), vec![ids[2], ids[0], ids[1]]);
}

#[test]
fn test_unmatched_children_are_removed_and_new_ones_created() {
    let mut tree = LiveTree::new(&keyed_list(&["a", "b", "c"]));
    let root = tree.root();
    let a = significant_children(&tree, root)[0];

    let stats = morph(&mut tree, root, &keyed_list(&["a", "d"]), &MorphOptions::default()).unwrap();

    assert_eq!(stats.created, 1);
    assert_eq!(stats.removed, 2);
    assert_eq!(labels(&tree), vec!["A", "D"]);
    assert_eq!(significant_children(&tree, root)[0], a);
}

#[test]
fn test_unkeyed_same_tag_is_reused_in_place() {
    let mut tree = LiveTree::new(&VNode::element("div").with_child(VNode::element("p").with_child(VNode::text("old"))));
    let root = tree.root();
    let p = tree.children(root)[0];

    let desired = VNode::element("div").with_child(
        VNode::element("p")
            .with_attr("class", "fresh")
            .with_child(VNode::text("new")),
    );
    let stats = morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert_eq!(stats.structural(), 0);
    assert_eq!(stats.attributes_set, 1);
    assert_eq!(stats.texts_updated, 1);
    assert_eq!(tree.children(root)[0], p);
    assert_eq!(tree.text_content(p), "new");
}

#[test]
fn test_tag_mismatch_replaces() {
    let mut tree = LiveTree::new(&VNode::element("div").with_child(VNode::element("p")));
    let root = tree.root();
    let p = tree.children(root)[0];

    let desired = VNode::element("div").with_child(VNode::element("section"));
    morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    let section = tree.children(root)[0];
    assert_ne!(section, p);
    assert!(!tree.contains(p));
    assert_eq!(tree.tag(section), Some("section"));
}

#[test]
fn test_ignored_container_is_left_alone() {
    let owned = VNode::element("div")
        .with_attr("dj-update", "ignore")
        .with_child(VNode::element("canvas"));
    let mut tree = LiveTree::new(&VNode::element("main").with_child(owned));
    let root = tree.root();
    let container = tree.children(root)[0];

    let desired = VNode::element("main").with_child(
        VNode::element("div")
            .with_attr("dj-update", "ignore")
            .with_child(VNode::text("server view")),
    );
    let stats = morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert_eq!(stats.ignored, 1);
    assert_eq!(tree.children(root)[0], container);
    assert_eq!(tree.tag(tree.children(container)[0]), Some("canvas"));
}

fn form(value: &str) -> VNode {
    VNode::element("form").with_child(VNode::element("input").with_key("name").with_attr("value", value))
}

#[test]
fn test_focused_control_keeps_local_value() {
    let mut tree = LiveTree::new(&form("typed"));
    let root = tree.root();
    let input = tree.children(root)[0];
    let options = MorphOptions {
        broadcast: false,
        focused: Some(input),
    };

    let stats = morph(&mut tree, root, &form("server"), &options).unwrap();

    assert_eq!(stats.focus_preserved, 1);
    assert_eq!(tree.attr(input, "value"), Some("typed"));
}

#[test]
fn test_broadcast_overwrites_focused_control() {
    let mut tree = LiveTree::new(&form("typed"));
    let root = tree.root();
    let input = tree.children(root)[0];
    let options = MorphOptions {
        broadcast: true,
        focused: Some(input),
    };

    morph(&mut tree, root, &form("remote"), &options).unwrap();

    assert_eq!(tree.attr(input, "value"), Some("remote"));
}

#[test]
fn test_root_is_synced_not_replaced() {
    let mut tree = LiveTree::new(&VNode::element("div").with_attr("class", "a"));
    let root = tree.root();

    let desired = VNode::element("section")
        .with_attr("class", "b")
        .with_child(VNode::text("hi"));
    morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert_eq!(tree.root(), root);
    assert_eq!(tree.attr(root, "class"), Some("b"));
    assert_eq!(tree.text_content(root), "hi");
}

#[test]
fn test_unsafe_attributes_are_dropped() {
    let mut tree = LiveTree::new(&VNode::element("div"));
    let root = tree.root();
    let desired = VNode::element("div").with_attr("__proto__", "x").with_attr("title", "ok");

    morph(&mut tree, root, &desired, &MorphOptions::default()).unwrap();

    assert!(tree.attr(root, "__proto__").is_none());
    assert_eq!(tree.attr(root, "title"), Some("ok"));
}
