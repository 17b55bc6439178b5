//! # Differ
//!
//! Produces the patch list that turns one [`VNode`] snapshot into another.
//! This is the server half of the protocol; the client uses it for replay
//! tooling and tests.
//!
//! Child lists whose significant children all carry unique stable ids on
//! both sides are diffed by key: vanished children are removed, survivors
//! are moved into order, new children are inserted. Other child lists are
//! compared index by index, removing or appending at the tail.
//!
//! The engine resolves each phase against the tree as the previous phases
//! left it, so every node is tracked with one path per phase and each patch
//! carries the path for the phase it runs in, plus the old node's stable id.

use crate::address::Address;
use crate::attrs::{is_blank, preserves_whitespace};
use crate::node::VNode;
use crate::patch::{Patch, Phase};
use std::collections::{HashMap, HashSet};

/// Diff two view roots. The root itself is never replaced: a tag mismatch
/// at the root is diffed as if the tags matched.
pub fn diff(old: &VNode, new: &VNode) -> Vec<Patch> {
    let mut patches = Vec::new();
    if old.is_element() && new.is_element() {
        diff_element(old, new, &Location::root(), false, &mut patches);
    } else {
        tracing::warn!("diff called on non-element roots");
    }
    patches
}

/// Significant children as seen by the resolver.
pub fn significant_vnodes(node: &VNode, keep_whitespace: bool) -> Vec<&VNode> {
    node.children()
        .iter()
        .filter(|child| match child {
            VNode::Element { .. } => true,
            VNode::Text { content } => keep_whitespace || !is_blank(content),
            VNode::Comment { .. } => false,
        })
        .collect()
}

/// Path of one node in the tree state each phase starts from.
#[derive(Debug, Clone, Default)]
struct Location {
    paths: [Vec<usize>; 4],
}

impl Location {
    fn root() -> Self {
        Self::default()
    }

    /// Child location given its index in each phase's starting state.
    fn child(&self, indices: [usize; 4]) -> Self {
        let mut paths = self.paths.clone();
        for (path, index) in paths.iter_mut().zip(indices) {
            path.push(index);
        }
        Self { paths }
    }

    /// Child whose index does not change during the batch.
    fn fixed_child(&self, index: usize) -> Self {
        self.child([index; 4])
    }

    fn address(&self, node: &VNode, phase: Phase) -> Address {
        Address::new(
            node.stable_id().map(str::to_string),
            self.paths[phase as usize].clone(),
        )
    }
}

fn diff_node(old: &VNode, new: &VNode, at: &Location, keep_whitespace: bool, out: &mut Vec<Patch>) {
    match (old, new) {
        (VNode::Element { tag: a, .. }, VNode::Element { tag: b, .. }) if a == b => {
            diff_element(old, new, at, keep_whitespace, out);
        }
        (VNode::Text { content: a }, VNode::Text { content: b }) => {
            if a != b {
                let path = at.paths[Phase::Node as usize].clone();
                out.push(Patch::set_text(Address::path(path), b.clone()));
            }
        }
        _ => out.push(Patch::replace(at.address(old, Phase::Node), new.clone())),
    }
}

fn diff_element(old: &VNode, new: &VNode, at: &Location, keep_whitespace: bool, out: &mut Vec<Patch>) {
    let (old_attrs, new_attrs) = match (old, new) {
        (VNode::Element { attributes: a, .. }, VNode::Element { attributes: b, .. }) => (a, b),
        _ => return,
    };
    let node_at = at.address(old, Phase::Node);

    for key in old_attrs.keys() {
        if !new_attrs.contains_key(key) {
            out.push(Patch::remove_attribute(node_at.clone(), key.clone()));
        }
    }
    for (key, value) in new_attrs {
        if old_attrs.get(key) != Some(value) {
            out.push(Patch::set_attribute(node_at.clone(), key.clone(), value.clone()));
        }
    }

    let keep_whitespace = keep_whitespace || new.tag().map(preserves_whitespace).unwrap_or(false);
    let old_children = significant_vnodes(old, keep_whitespace);
    let new_children = significant_vnodes(new, keep_whitespace);

    match (stable_keys(&old_children), stable_keys(&new_children)) {
        (Some(old_keys), Some(new_keys)) => diff_keyed(
            old,
            at,
            (old_children.as_slice(), old_keys.as_slice()),
            (new_children.as_slice(), new_keys.as_slice()),
            keep_whitespace,
            out,
        ),
        _ => diff_indexed(old, at, &old_children, &new_children, keep_whitespace, out),
    }
}

fn diff_indexed(
    parent: &VNode,
    at: &Location,
    old_children: &[&VNode],
    new_children: &[&VNode],
    keep_whitespace: bool,
    out: &mut Vec<Patch>,
) {
    let common = old_children.len().min(new_children.len());
    for index in 0..common {
        diff_node(old_children[index], new_children[index], &at.fixed_child(index), keep_whitespace, out);
    }

    let remove_at = at.address(parent, Phase::Remove);
    for index in (common..old_children.len()).rev() {
        out.push(Patch::remove_child(remove_at.clone(), index));
    }
    let insert_at = at.address(parent, Phase::Insert);
    for (index, child) in new_children.iter().enumerate().skip(common) {
        out.push(Patch::insert_child(insert_at.clone(), index, (*child).clone()));
    }
}

fn diff_keyed(
    parent: &VNode,
    at: &Location,
    (old_children, old_keys): (&[&VNode], &[&str]),
    (new_children, new_keys): (&[&VNode], &[&str]),
    keep_whitespace: bool,
    out: &mut Vec<Patch>,
) {
    let wanted: HashSet<&str> = new_keys.iter().copied().collect();
    let existing: HashSet<&str> = old_keys.iter().copied().collect();

    let remove_at = at.address(parent, Phase::Remove);
    for (index, key) in old_keys.iter().enumerate().rev() {
        if !wanted.contains(key) {
            out.push(Patch::remove_child(remove_at.clone(), index));
        }
    }

    // Order after removals, and the order the moves must produce.
    let survivors: Vec<&str> = old_keys.iter().copied().filter(|k| wanted.contains(k)).collect();
    let target: Vec<&str> = new_keys.iter().copied().filter(|k| existing.contains(k)).collect();

    let move_at = at.address(parent, Phase::Move);
    let mut current = survivors.clone();
    for (to, key) in target.iter().enumerate() {
        if current[to] == *key {
            continue;
        }
        let from = survivors.iter().position(|k| k == key).unwrap_or(to);
        if let Some(position) = current.iter().position(|k| k == key) {
            current.remove(position);
        }
        current.insert(to, *key);
        out.push(Patch::move_child(move_at.clone(), from, to, Some(key.to_string())));
    }

    let old_index: HashMap<&str, usize> = old_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let survivor_index: HashMap<&str, usize> = survivors.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let target_index: HashMap<&str, usize> = target.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let insert_at = at.address(parent, Phase::Insert);
    for (index, (key, child)) in new_keys.iter().zip(new_children).enumerate() {
        match (old_index.get(key), survivor_index.get(key), target_index.get(key)) {
            (Some(&before), Some(&after_remove), Some(&after_move)) => {
                let location = at.child([before, after_remove, after_move, index]);
                diff_node(old_children[before], child, &location, keep_whitespace, out);
            }
            _ => out.push(Patch::insert_child(insert_at.clone(), index, (*child).clone())),
        }
    }
}

/// Stable ids of `children` when every child is an element carrying a
/// unique one.
fn stable_keys<'a>(children: &[&'a VNode]) -> Option<Vec<&'a str>> {
    if children.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(children.len());
    for child in children {
        let key = child.stable_id()?;
        if !seen.insert(key) {
            return None;
        }
        keys.push(key);
    }
    Some(keys)
}
