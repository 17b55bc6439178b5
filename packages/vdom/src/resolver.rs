//! # Node Resolver
//!
//! Maps an [`Address`] to a live node. A stable id is looked up directly in
//! the tree's index; on a miss (or when no id is given) the structural path
//! is walked from the view root over *significant* children only.
//!
//! A child is significant when it is an element, or a text node with
//! non-whitespace content. Inside whitespace-preserving containers
//! (`pre`, `textarea`, ...) every text node counts. This mirrors the
//! server's own whitespace pruning so both sides agree on indices.

use crate::address::Address;
use crate::attrs::{is_blank, preserves_whitespace};
use crate::errors::ResolveError;
use crate::tree::{LiveTree, NodeId, NodeKind};

/// Resolve `address` against the view root of `tree`.
pub fn resolve(tree: &LiveTree, address: &Address) -> Result<NodeId, ResolveError> {
    if let Some(stable_id) = &address.id {
        if let Some(node) = tree.by_stable_id(stable_id) {
            if tree.is_attached(node) {
                return Ok(node);
            }
        }
        tracing::debug!(
            stable_id = %stable_id,
            path = ?address.path,
            "stable id miss, falling back to structural path"
        );
        if address.path.is_empty() {
            return Err(ResolveError::NotFound(address.clone()));
        }
    }

    resolve_path(tree, &address.path)
}

/// Walk `path` from the view root over significant children.
pub fn resolve_path(tree: &LiveTree, path: &[usize]) -> Result<NodeId, ResolveError> {
    let mut current = tree.root();
    for (segment, &index) in path.iter().enumerate() {
        let children = significant_children(tree, current);
        current = *children
            .get(index)
            .ok_or_else(|| ResolveError::PathOutOfRange {
                path: path.to_vec(),
                segment,
                len: children.len(),
            })?;
    }
    Ok(current)
}

/// Ordered significant children of `parent`.
pub fn significant_children(tree: &LiveTree, parent: NodeId) -> Vec<NodeId> {
    let keep_whitespace = in_whitespace_preserving(tree, parent);
    tree.children(parent)
        .iter()
        .copied()
        .filter(|child| match tree.kind(*child) {
            Some(NodeKind::Element { .. }) => true,
            Some(NodeKind::Text(text)) => keep_whitespace || !is_blank(text),
            _ => false,
        })
        .collect()
}

/// Whether `node` or one of its ancestors preserves whitespace.
pub fn in_whitespace_preserving(tree: &LiveTree, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if tree.tag(id).map(preserves_whitespace).unwrap_or(false) {
            return true;
        }
        current = tree.parent(id);
    }
    false
}

/// Structural path of `node` from the view root (significant indices).
pub fn path_of(tree: &LiveTree, node: NodeId) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut current = node;
    while current != tree.root() {
        let parent = tree.parent(current)?;
        let index = significant_children(tree, parent)
            .iter()
            .position(|c| *c == current)?;
        path.push(index);
        current = parent;
    }
    path.reverse();
    Some(path)
}
