//! # Binding Table
//!
//! Typed index of the declarative event bindings carried by server-rendered
//! markup (`dj-click="increment"`, `dj-value-id="7"`). The table is
//! refreshed incrementally for each mutated subtree instead of rescanning
//! the whole tree.
//!
//! Entries are keyed by [`NodeId`]. A node that is replaced gets a new id,
//! so its old entry is pruned and the replacement is bound afresh; a node
//! that is only mutated keeps its "bound" marker and is never bound twice.

use crate::attrs::{is_directive, is_unsafe_key, EVENT_ATTR_PREFIX, EVENT_VALUE_PREFIX};
use crate::tree::{LiveTree, NodeId};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// What to send when an event of a given kind fires on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub handler: String,
    pub params: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_node: HashMap<NodeId, IndexMap<String, HandlerDescriptor>>,
    bound: HashSet<NodeId>,
}

/// Result of a rescan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanStats {
    /// Nodes bound for the first time
    pub newly_bound: usize,
    /// Entries dropped because their node is gone
    pub pruned: usize,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh bindings for `roots` and their descendants, then drop entries
    /// for nodes no longer in the tree.
    pub fn rescan(&mut self, tree: &LiveTree, roots: &[NodeId]) -> RescanStats {
        let mut stats = RescanStats::default();
        for root in roots {
            for node in tree.descendants(*root) {
                let events = read_bindings(tree, node);
                if events.is_empty() {
                    self.by_node.remove(&node);
                    continue;
                }
                if self.bound.insert(node) {
                    stats.newly_bound += 1;
                }
                self.by_node.insert(node, events);
            }
        }
        stats.pruned = self.prune(tree);
        stats
    }

    /// Drop entries for nodes that are no longer live.
    pub fn prune(&mut self, tree: &LiveTree) -> usize {
        let before = self.bound.len();
        self.bound.retain(|node| tree.contains(*node));
        self.by_node.retain(|node, _| tree.contains(*node));
        before - self.bound.len()
    }

    pub fn lookup(&self, node: NodeId, kind: &str) -> Option<&HandlerDescriptor> {
        self.by_node.get(&node)?.get(kind)
    }

    /// Find the nearest binding for `kind` starting at `node` and walking up
    /// through its ancestors.
    pub fn find(&self, tree: &LiveTree, node: NodeId, kind: &str) -> Option<(NodeId, &HandlerDescriptor)> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(descriptor) = self.lookup(id, kind) {
                return Some((id, descriptor));
            }
            current = tree.parent(id);
        }
        None
    }

    pub fn is_bound(&self, node: NodeId) -> bool {
        self.bound.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

fn read_bindings(tree: &LiveTree, node: NodeId) -> IndexMap<String, HandlerDescriptor> {
    let mut events = IndexMap::new();
    let attributes = match tree.attributes(node) {
        Some(attributes) => attributes,
        None => return events,
    };

    let mut params = IndexMap::new();
    for (key, value) in attributes {
        if let Some(name) = key.strip_prefix(EVENT_VALUE_PREFIX) {
            if is_unsafe_key(name) {
                tracing::warn!(param = %name, "ignoring unsafe binding parameter");
                continue;
            }
            params.insert(name.to_string(), value.clone());
        }
    }

    for (key, value) in attributes {
        if key.starts_with(EVENT_VALUE_PREFIX) || is_directive(key) {
            continue;
        }
        if let Some(kind) = key.strip_prefix(EVENT_ATTR_PREFIX) {
            if kind.is_empty() || value.is_empty() {
                continue;
            }
            events.insert(
                kind.to_string(),
                HandlerDescriptor {
                    handler: value.clone(),
                    params: params.clone(),
                },
            );
        }
    }
    events
}
