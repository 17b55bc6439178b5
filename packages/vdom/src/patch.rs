//! # Patch Model
//!
//! One incremental tree-mutation instruction from the server. Every patch
//! carries a structural `path` and, when the target element has one, its
//! stable id `d`. Child operations address the *parent*.

use crate::address::Address;
use crate::node::VNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Patch {
    /// Replace the node at the address with a new subtree
    Replace {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        node: VNode,
    },

    /// Update text content
    SetText {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        text: String,
    },

    /// Set an attribute
    #[serde(rename = "SetAttr")]
    SetAttribute {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        key: String,
        value: String,
    },

    /// Remove an attribute
    #[serde(rename = "RemoveAttr")]
    RemoveAttribute {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        key: String,
    },

    /// Insert a child at a significant-child index
    InsertChild {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        index: usize,
        node: VNode,
    },

    /// Remove the child at a significant-child index
    RemoveChild {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        index: usize,
    },

    /// Move a child; `child_d` is the moved child's stable id when known
    MoveChild {
        #[serde(default)]
        path: Vec<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        from: usize,
        to: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_d: Option<String>,
    },
}

/// Application phase. Child-list mutations run before node-targeting
/// operations because they change the indices those operations depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Remove = 0,
    Move = 1,
    Insert = 2,
    Node = 3,
}

impl Patch {
    pub fn replace(at: Address, node: VNode) -> Self {
        Patch::Replace {
            path: at.path,
            d: at.id,
            node,
        }
    }

    pub fn set_text(at: Address, text: impl Into<String>) -> Self {
        Patch::SetText {
            path: at.path,
            d: at.id,
            text: text.into(),
        }
    }

    pub fn set_attribute(at: Address, key: impl Into<String>, value: impl Into<String>) -> Self {
        Patch::SetAttribute {
            path: at.path,
            d: at.id,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove_attribute(at: Address, key: impl Into<String>) -> Self {
        Patch::RemoveAttribute {
            path: at.path,
            d: at.id,
            key: key.into(),
        }
    }

    pub fn insert_child(parent: Address, index: usize, node: VNode) -> Self {
        Patch::InsertChild {
            path: parent.path,
            d: parent.id,
            index,
            node,
        }
    }

    pub fn remove_child(parent: Address, index: usize) -> Self {
        Patch::RemoveChild {
            path: parent.path,
            d: parent.id,
            index,
        }
    }

    pub fn move_child(parent: Address, from: usize, to: usize, child_hint: Option<String>) -> Self {
        Patch::MoveChild {
            path: parent.path,
            d: parent.id,
            from,
            to,
            child_d: child_hint,
        }
    }

    /// Target address (the parent, for child operations).
    pub fn address(&self) -> Address {
        let (path, d) = match self {
            Patch::Replace { path, d, .. }
            | Patch::SetText { path, d, .. }
            | Patch::SetAttribute { path, d, .. }
            | Patch::RemoveAttribute { path, d, .. }
            | Patch::InsertChild { path, d, .. }
            | Patch::RemoveChild { path, d, .. }
            | Patch::MoveChild { path, d, .. } => (path, d),
        };
        Address::new(d.clone(), path.clone())
    }

    pub fn phase(&self) -> Phase {
        match self {
            Patch::RemoveChild { .. } => Phase::Remove,
            Patch::MoveChild { .. } => Phase::Move,
            Patch::InsertChild { .. } => Phase::Insert,
            Patch::Replace { .. }
            | Patch::SetText { .. }
            | Patch::SetAttribute { .. }
            | Patch::RemoveAttribute { .. } => Phase::Node,
        }
    }
}
