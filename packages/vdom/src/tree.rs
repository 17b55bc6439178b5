//! # Live Tree
//!
//! Arena-backed mirror of the server-rendered view. Nodes are addressed by
//! [`NodeId`], which is never reused: a node that is replaced gets a fresh
//! id, a node that is mutated or moved keeps its id. Anything keyed by
//! `NodeId` (bindings, focus, hooks) therefore follows node identity.
//!
//! The tree keeps an index from stable id (`data-dj-id`) to node so that
//! resolution by id is O(1). Every mutator keeps that index current.

use crate::attrs::STABLE_ID_ATTR;
use crate::node::{Attributes, VNode};
use std::collections::HashMap;

/// Identity of a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String, attributes: Attributes },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LiveTree {
    pub(crate) nodes: HashMap<NodeId, NodeData>,
    pub(crate) root: NodeId,
    next_id: u64,
    pub(crate) stable_ids: HashMap<String, NodeId>,
    pub(crate) structural_mutations: u64,
}

impl LiveTree {
    /// Build a tree whose view root is `root`. Non-element payloads are
    /// wrapped in a `div` so the root is always an element.
    pub fn new(root: &VNode) -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            root: NodeId(0),
            next_id: 0,
            stable_ids: HashMap::new(),
            structural_mutations: 0,
        };

        let root_id = if root.is_element() {
            tree.build(root, None)
        } else {
            let wrapper = tree.build(&VNode::element("div"), None);
            let child = tree.build(root, Some(wrapper));
            tree.node_mut(wrapper).children.push(child);
            wrapper
        };
        tree.root = root_id;
        tree
    }

    /// Empty view root.
    pub fn empty(tag: &str) -> Self {
        Self::new(&VNode::element(tag))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> Option<&Attributes> {
        match self.kind(id)? {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attributes(id)?.get(key).map(String::as_str)
    }

    /// Content of a text or comment node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element { .. }))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// O(1) stable id lookup.
    pub fn by_stable_id(&self, stable_id: &str) -> Option<NodeId> {
        self.stable_ids.get(stable_id).copied()
    }

    /// Number of structural changes (node creation, removal, relocation,
    /// replacement) performed since the tree was built.
    pub fn structural_mutations(&self) -> u64 {
        self.structural_mutations
    }

    /// Whether `id` is reachable from the view root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Pre-order traversal of `id` and its descendants.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if !self.contains(node) {
                continue;
            }
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| match self.kind(n) {
                Some(NodeKind::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Value-level copy of the subtree rooted at `id`.
    pub fn snapshot(&self, id: NodeId) -> Option<VNode> {
        let node = self.nodes.get(&id)?;
        Some(match &node.kind {
            NodeKind::Element { tag, attributes } => VNode::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children: node
                    .children
                    .iter()
                    .filter_map(|c| self.snapshot(*c))
                    .collect(),
            },
            NodeKind::Text(content) => VNode::text(content.clone()),
            NodeKind::Comment(content) => VNode::comment(content.clone()),
        })
    }

    // ------------------------------------------------------------------
    // Arena internals used by the mutator and reconciler
    // ------------------------------------------------------------------

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("node {:?} missing from arena", id))
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        if let NodeKind::Element { attributes, .. } = &kind {
            if let Some(stable_id) = attributes.get(STABLE_ID_ATTR) {
                self.stable_ids.insert(stable_id.clone(), id);
            }
        }
        self.nodes.insert(
            id,
            NodeData {
                kind,
                parent,
                children: Vec::new(),
            },
        );
        id
    }

    /// Materialise `vnode` as a new subtree. The caller links the returned
    /// root into its parent's child list.
    pub(crate) fn build(&mut self, vnode: &VNode, parent: Option<NodeId>) -> NodeId {
        match vnode {
            VNode::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.alloc(
                    NodeKind::Element {
                        tag: tag.clone(),
                        attributes: attributes.clone(),
                    },
                    parent,
                );
                let child_ids: Vec<NodeId> =
                    children.iter().map(|c| self.build(c, Some(id))).collect();
                self.node_mut(id).children = child_ids;
                id
            }
            VNode::Text { content } => self.alloc(NodeKind::Text(content.clone()), parent),
            VNode::Comment { content } => self.alloc(NodeKind::Comment(content.clone()), parent),
        }
    }

    /// Drop `id` and its descendants from the arena. The caller unlinks it
    /// from its parent first.
    pub(crate) fn drop_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            if let Some(data) = self.nodes.remove(&node) {
                if let NodeKind::Element { attributes, .. } = &data.kind {
                    if let Some(stable_id) = attributes.get(STABLE_ID_ATTR) {
                        if self.stable_ids.get(stable_id) == Some(&node) {
                            self.stable_ids.remove(stable_id);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn unlink(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            self.node_mut(parent).children.retain(|c| *c != child);
        }
        self.node_mut(child).parent = None;
    }

    /// Link `child` into `parent` at raw position `position` (clamped).
    pub(crate) fn link(&mut self, parent: NodeId, position: usize, child: NodeId) {
        let children = &mut self.node_mut(parent).children;
        let position = position.min(children.len());
        children.insert(position, child);
        self.node_mut(child).parent = Some(parent);
    }
}
