//! # Tree Mutator
//!
//! Primitive mutations on a [`LiveTree`]. Child indices are significant-child
//! indices (see [`crate::resolver`]), the same index space the server uses
//! when it emits patches.

use crate::attrs::{is_unsafe_key, STABLE_ID_ATTR};
use crate::errors::PatchError;
use crate::node::VNode;
use crate::resolver::significant_children;
use crate::tree::{LiveTree, NodeId, NodeKind};

impl LiveTree {
    fn ensure_live(&self, node: NodeId) -> Result<(), PatchError> {
        if self.contains(node) {
            Ok(())
        } else {
            Err(PatchError::Detached(node))
        }
    }

    fn ensure_element(&self, node: NodeId) -> Result<(), PatchError> {
        self.ensure_live(node)?;
        if self.is_element(node) {
            Ok(())
        } else {
            Err(PatchError::NotAnElement(node))
        }
    }

    /// Raw child-list position at which a child must be linked so that it
    /// becomes significant child `index`.
    fn insert_position(&self, parent: NodeId, index: usize) -> Result<usize, PatchError> {
        let significant = significant_children(self, parent);
        if index == significant.len() {
            return Ok(self.children(parent).len());
        }
        let anchor = significant
            .get(index)
            .ok_or(PatchError::IndexOutOfRange {
                index,
                len: significant.len(),
            })?;
        Ok(self
            .children(parent)
            .iter()
            .position(|c| c == anchor)
            .unwrap_or(0))
    }

    /// Replace text content. On an element this replaces all children with a
    /// single text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), PatchError> {
        self.ensure_live(node)?;
        if self.is_element(node) {
            let old_children = std::mem::take(&mut self.node_mut(node).children);
            for child in old_children {
                self.drop_subtree(child);
            }
            let text_node = self.build(&VNode::text(text), Some(node));
            self.node_mut(node).children.push(text_node);
            self.structural_mutations += 1;
            return Ok(());
        }

        if let NodeKind::Text(content) | NodeKind::Comment(content) = &mut self.node_mut(node).kind {
            if content != text {
                *content = text.to_string();
            }
        }
        Ok(())
    }

    /// Set an attribute. Returns whether the stored value changed.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        key: &str,
        value: &str,
    ) -> Result<bool, PatchError> {
        if is_unsafe_key(key) {
            return Err(PatchError::UnsafeKey(key.to_string()));
        }
        self.ensure_element(node)?;

        let previous = match &mut self.node_mut(node).kind {
            NodeKind::Element { attributes, .. } => {
                if attributes.get(key).map(String::as_str) == Some(value) {
                    return Ok(false);
                }
                attributes.insert(key.to_string(), value.to_string())
            }
            _ => return Err(PatchError::NotAnElement(node)),
        };

        if key == STABLE_ID_ATTR {
            if let Some(old) = previous {
                if self.stable_ids.get(&old) == Some(&node) {
                    self.stable_ids.remove(&old);
                }
            }
            self.stable_ids.insert(value.to_string(), node);
        }
        Ok(true)
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove_attribute(&mut self, node: NodeId, key: &str) -> Result<bool, PatchError> {
        self.ensure_element(node)?;
        let removed = match &mut self.node_mut(node).kind {
            NodeKind::Element { attributes, .. } => attributes.shift_remove(key),
            _ => return Err(PatchError::NotAnElement(node)),
        };

        if key == STABLE_ID_ATTR {
            if let Some(old) = &removed {
                if self.stable_ids.get(old) == Some(&node) {
                    self.stable_ids.remove(old);
                }
            }
        }
        Ok(removed.is_some())
    }

    /// Insert `vnode` so that it becomes significant child `index` of `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        vnode: &VNode,
    ) -> Result<NodeId, PatchError> {
        self.ensure_element(parent)?;
        let position = self.insert_position(parent, index)?;
        Ok(self.insert_at(parent, position, vnode))
    }

    /// Block insert: all subtrees are built off-tree first, then spliced in
    /// at once starting at significant index `index`.
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        index: usize,
        vnodes: &[&VNode],
    ) -> Result<Vec<NodeId>, PatchError> {
        self.ensure_element(parent)?;
        let position = self.insert_position(parent, index)?;

        let built: Vec<NodeId> = vnodes.iter().map(|v| self.build(v, Some(parent))).collect();
        let children = &mut self.node_mut(parent).children;
        let position = position.min(children.len());
        children.splice(position..position, built.iter().copied());
        self.structural_mutations += built.len() as u64;
        Ok(built)
    }

    /// Remove significant child `index` of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<NodeId, PatchError> {
        self.ensure_element(parent)?;
        let significant = significant_children(self, parent);
        let child = *significant.get(index).ok_or(PatchError::IndexOutOfRange {
            index,
            len: significant.len(),
        })?;
        self.remove_node(child)?;
        Ok(child)
    }

    /// Remove `node` and its subtree.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), PatchError> {
        self.ensure_live(node)?;
        if node == self.root {
            return Err(PatchError::RootImmutable);
        }
        self.unlink(node);
        self.drop_subtree(node);
        self.structural_mutations += 1;
        Ok(())
    }

    /// Relocate an existing child of `parent` so that it becomes significant
    /// child `to`. Targets past the end append.
    pub fn move_child(&mut self, parent: NodeId, child: NodeId, to: usize) -> Result<(), PatchError> {
        self.ensure_element(parent)?;
        self.ensure_live(child)?;
        if self.parent(child) != Some(parent) {
            return Err(PatchError::Detached(child));
        }

        let before = self.index_in_parent(child);
        self.unlink(child);
        let significant_len = significant_children(self, parent).len();
        let position = self.insert_position(parent, to.min(significant_len))?;
        self.link(parent, position, child);

        if self.index_in_parent(child) != before {
            self.structural_mutations += 1;
        }
        Ok(())
    }

    /// Replace `node` with a fresh subtree. The replacement gets a new
    /// [`NodeId`], so identity-keyed state on the old node is invalidated.
    pub fn replace(&mut self, node: NodeId, vnode: &VNode) -> Result<NodeId, PatchError> {
        self.ensure_live(node)?;
        if node == self.root {
            return Err(PatchError::RootImmutable);
        }
        let parent = self.parent(node).ok_or(PatchError::Detached(node))?;
        let position = self.index_in_parent(node).unwrap_or(0);

        self.unlink(node);
        self.drop_subtree(node);
        let replacement = self.build(vnode, Some(parent));
        self.link(parent, position, replacement);
        self.structural_mutations += 1;
        Ok(replacement)
    }

    /// Build `vnode` and link it at raw child-list position `position`.
    pub(crate) fn insert_at(&mut self, parent: NodeId, position: usize, vnode: &VNode) -> NodeId {
        let child = self.build(vnode, Some(parent));
        self.link(parent, position, child);
        self.structural_mutations += 1;
        child
    }

    /// Move an existing node to raw position `position` under `parent`.
    pub(crate) fn relocate(&mut self, parent: NodeId, position: usize, child: NodeId) {
        if self.parent(child) == Some(parent) && self.children(parent).get(position) == Some(&child) {
            return;
        }
        self.unlink(child);
        self.link(parent, position, child);
        self.structural_mutations += 1;
    }
}
