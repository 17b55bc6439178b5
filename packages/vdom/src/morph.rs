//! # Reconciler (morph)
//!
//! Brings a live subtree in line with a desired [`VNode`] snapshot while
//! keeping reusable nodes (and so their identity, bindings and focus).
//!
//! Per parent pair, desired children are walked in order:
//!
//! - a desired child with an identity key (`id`) found among the existing
//!   children claims that node, which is relocated into position and
//!   reconciled recursively
//! - otherwise the existing node currently in that position is reused when
//!   it is unmatched, carries no identity key, and has the same kind/tag
//! - otherwise the desired child is built fresh and inserted
//!
//! Existing children left unmatched after the walk are removed. A tag
//! mismatch on a matched pair replaces the node outright.

use crate::attrs::{is_form_control, is_unsafe_key, IDENTITY_ATTR, UPDATE_ATTR, UPDATE_IGNORE, VALUE_ATTR};
use crate::errors::PatchError;
use crate::node::VNode;
use crate::tree::{LiveTree, NodeId, NodeKind};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphOptions {
    /// Update originated from another collaborating client; remote form
    /// values overwrite even a focused control.
    pub broadcast: bool,
    /// Node that currently holds input focus.
    pub focused: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphStats {
    pub created: usize,
    pub removed: usize,
    pub moved: usize,
    pub replaced: usize,
    pub attributes_set: usize,
    pub attributes_removed: usize,
    pub texts_updated: usize,
    pub ignored: usize,
    pub focus_preserved: usize,
}

impl MorphStats {
    /// Node creations, removals, relocations and replacements.
    pub fn structural(&self) -> usize {
        self.created + self.removed + self.moved + self.replaced
    }

    pub fn is_noop(&self) -> bool {
        self.structural() == 0
            && self.attributes_set == 0
            && self.attributes_removed == 0
            && self.texts_updated == 0
    }
}

/// Reconcile `target` against `desired`. The view root is never replaced:
/// when `target` is the root only its attributes and children are synced.
pub fn morph(
    tree: &mut LiveTree,
    target: NodeId,
    desired: &VNode,
    options: &MorphOptions,
) -> Result<MorphStats, PatchError> {
    if !tree.contains(target) {
        return Err(PatchError::Detached(target));
    }

    let mut morpher = Morpher {
        tree,
        options,
        stats: MorphStats::default(),
    };

    if target == morpher.tree.root() {
        if is_ignored(morpher.tree, target) {
            morpher.stats.ignored += 1;
        } else {
            match desired {
                VNode::Element {
                    attributes,
                    children,
                    ..
                } => {
                    morpher.sync_attributes(target, attributes);
                    morpher.morph_children(target, children);
                }
                other => morpher.morph_children(target, std::slice::from_ref(other)),
            }
        }
    } else {
        morpher.morph_node(target, desired);
    }

    let stats = morpher.stats;
    tracing::debug!(?stats, "morph complete");
    Ok(stats)
}

/// Focused form control whose value must not be overwritten by a local
/// update. Broadcast updates always win.
pub(crate) fn holds_protected_value(tree: &LiveTree, node: NodeId, options: &MorphOptions) -> bool {
    !options.broadcast && options.focused == Some(node) && tree.tag(node).map(is_form_control).unwrap_or(false)
}

fn is_ignored(tree: &LiveTree, node: NodeId) -> bool {
    tree.attr(node, UPDATE_ATTR) == Some(UPDATE_IGNORE)
}

fn same_kind(tree: &LiveTree, existing: NodeId, desired: &VNode) -> bool {
    match (tree.kind(existing), desired) {
        (Some(NodeKind::Element { tag, .. }), VNode::Element { tag: other, .. }) => {
            tag.eq_ignore_ascii_case(other)
        }
        (Some(NodeKind::Text(_)), VNode::Text { .. }) => true,
        (Some(NodeKind::Comment(_)), VNode::Comment { .. }) => true,
        _ => false,
    }
}

struct Morpher<'a> {
    tree: &'a mut LiveTree,
    options: &'a MorphOptions,
    stats: MorphStats,
}

impl Morpher<'_> {
    fn morph_node(&mut self, existing: NodeId, desired: &VNode) -> NodeId {
        if is_ignored(self.tree, existing) {
            self.stats.ignored += 1;
            return existing;
        }

        if !same_kind(self.tree, existing, desired) {
            return match self.tree.replace(existing, desired) {
                Ok(replacement) => {
                    self.stats.replaced += 1;
                    replacement
                }
                Err(error) => {
                    tracing::warn!(%error, "morph could not replace node");
                    existing
                }
            };
        }

        match desired {
            VNode::Text { content } | VNode::Comment { content } => {
                if self.tree.text(existing) != Some(content.as_str())
                    && self.tree.set_text(existing, content).is_ok()
                {
                    self.stats.texts_updated += 1;
                }
            }
            VNode::Element {
                attributes,
                children,
                ..
            } => {
                self.sync_attributes(existing, attributes);
                if self.holds_protected_value(existing) && self.tree.tag(existing) == Some("textarea") {
                    // textarea content is its value
                    self.stats.focus_preserved += 1;
                } else {
                    self.morph_children(existing, children);
                }
            }
        }
        existing
    }

    fn holds_protected_value(&self, node: NodeId) -> bool {
        holds_protected_value(self.tree, node, self.options)
    }

    fn sync_attributes(&mut self, node: NodeId, desired: &crate::node::Attributes) {
        let protect_value = self.holds_protected_value(node);
        let existing_keys: Vec<String> = self
            .tree
            .attributes(node)
            .map(|attrs| attrs.keys().cloned().collect())
            .unwrap_or_default();

        for key in existing_keys {
            if desired.contains_key(&key) {
                continue;
            }
            if protect_value && key == VALUE_ATTR {
                self.stats.focus_preserved += 1;
                continue;
            }
            if let Ok(true) = self.tree.remove_attribute(node, &key) {
                self.stats.attributes_removed += 1;
            }
        }

        for (key, value) in desired {
            if is_unsafe_key(key) {
                tracing::warn!(key = %key, "dropping unsafe attribute during morph");
                continue;
            }
            if protect_value && key == VALUE_ATTR {
                if self.tree.attr(node, key) != Some(value.as_str()) {
                    self.stats.focus_preserved += 1;
                }
                continue;
            }
            if let Ok(true) = self.tree.set_attribute(node, key, value) {
                self.stats.attributes_set += 1;
            }
        }
    }

    fn morph_children(&mut self, parent: NodeId, desired: &[VNode]) {
        let keyed: HashMap<String, NodeId> = self
            .tree
            .children(parent)
            .iter()
            .filter_map(|child| {
                self.tree
                    .attr(*child, IDENTITY_ATTR)
                    .map(|key| (key.to_string(), *child))
            })
            .collect();
        let mut matched: HashSet<NodeId> = HashSet::new();

        // After step `position`, children[..=position] are all matched nodes.
        for (position, want) in desired.iter().enumerate() {
            let current = self.tree.children(parent).get(position).copied();

            if let Some(key) = want.key() {
                if let Some(&existing) = keyed.get(key) {
                    if !matched.contains(&existing) && self.tree.contains(existing) {
                        if current != Some(existing) {
                            self.tree.relocate(parent, position, existing);
                            self.stats.moved += 1;
                        }
                        let kept = self.morph_node(existing, want);
                        matched.insert(kept);
                        continue;
                    }
                }
            } else if let Some(candidate) = current {
                let reusable = !matched.contains(&candidate)
                    && self.tree.attr(candidate, IDENTITY_ATTR).is_none()
                    && same_kind(self.tree, candidate, want);
                if reusable {
                    let kept = self.morph_node(candidate, want);
                    matched.insert(kept);
                    continue;
                }
            }

            let created = self.tree.insert_at(parent, position, want);
            self.stats.created += 1;
            matched.insert(created);
        }

        let leftovers: Vec<NodeId> = self
            .tree
            .children(parent)
            .iter()
            .skip(desired.len())
            .copied()
            .collect();
        for node in leftovers {
            if self.tree.remove_node(node).is_ok() {
                self.stats.removed += 1;
            }
        }
    }
}
