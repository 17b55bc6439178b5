//! # Patch Engine
//!
//! Applies a batch of patches to the live tree in four phases:
//!
//! 0. `RemoveChild`, highest index first within each parent
//! 1. `MoveChild`, children resolved before any move, applied by target index
//! 2. `InsertChild`, lowest index first within each parent; runs of
//!    consecutive indices are built off-tree and spliced in as one block
//! 3. node-targeting operations (`SetText`, `SetAttr`, `RemoveAttr`, `Replace`)
//!
//! [`PatchEngine::apply_with`] takes the reconciler's [`MorphOptions`]: a
//! focused form control keeps its value (and a focused `textarea` its text)
//! unless the batch is a broadcast.
//!
//! Parents of child operations are resolved against the tree as it stands
//! when their phase starts. A patch that fails is recorded and its siblings
//! still run; the batch fails if any patch failed. The engine never retries.

use crate::address::Address;
use crate::attrs::VALUE_ATTR;
use crate::errors::PatchError;
use crate::morph::{holds_protected_value, MorphOptions};
use crate::node::VNode;
use crate::patch::{Patch, Phase};
use crate::resolver::{resolve, significant_children};
use crate::tree::{LiveTree, NodeId};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Minimum run of consecutive inserts applied as one block.
pub const DEFAULT_BLOCK_INSERT_MIN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    /// Position of the patch in the submitted batch
    pub index: usize,
    pub phase: Phase,
    pub error: PatchError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failures: Vec<PatchFailure>,
    /// Number of block inserts performed
    pub block_inserts: usize,
    /// Value writes skipped to protect a focused control
    pub focus_preserved: usize,
    /// Live roots of mutated subtrees, in first-touch order
    pub touched: Vec<NodeId>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, index: usize, phase: Phase, error: PatchError) {
        tracing::debug!(patch = index, ?phase, %error, "patch failed");
        self.failures.push(PatchFailure {
            index,
            phase,
            error,
        });
    }

    fn touch(&mut self, node: NodeId) {
        if !self.touched.contains(&node) {
            self.touched.push(node);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatchEngine {
    block_insert_min: usize,
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved child operation waiting for its phase.
struct ChildOp<'a> {
    index: usize,
    parent: NodeId,
    group: usize,
    patch: &'a Patch,
}

impl PatchEngine {
    pub fn new() -> Self {
        Self {
            block_insert_min: DEFAULT_BLOCK_INSERT_MIN,
        }
    }

    pub fn with_block_insert_min(mut self, min: usize) -> Self {
        self.block_insert_min = min.max(2);
        self
    }

    pub fn apply(&self, tree: &mut LiveTree, patches: &[Patch]) -> ApplyReport {
        self.apply_with(tree, patches, &MorphOptions::default())
    }

    pub fn apply_with(&self, tree: &mut LiveTree, patches: &[Patch], options: &MorphOptions) -> ApplyReport {
        let mut report = ApplyReport::default();

        self.apply_removals(tree, patches, &mut report);
        self.apply_moves(tree, patches, &mut report);
        self.apply_inserts(tree, patches, &mut report);
        self.apply_node_ops(tree, patches, options, &mut report);

        report.touched.retain(|n| tree.contains(*n));
        if !report.is_success() {
            tracing::warn!(
                failed = report.failures.len(),
                applied = report.applied,
                total = patches.len(),
                "patch batch applied with failures"
            );
        }
        report
    }

    /// Resolve the parents of all patches in `phase`, grouping by parent in
    /// first-seen order.
    fn collect<'a>(
        tree: &LiveTree,
        patches: &'a [Patch],
        phase: Phase,
        report: &mut ApplyReport,
    ) -> Vec<ChildOp<'a>> {
        let mut groups: HashMap<NodeId, usize> = HashMap::new();
        let mut ops = Vec::new();
        for (index, patch) in patches.iter().enumerate() {
            if patch.phase() != phase {
                continue;
            }
            match resolve(tree, &patch.address()) {
                Ok(parent) => {
                    let next_group = groups.len();
                    let group = *groups.entry(parent).or_insert(next_group);
                    ops.push(ChildOp {
                        index,
                        parent,
                        group,
                        patch,
                    });
                }
                Err(error) => report.fail(index, phase, error.into()),
            }
        }
        ops
    }

    fn apply_removals(&self, tree: &mut LiveTree, patches: &[Patch], report: &mut ApplyReport) {
        let mut ops = Self::collect(tree, patches, Phase::Remove, report);
        ops.sort_by_key(|op| match op.patch {
            Patch::RemoveChild { index, .. } => (op.group, Reverse(*index)),
            _ => (op.group, Reverse(0)),
        });

        for op in ops {
            if let Patch::RemoveChild { index, .. } = op.patch {
                match tree.remove_child(op.parent, *index) {
                    Ok(_) => {
                        report.applied += 1;
                        report.touch(op.parent);
                    }
                    Err(error) => report.fail(op.index, Phase::Remove, error),
                }
            }
        }
    }

    fn apply_moves(&self, tree: &mut LiveTree, patches: &[Patch], report: &mut ApplyReport) {
        let ops = Self::collect(tree, patches, Phase::Move, report);

        // Resolve every moved child before the first move shifts indices.
        let mut resolved: Vec<(usize, NodeId, NodeId, usize)> = Vec::new();
        for op in &ops {
            if let Patch::MoveChild {
                from, to, child_d, ..
            } = op.patch
            {
                let by_hint = child_d
                    .as_deref()
                    .and_then(|id| tree.by_stable_id(id))
                    .filter(|child| tree.parent(*child) == Some(op.parent));
                let child = by_hint.or_else(|| significant_children(tree, op.parent).get(*from).copied());
                match child {
                    Some(child) => resolved.push((op.index, op.parent, child, *to)),
                    None => {
                        let len = significant_children(tree, op.parent).len();
                        report.fail(
                            op.index,
                            Phase::Move,
                            PatchError::IndexOutOfRange { index: *from, len },
                        );
                    }
                }
            }
        }

        resolved.sort_by_key(|(_, _, _, to)| *to);
        for (index, parent, child, to) in resolved {
            match tree.move_child(parent, child, to) {
                Ok(()) => {
                    report.applied += 1;
                    report.touch(parent);
                }
                Err(error) => report.fail(index, Phase::Move, error),
            }
        }
    }

    fn apply_inserts(&self, tree: &mut LiveTree, patches: &[Patch], report: &mut ApplyReport) {
        let mut ops = Self::collect(tree, patches, Phase::Insert, report);
        ops.sort_by_key(|op| match op.patch {
            Patch::InsertChild { index, .. } => (op.group, *index),
            _ => (op.group, 0),
        });

        let mut start = 0;
        while start < ops.len() {
            let end = self.run_end(&ops, start);
            let run = &ops[start..end];

            if run.len() >= self.block_insert_min {
                Self::insert_block(tree, run, report);
            } else {
                for op in run {
                    if let Patch::InsertChild { index, node, .. } = op.patch {
                        match tree.insert_child(op.parent, *index, node) {
                            Ok(_) => {
                                report.applied += 1;
                                report.touch(op.parent);
                            }
                            Err(error) => report.fail(op.index, Phase::Insert, error),
                        }
                    }
                }
            }
            start = end;
        }
    }

    /// End (exclusive) of the run of consecutive-index inserts on the same
    /// parent starting at `start`.
    fn run_end(&self, ops: &[ChildOp<'_>], start: usize) -> usize {
        let index_of = |op: &ChildOp<'_>| match op.patch {
            Patch::InsertChild { index, .. } => *index,
            _ => usize::MAX,
        };
        let mut end = start + 1;
        while end < ops.len()
            && ops[end].parent == ops[start].parent
            && index_of(&ops[end]) == index_of(&ops[end - 1]).wrapping_add(1)
        {
            end += 1;
        }
        end
    }

    fn insert_block(tree: &mut LiveTree, run: &[ChildOp<'_>], report: &mut ApplyReport) {
        let first_index = match run[0].patch {
            Patch::InsertChild { index, .. } => *index,
            _ => return,
        };
        let nodes: Vec<&VNode> = run
            .iter()
            .filter_map(|op| match op.patch {
                Patch::InsertChild { node, .. } => Some(node),
                _ => None,
            })
            .collect();

        match tree.insert_children(run[0].parent, first_index, &nodes) {
            Ok(_) => {
                report.applied += run.len();
                report.block_inserts += 1;
                report.touch(run[0].parent);
            }
            Err(error) => {
                for op in run {
                    report.fail(op.index, Phase::Insert, error.clone());
                }
            }
        }
    }

    fn apply_node_ops(
        &self,
        tree: &mut LiveTree,
        patches: &[Patch],
        options: &MorphOptions,
        report: &mut ApplyReport,
    ) {
        for (index, patch) in patches.iter().enumerate() {
            if patch.phase() != Phase::Node {
                continue;
            }
            let at = patch.address();
            if options.focused.is_some() && Self::writes_protected_value(tree, patch, &at, options) {
                tracing::debug!(patch = index, "keeping focused control value");
                report.focus_preserved += 1;
                continue;
            }
            match Self::apply_node_op(tree, patch, &at) {
                Ok(node) => {
                    report.applied += 1;
                    report.touch(node);
                }
                Err(error) => report.fail(index, Phase::Node, error),
            }
        }
    }

    fn writes_protected_value(tree: &LiveTree, patch: &Patch, at: &Address, options: &MorphOptions) -> bool {
        let target = match resolve(tree, at) {
            Ok(target) => target,
            Err(_) => return false,
        };
        match patch {
            Patch::SetAttribute { key, .. } | Patch::RemoveAttribute { key, .. } => {
                key == VALUE_ATTR && holds_protected_value(tree, target, options)
            }
            // textarea content is its value
            Patch::SetText { .. } => tree
                .parent(target)
                .filter(|parent| tree.tag(*parent) == Some("textarea"))
                .map_or(false, |parent| holds_protected_value(tree, parent, options)),
            _ => false,
        }
    }

    fn apply_node_op(tree: &mut LiveTree, patch: &Patch, at: &Address) -> Result<NodeId, PatchError> {
        let target = resolve(tree, at)?;
        match patch {
            Patch::Replace { node, .. } => tree.replace(target, node),
            Patch::SetText { text, .. } => tree.set_text(target, text).map(|_| target),
            Patch::SetAttribute { key, value, .. } => {
                tree.set_attribute(target, key, value).map(|_| target)
            }
            Patch::RemoveAttribute { key, .. } => tree.remove_attribute(target, key).map(|_| target),
            Patch::InsertChild { .. } | Patch::RemoveChild { .. } | Patch::MoveChild { .. } => {
                Ok(target)
            }
        }
    }
}
