use crate::attrs::{IDENTITY_ATTR, STABLE_ID_ATTR};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Attribute map; insertion order is kept so rendering is deterministic.
pub type Attributes = IndexMap<String, String>;

/// Value-level virtual DOM node, as produced by the server.
///
/// A `VNode` is an immutable description of a subtree. It travels inside
/// patches and full-state payloads and is materialised into a [`LiveTree`]
/// by the mutator.
///
/// [`LiveTree`]: crate::LiveTree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VNode {
    /// HTML element
    Element {
        tag: String,
        #[serde(default)]
        attributes: Attributes,
        #[serde(default)]
        children: Vec<VNode>,
    },

    /// Text node
    Text { content: String },

    /// Comment node
    Comment { content: String },
}

impl VNode {
    pub fn element(tag: impl Into<String>) -> Self {
        VNode::Element {
            tag: tag.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        VNode::Text {
            content: content.into(),
        }
    }

    pub fn comment(content: impl Into<String>) -> Self {
        VNode::Comment {
            content: content.into(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let VNode::Element {
            ref mut attributes, ..
        } = self
        {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_child(mut self, child: VNode) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.push(child);
        }
        self
    }

    pub fn with_children(mut self, new_children: impl IntoIterator<Item = VNode>) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.extend(new_children);
        }
        self
    }

    /// Attach a stable id (`data-dj-id`) used for O(1) patch addressing.
    pub fn with_stable_id(self, id: impl Into<String>) -> Self {
        self.with_attr(STABLE_ID_ATTR, id)
    }

    /// Attach an identity key (`id`) used by the reconciler.
    pub fn with_key(self, key: impl Into<String>) -> Self {
        self.with_attr(IDENTITY_ATTR, key)
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            VNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            VNode::Element { attributes, .. } => attributes.get(key).map(String::as_str),
            _ => None,
        }
    }

    pub fn children(&self) -> &[VNode] {
        match self {
            VNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn stable_id(&self) -> Option<&str> {
        self.attr(STABLE_ID_ATTR)
    }

    pub fn key(&self) -> Option<&str> {
        self.attr(IDENTITY_ATTR)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, VNode::Text { .. })
    }

    pub fn is_element(&self) -> bool {
        matches!(self, VNode::Element { .. })
    }
}
