//! HTML serialisation of value-level nodes and live subtrees. Used by the
//! CLI to print the current view and by tests to compare trees.

use crate::node::{Attributes, VNode};
use crate::tree::{LiveTree, NodeId, NodeKind};

pub fn render(node: &VNode) -> String {
    let mut out = String::new();
    render_vnode(node, false, &mut out);
    out
}

/// Render the live subtree rooted at `id`.
pub fn render_live(tree: &LiveTree, id: NodeId) -> String {
    let mut out = String::new();
    render_live_node(tree, id, false, &mut out);
    out
}

fn render_vnode(node: &VNode, raw_text: bool, out: &mut String) {
    match node {
        VNode::Element {
            tag,
            attributes,
            children,
        } => {
            open_tag(tag, attributes, out);
            if is_void(tag) {
                return;
            }
            let raw = is_raw_text(tag);
            for child in children {
                render_vnode(child, raw, out);
            }
            close_tag(tag, out);
        }
        VNode::Text { content } => push_text(content, raw_text, out),
        VNode::Comment { content } => push_comment(content, out),
    }
}

fn render_live_node(tree: &LiveTree, id: NodeId, raw_text: bool, out: &mut String) {
    match tree.kind(id) {
        Some(NodeKind::Element { tag, attributes }) => {
            open_tag(tag, attributes, out);
            if is_void(tag) {
                return;
            }
            let raw = is_raw_text(tag);
            for child in tree.children(id) {
                render_live_node(tree, *child, raw, out);
            }
            close_tag(tag, out);
        }
        Some(NodeKind::Text(content)) => push_text(content, raw_text, out),
        Some(NodeKind::Comment(content)) => push_comment(content, out),
        None => {}
    }
}

fn open_tag(tag: &str, attributes: &Attributes, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    for (key, value) in attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_html(value));
        out.push('"');
    }
    out.push('>');
}

fn close_tag(tag: &str, out: &mut String) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_text(content: &str, raw_text: bool, out: &mut String) {
    if raw_text {
        out.push_str(content);
    } else {
        out.push_str(&escape_html(content));
    }
}

fn push_comment(content: &str, out: &mut String) {
    out.push_str("<!--");
    out.push_str(content);
    out.push_str("-->");
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub(crate) fn is_raw_text(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

pub(crate) fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "img"
            | "input"
            | "br"
            | "hr"
            | "meta"
            | "link"
            | "area"
            | "base"
            | "col"
            | "embed"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}
