//! Markup to value-level nodes.
//!
//! Full-state replies may carry the rendered view as HTML instead of a
//! serialised tree. This is a fragment parser for the markup the server
//! renders, not an HTML5 tree builder: tags are matched by name, unmatched
//! end tags are ignored and anything left open at the end is closed.
//!
//! Comments and whitespace-only text are dropped at every level so that
//! child indices agree with the server's own tree. `data-dj-id` and every
//! other attribute pass through untouched, except the unsafe keys.

use crate::attrs::{is_blank, is_unsafe_key};
use crate::errors::MarkupError;
use crate::html::{is_raw_text, is_void};
use crate::node::{Attributes, VNode};

/// Parse markup into the view root: the first top-level element, looking
/// through `<html>` and `<body>` wrappers.
pub fn parse_markup(input: &str) -> Result<VNode, MarkupError> {
    find_root(parse_fragment(input)).ok_or(MarkupError::NoElement)
}

/// Parse markup into its top-level nodes.
pub fn parse_fragment(input: &str) -> Vec<VNode> {
    let bytes = input.as_bytes();
    let mut builder = Builder::default();
    let mut i = 0;

    // Slices are only cut at ASCII bytes, so every endpoint is a char boundary.
    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            builder.text(decode_entities(&input[start..i]));
            continue;
        }

        let rest = &input[i..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            i += comment.find("-->").map_or(rest.len(), |end| 4 + end + 3);
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            i += rest.find('>').map_or(rest.len(), |end| end + 1);
            continue;
        }
        if rest.starts_with("</") {
            let name = input[i + 2..i + 2 + name_len(&bytes[i + 2..])].to_ascii_lowercase();
            i += rest.find('>').map_or(rest.len(), |end| end + 1);
            if !name.is_empty() {
                builder.close(&name);
            }
            continue;
        }

        let name_end = i + 1 + name_len(&bytes[i + 1..]);
        if name_end == i + 1 {
            // stray '<'
            builder.text("<".to_string());
            i += 1;
            continue;
        }

        let tag = input[i + 1..name_end].to_ascii_lowercase();
        let (attributes, self_closing, next) = parse_attributes(input, name_end);
        i = next;

        if is_raw_text(&tag) && !self_closing {
            let (content, after) = raw_text(input, i, &tag);
            builder.open(tag.clone(), attributes);
            builder.text(content.to_string());
            builder.close(&tag);
            i = after;
            continue;
        }

        let closes_itself = self_closing || is_void(&tag);
        builder.open(tag.clone(), attributes);
        if closes_itself {
            builder.close(&tag);
        }
    }

    builder.finish()
}

fn name_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':'))
        .count()
}

/// Attributes of a start tag beginning at `i`. Returns the attributes,
/// whether the tag ended with `/>`, and the index just past the tag.
fn parse_attributes(input: &str, mut i: usize) -> (Attributes, bool, usize) {
    let bytes = input.as_bytes();
    let mut attributes = Attributes::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return (attributes, false, i),
            Some(b'>') => return (attributes, false, i + 1),
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => return (attributes, true, i + 2),
            Some(b'/') | Some(b'=') => {
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        let start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let name = input[start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let value_start = i + 1;
                    let end = input[value_start..]
                        .find(quote as char)
                        .map_or(bytes.len(), |end| value_start + end);
                    value = decode_entities(&input[value_start..end]);
                    i = (end + 1).min(bytes.len());
                }
                _ => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&input[value_start..i]);
                }
            }
        }

        // first occurrence wins
        if !is_unsafe_key(&name) && !attributes.contains_key(&name) {
            attributes.insert(name, value);
        }
    }
}

/// Raw content of a `<script>` or `<style>` starting at `start`, and the
/// index past its end tag.
fn raw_text<'a>(input: &'a str, start: usize, tag: &str) -> (&'a str, usize) {
    let bytes = input.as_bytes();
    let mut i = start;
    while let Some(offset) = input[i..].find("</") {
        let open = i + offset;
        let name_start = open + 2;
        let name_end = name_start + tag.len();
        let matches_tag = bytes
            .get(name_start..name_end)
            .map_or(false, |name| name.eq_ignore_ascii_case(tag.as_bytes()));
        let terminated = matches!(bytes.get(name_end), None | Some(b'>') | Some(b'/'))
            || bytes.get(name_end).map_or(false, u8::is_ascii_whitespace);
        if matches_tag && terminated {
            let after = input[name_end..]
                .find('>')
                .map_or(input.len(), |end| name_end + end + 1);
            return (&input[start..open], after);
        }
        i = open + 2;
    }
    (&input[start..], input.len())
}

/// Decode character references (`&amp;`, `&#39;`, `&#x27;`). Unknown or
/// malformed references are kept as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_reference(tail) {
            Some((ch, used)) => {
                out.push(ch);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(tail: &str) -> Option<(char, usize)> {
    let end = tail.bytes().take(12).position(|b| b == b';')?;
    let body = &tail[1..end];
    let ch = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => {
            let numeric = body.strip_prefix('#')?;
            let code = match numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, end + 1))
}

fn find_root(nodes: Vec<VNode>) -> Option<VNode> {
    let mut root = nodes.into_iter().find(VNode::is_element)?;
    while let Some(wrapper @ ("html" | "body")) = root.tag() {
        let into_body = wrapper == "html";
        let children = match root {
            VNode::Element { children, .. } => children,
            _ => return None,
        };
        root = if into_body {
            children.into_iter().find(|child| child.tag() == Some("body"))?
        } else {
            children.into_iter().find(VNode::is_element)?
        };
    }
    Some(root)
}

struct OpenElement {
    tag: String,
    attributes: Attributes,
    children: Vec<VNode>,
}

impl OpenElement {
    fn into_vnode(mut self) -> VNode {
        prune(&mut self.children);
        VNode::Element {
            tag: self.tag,
            attributes: self.attributes,
            children: self.children,
        }
    }
}

/// Stack of open elements.
#[derive(Default)]
struct Builder {
    top: Vec<VNode>,
    stack: Vec<OpenElement>,
}

impl Builder {
    fn children(&mut self) -> &mut Vec<VNode> {
        match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.top,
        }
    }

    fn text(&mut self, content: String) {
        if content.is_empty() {
            return;
        }
        let children = self.children();
        if let Some(VNode::Text { content: last }) = children.last_mut() {
            last.push_str(&content);
            return;
        }
        children.push(VNode::text(content));
    }

    fn open(&mut self, tag: String, attributes: Attributes) {
        self.stack.push(OpenElement {
            tag,
            attributes,
            children: Vec::new(),
        });
    }

    /// Close the innermost open `tag` and everything opened inside it.
    fn close(&mut self, tag: &str) {
        if let Some(position) = self.stack.iter().rposition(|open| open.tag == tag) {
            while self.stack.len() > position {
                self.pop();
            }
        }
    }

    fn pop(&mut self) {
        if let Some(open) = self.stack.pop() {
            let node = open.into_vnode();
            self.children().push(node);
        }
    }

    fn finish(mut self) -> Vec<VNode> {
        while !self.stack.is_empty() {
            self.pop();
        }
        prune(&mut self.top);
        self.top
    }
}

fn prune(children: &mut Vec<VNode>) {
    children.retain(|child| !matches!(child, VNode::Text { content } if is_blank(content)));
}
