//! The canonical tree model.
//!
//! Both tree builders (markup on the server, live tree on the client) must
//! produce exactly this shape. In particular they share [`is_significant`]:
//! whitespace-only text never takes part in sibling indexing, so a path
//! computed on one side resolves to the same node on the other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute that carries an element's reconciliation key.
pub const KEY_ATTRIBUTE: &str = "data-key";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose `value` is live user input rather than just markup.
const INPUT_LIKE_ELEMENTS: &[&str] = &["input", "select", "textarea"];

/// A node of the canonical tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VNode {
    Element(Element),
    Text { content: String },
    Comment { content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Whitespace as HTML defines it. `&nbsp;` and other Unicode spaces are content.
pub fn is_whitespace_only(content: &str) -> bool {
    content.bytes().all(|b| b.is_ascii_whitespace())
}

/// The significance filter shared by every tree builder and the patch applier.
pub fn is_significant(node: &VNode) -> bool {
    match node {
        VNode::Text { content } => !is_whitespace_only(content),
        VNode::Element(_) | VNode::Comment { .. } => true,
    }
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn is_input_like(tag: &str) -> bool {
    INPUT_LIKE_ELEMENTS.contains(&tag)
}

impl Element {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self {
            tag: tag.as_ref().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            key: None,
        }
    }

    /// Sets an attribute; `data-key` also becomes the element's key.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: impl Into<VNode>) -> Self {
        if !is_void_element(&self.tag) {
            self.children.push(child.into());
        }
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        for child in children {
            self = self.with_child(child);
        }
        self
    }

    pub fn set_attribute(&mut self, name: String, value: String) {
        if name == KEY_ATTRIBUTE {
            self.key = Some(value.clone());
        }
        self.attributes.insert(name, value);
    }

    pub fn is_void(&self) -> bool {
        is_void_element(&self.tag)
    }
}

impl From<Element> for VNode {
    fn from(element: Element) -> Self {
        VNode::Element(element)
    }
}

impl VNode {
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

    pub fn is_significant(&self) -> bool {
        is_significant(self)
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            VNode::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Children that take part in path addressing.
    pub fn meaningful_children(&self) -> impl Iterator<Item = &VNode> {
        self.as_element()
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|c| c.is_significant())
    }

    /// Follows a path of meaningful-child indices from this node.
    pub fn at_path(&self, path: &[usize]) -> Option<&VNode> {
        let mut node = self;
        for &index in path {
            node = node.meaningful_children().nth(index)?;
        }
        Some(node)
    }

    /// Brings a hand-built tree into canonical shape: lowercase tags, keys
    /// derived from `data-key`, no children on void elements and no
    /// insignificant text.
    #[must_use]
    pub fn canonicalize(self) -> VNode {
        match self {
            VNode::Element(element) => {
                let mut canonical = Element::new(&element.tag);
                for (name, value) in element.attributes {
                    canonical.set_attribute(name, value);
                }
                if !canonical.is_void() {
                    canonical.children = element
                        .children
                        .into_iter()
                        .filter(VNode::is_significant)
                        .map(VNode::canonicalize)
                        .collect();
                }
                VNode::Element(canonical)
            }
            other => other,
        }
    }

    /// Renders the node back to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            VNode::Text { content } => escape_into(content, false, out),
            VNode::Comment { content } => {
                out.push_str("<!--");
                out.push_str(content);
                out.push_str("-->");
            }
            VNode::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if element.is_void() {
                    return;
                }
                for child in &element.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
