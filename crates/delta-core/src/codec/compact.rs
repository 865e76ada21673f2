//! Minified patch shape: single-character tags and field names.

use crate::patch::{Move, NodePath, Patch};
use crate::vnode::{Element, VNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "o")]
pub enum CompactPatch {
    #[serde(rename = "c")]
    Create { p: NodePath, n: CompactNode },
    #[serde(rename = "x")]
    Remove { p: NodePath },
    #[serde(rename = "r")]
    Replace { p: NodePath, n: CompactNode },
    #[serde(rename = "t")]
    UpdateText { p: NodePath, x: String },
    #[serde(rename = "a")]
    UpdateAttributes {
        p: NodePath,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        s: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        d: Vec<String>,
    },
    /// Moves as `[from, to]` pairs.
    #[serde(rename = "m")]
    Reorder { p: NodePath, m: Vec<(usize, usize)> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "k")]
pub enum CompactNode {
    #[serde(rename = "e")]
    Element {
        t: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        a: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        c: Vec<CompactNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<String>,
    },
    #[serde(rename = "t")]
    Text { x: String },
    #[serde(rename = "c")]
    Comment { x: String },
}

impl From<&VNode> for CompactNode {
    fn from(node: &VNode) -> Self {
        match node {
            VNode::Element(element) => CompactNode::Element {
                t: element.tag.clone(),
                a: element.attributes.clone(),
                c: element.children.iter().map(CompactNode::from).collect(),
                y: element.key.clone(),
            },
            VNode::Text { content } => CompactNode::Text { x: content.clone() },
            VNode::Comment { content } => CompactNode::Comment { x: content.clone() },
        }
    }
}

impl From<CompactNode> for VNode {
    fn from(node: CompactNode) -> Self {
        match node {
            CompactNode::Element { t, a, c, y } => VNode::Element(Element {
                tag: t,
                attributes: a,
                children: c.into_iter().map(VNode::from).collect(),
                key: y,
            }),
            CompactNode::Text { x } => VNode::Text { content: x },
            CompactNode::Comment { x } => VNode::Comment { content: x },
        }
    }
}

impl From<&Patch> for CompactPatch {
    fn from(patch: &Patch) -> Self {
        match patch {
            Patch::Create { path, node } => CompactPatch::Create {
                p: path.clone(),
                n: node.into(),
            },
            Patch::Remove { path } => CompactPatch::Remove { p: path.clone() },
            Patch::Replace { path, node } => CompactPatch::Replace {
                p: path.clone(),
                n: node.into(),
            },
            Patch::UpdateText { path, text } => CompactPatch::UpdateText {
                p: path.clone(),
                x: text.clone(),
            },
            Patch::UpdateAttributes { path, set, remove } => CompactPatch::UpdateAttributes {
                p: path.clone(),
                s: set.clone(),
                d: remove.clone(),
            },
            Patch::Reorder { path, moves } => CompactPatch::Reorder {
                p: path.clone(),
                m: moves.iter().map(|mv| (mv.from, mv.to)).collect(),
            },
        }
    }
}

impl From<CompactPatch> for Patch {
    fn from(patch: CompactPatch) -> Self {
        match patch {
            CompactPatch::Create { p, n } => Patch::Create {
                path: p,
                node: n.into(),
            },
            CompactPatch::Remove { p } => Patch::Remove { path: p },
            CompactPatch::Replace { p, n } => Patch::Replace {
                path: p,
                node: n.into(),
            },
            CompactPatch::UpdateText { p, x } => Patch::UpdateText { path: p, text: x },
            CompactPatch::UpdateAttributes { p, s, d } => Patch::UpdateAttributes {
                path: p,
                set: s,
                remove: d,
            },
            CompactPatch::Reorder { p, m } => Patch::Reorder {
                path: p,
                moves: m.into_iter().map(|(from, to)| Move { from, to }).collect(),
            },
        }
    }
}
