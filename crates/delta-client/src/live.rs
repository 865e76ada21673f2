//! The client's live node tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A node keeps its
//! id for as long as it is attached, however its siblings move, so anything
//! holding an id (a component's host, focus, an input's live value) survives
//! patches that do not touch that node.
//!
//! Unlike a canonical [`VNode`] tree, a live tree may hold whitespace-only
//! text between elements. Such nodes are skipped by
//! [`LiveTree::meaningful_children`], which is what patch paths index.

use delta_core::vnode::{Element, VNode, is_input_like, is_whitespace_only};
use std::collections::BTreeMap;

/// Handle of a node in a [`LiveTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// An element in the live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// The current value of an input-like element, which may differ from
    /// its `value` attribute once the user has typed.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveKind {
    Element(LiveElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct LiveNode {
    kind: LiveKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl LiveNode {
    pub fn kind(&self) -> &LiveKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// All children, including whitespace-only text.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn as_element(&self) -> Option<&LiveElement> {
        match &self.kind {
            LiveKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn is_significant(&self) -> bool {
        match &self.kind {
            LiveKind::Text(content) => !is_whitespace_only(content),
            LiveKind::Element(_) | LiveKind::Comment(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveTree {
    slots: Vec<Option<LiveNode>>,
    free: Vec<usize>,
}

impl LiveTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree holding `node` and returns it with the root's id.
    pub fn from_vnode(node: &VNode) -> (Self, NodeId) {
        let mut tree = Self::new();
        let root = tree.insert_vnode(node);
        (tree, root)
    }

    /// Number of nodes in the arena, attached or not.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&LiveNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut LiveNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, kind: LiveKind) -> NodeId {
        let node = LiveNode {
            kind,
            parent: None,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(LiveKind::Element(LiveElement {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            value: None,
        }))
    }

    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(LiveKind::Text(content.into()))
    }

    pub fn create_comment(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(LiveKind::Comment(content.into()))
    }

    /// Instantiates a detached subtree for `node`.
    pub fn insert_vnode(&mut self, node: &VNode) -> NodeId {
        match node {
            VNode::Text { content } => self.create_text(content.clone()),
            VNode::Comment { content } => self.create_comment(content.clone()),
            VNode::Element(element) => self.insert_element(element),
        }
    }

    fn insert_element(&mut self, element: &Element) -> NodeId {
        let id = self.create_element(element.tag.clone());
        if let Some(LiveKind::Element(live)) = self.get_mut(id).map(|n| &mut n.kind) {
            live.attributes = element.attributes.clone();
            if is_input_like(&live.tag) {
                live.value = live.attributes.get("value").cloned();
            }
        }
        for child in &element.children {
            let child = self.insert_vnode(child);
            self.append(id, child);
        }
        id
    }

    /// Children of `id` that patch paths index.
    pub fn meaningful_children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|node| {
                node.children
                    .iter()
                    .copied()
                    .filter(|&child| self.get(child).is_some_and(LiveNode::is_significant))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Follows a path of meaningful-child indices from `root`.
    pub fn resolve(&self, root: NodeId, path: &[usize]) -> Option<NodeId> {
        let mut node = self.get(root).map(|_| root)?;
        for &index in path {
            node = *self.meaningful_children(node).get(index)?;
        }
        Some(node)
    }

    /// Detaches `child` from its parent, if any.
    pub fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.get(child).and_then(LiveNode::parent) else {
            return;
        };
        if let Some(node) = self.get_mut(parent) {
            node.children.retain(|&c| c != child);
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = None;
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.insert_before(parent, child, None)
    }

    /// Moves `child` under `parent`, before `reference` or at the end.
    ///
    /// Returns `false` and changes nothing if a node is missing, `reference`
    /// is not a child of `parent`, or the move would make `child` its own
    /// ancestor.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> bool {
        if !self.contains(parent) || !self.contains(child) || self.is_ancestor(child, parent) {
            return false;
        }
        if reference == Some(child) {
            return true;
        }
        if let Some(reference) = reference {
            if self.get(reference).and_then(LiveNode::parent) != Some(parent) {
                return false;
            }
        }

        self.detach(child);
        let Some(node) = self.get_mut(parent) else {
            return false;
        };
        let at = reference
            .and_then(|r| node.children.iter().position(|&c| c == r))
            .unwrap_or(node.children.len());
        node.children.insert(at, child);
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        true
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.get(current).and_then(LiveNode::parent);
        }
        false
    }

    /// Detaches `id` and frees its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(current.0);
            }
        }
    }

    /// Puts `new` where `old` is and frees `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        if !self.contains(old) || !self.contains(new) {
            return false;
        }
        if let Some(parent) = self.get(old).and_then(LiveNode::parent) {
            if !self.insert_before(parent, new, Some(old)) {
                return false;
            }
        } else {
            self.detach(new);
        }
        self.remove(old);
        true
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(LiveKind::Element(element)) => {
                element.attributes.insert(name.to_owned(), value.to_owned());
                true
            }
            _ => false,
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(LiveKind::Element(element)) => {
                element.attributes.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Sets the live value of an element, as user input would.
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) -> bool {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(LiveKind::Element(element)) => {
                element.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.as_element()?.value.as_deref()
    }

    /// Replaces the content of a text or comment node.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> bool {
        match self.get_mut(id).map(|n| &mut n.kind) {
            Some(LiveKind::Text(content) | LiveKind::Comment(content)) => {
                text.clone_into(content);
                true
            }
            _ => false,
        }
    }
}
