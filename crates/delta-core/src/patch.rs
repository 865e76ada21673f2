//! Structural edit operations produced by the diff engine.

use crate::vnode::VNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Meaningful-child indices from the managed root. Empty is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path to the `index`-th meaningful child of this node.
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    /// Splits into (parent, last index). `None` for the root.
    pub fn split_last(&self) -> Option<(&[usize], usize)> {
        self.0
            .split_last()
            .map(|(last, parent)| (parent, *last))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(segments: Vec<usize>) -> Self {
        Self(segments)
    }
}

impl<const N: usize> From<[usize; N]> for NodePath {
    fn from(segments: [usize; N]) -> Self {
        Self(segments.to_vec())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// One step of a [`Patch::Reorder`]: take the child at `from` out of the
/// list and insert it at `to`, both relative to the list as left by the
/// previous moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

impl Move {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Performs the move on a plain list. Out-of-range moves are rejected.
    pub fn apply_to<T>(&self, items: &mut Vec<T>) -> bool {
        if self.from >= items.len() || self.to >= items.len() {
            return false;
        }
        let item = items.remove(self.from);
        items.insert(self.to, item);
        true
    }
}

/// A structural edit.
///
/// Every path except a `Create`'s addresses its target node in the old
/// tree; lists are ordered so that an applier resolving them in sequence
/// still finds that node. A `Create`'s path addresses the parent plus a
/// trailing insertion index into the child list as mutated so far. A
/// `Reorder`'s path addresses the parent whose children move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Patch {
    Create {
        path: NodePath,
        node: VNode,
    },
    Remove {
        path: NodePath,
    },
    Replace {
        path: NodePath,
        node: VNode,
    },
    UpdateText {
        path: NodePath,
        text: String,
    },
    UpdateAttributes {
        path: NodePath,
        #[serde(default)]
        set: BTreeMap<String, String>,
        #[serde(default)]
        remove: Vec<String>,
    },
    Reorder {
        path: NodePath,
        moves: Vec<Move>,
    },
}

impl Patch {
    pub fn path(&self) -> &NodePath {
        match self {
            Patch::Create { path, .. }
            | Patch::Remove { path }
            | Patch::Replace { path, .. }
            | Patch::UpdateText { path, .. }
            | Patch::UpdateAttributes { path, .. }
            | Patch::Reorder { path, .. } => path,
        }
    }

    /// Wire name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Patch::Create { .. } => "Create",
            Patch::Remove { .. } => "Remove",
            Patch::Replace { .. } => "Replace",
            Patch::UpdateText { .. } => "UpdateText",
            Patch::UpdateAttributes { .. } => "UpdateAttributes",
            Patch::Reorder { .. } => "Reorder",
        }
    }

    /// A `Create` or `Replace` aimed at the managed root.
    pub fn replaces_region(&self) -> bool {
        matches!(self, Patch::Create { .. } | Patch::Replace { .. }) && self.path().is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verbose_update_text_shape() {
        let patch = Patch::UpdateText {
            path: [1, 0].into(),
            text: "C".into(),
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"type": "UpdateText", "path": [1, 0], "text": "C"})
        );
    }

    #[test]
    fn reorder_moves_serialize_as_objects() {
        let patch = Patch::Reorder {
            path: NodePath::root(),
            moves: vec![Move::new(2, 0)],
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"type": "Reorder", "path": [], "moves": [{"from": 2, "to": 0}]})
        );
    }

    #[test]
    fn move_applies_remove_then_insert() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        assert!(Move::new(3, 0).apply_to(&mut items));
        assert_eq!(items, vec!['d', 'a', 'b', 'c']);
        assert!(Move::new(1, 3).apply_to(&mut items));
        assert_eq!(items, vec!['d', 'b', 'c', 'a']);
        assert!(!Move::new(4, 0).apply_to(&mut items));
    }

    #[test]
    fn path_helpers() {
        let path = NodePath::from([2, 5]);
        assert_eq!(path.split_last(), Some((&[2usize][..], 5)));
        assert_eq!(path.child(1), NodePath::from([2, 5, 1]));
        assert_eq!(path.to_string(), "/2/5");
        assert!(NodePath::root().split_last().is_none());
    }

    #[test]
    fn region_replacement_detection() {
        let node = VNode::text("x");
        assert!(
            Patch::Replace {
                path: NodePath::root(),
                node: node.clone()
            }
            .replaces_region()
        );
        assert!(
            !Patch::Replace {
                path: [0].into(),
                node
            }
            .replaces_region()
        );
        assert!(!Patch::Remove { path: NodePath::root() }.replaces_region());
    }
}
