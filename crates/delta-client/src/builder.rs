//! Canonical trees from the live tree.
//!
//! The result has the same shape the server's markup builder produces for
//! the same content, so a diff computed on the server addresses the same
//! nodes here.

use crate::live::{LiveKind, LiveTree, NodeId};
use delta_core::vnode::{Element, VNode};

/// Builds the canonical tree rooted at `id`.
///
/// A node that is not in the tree yields an empty text node.
pub fn build(tree: &LiveTree, id: NodeId) -> VNode {
    let Some(node) = tree.get(id) else {
        return VNode::text("");
    };
    match node.kind() {
        LiveKind::Text(content) => VNode::text(content.clone()),
        LiveKind::Comment(content) => VNode::comment(content.clone()),
        LiveKind::Element(live) => {
            let mut element = Element::new(&live.tag);
            for (name, value) in &live.attributes {
                element.set_attribute(name.clone(), value.clone());
            }
            element
                .with_children(tree.meaningful_children(id).into_iter().map(|child| build(tree, child)))
                .into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_whitespace_and_reads_keys() {
        let mut tree = LiveTree::new();
        let ul = tree.create_element("UL");
        let gap = tree.create_text("\n   ");
        let li = tree.create_element("li");
        tree.set_attribute(li, "data-key", "k1");
        let text = tree.create_text(" x ");
        tree.append(li, text);
        tree.append(ul, gap);
        tree.append(ul, li);

        let expected: VNode = Element::new("ul")
            .with_child(
                Element::new("li")
                    .with_attribute("data-key", "k1")
                    .with_child(VNode::text(" x ")),
            )
            .into();
        let built = build(&tree, ul);
        assert_eq!(built, expected.clone().canonicalize());
        assert_eq!(
            built.meaningful_children().next().and_then(VNode::as_element).and_then(|e| e.key.as_deref()),
            Some("k1")
        );
    }

    #[test]
    fn round_trips_canonical_trees() {
        let node: VNode = Element::new("form")
            .with_child(Element::new("input").with_attribute("value", "a"))
            .with_child(VNode::comment("c"))
            .into();
        let (tree, root) = LiveTree::from_vnode(&node);
        assert_eq!(build(&tree, root), node);
    }

    #[test]
    fn missing_node_is_empty_text() {
        let (mut tree, root) = LiveTree::from_vnode(&VNode::text("x"));
        tree.remove(root);
        assert_eq!(build(&tree, root), VNode::text(""));
    }
}
