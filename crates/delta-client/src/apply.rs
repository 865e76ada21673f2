//! Applies patch lists to the live tree.
//!
//! Patches are applied in order and each path is resolved against the tree
//! as left by the patches before it. A patch whose target cannot be
//! resolved is skipped and recorded in the [`ApplyReport`]; the rest of the
//! list still applies. A report with skipped patches means the live tree no
//! longer matches what the server believes it is.

use crate::live::{LiveKind, LiveTree, NodeId};
use delta_core::patch::{Move, NodePath, Patch};
use delta_core::vnode::{VNode, is_input_like};
use std::collections::BTreeMap;

/// Why a patch was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path does not lead to a node.
    PathNotFound,
    /// The patch needs an element but the path leads elsewhere.
    NotAnElement,
    /// `UpdateText` aimed at something other than a text or comment node.
    NotCharacterData,
    /// A reorder move fell outside the child list.
    MoveOutOfRange { from: usize, to: usize, len: usize },
    /// The patch would detach the managed root.
    DetachedRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPatch {
    /// Position of the patch in its list.
    pub index: usize,
    pub kind: &'static str,
    pub path: NodePath,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// The managed root after the patches ran.
    pub root: NodeId,
    pub applied: usize,
    pub skipped: Vec<SkippedPatch>,
    /// Whether the whole managed region was replaced.
    pub replaced_root: bool,
}

impl ApplyReport {
    /// A report for a root nothing was applied to.
    pub fn untouched(root: NodeId) -> Self {
        Self {
            root,
            applied: 0,
            skipped: Vec::new(),
            replaced_root: false,
        }
    }

    /// Whether any patch was skipped.
    pub fn diverged(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Applies `patches` to the region managed by `root`.
///
/// A list made of exactly one root-path `Replace` or `Create` replaces the
/// whole region; the new root is returned in the report.
pub fn apply_patches(tree: &mut LiveTree, root: NodeId, patches: &[Patch]) -> ApplyReport {
    let mut report = ApplyReport::untouched(root);

    if let [Patch::Replace { path, node } | Patch::Create { path, node }] = patches {
        if path.is_root() {
            replace_root(tree, &mut report, node);
            report.applied = 1;
            return report;
        }
    }

    for (index, patch) in patches.iter().enumerate() {
        match apply_one(tree, &mut report, patch) {
            Ok(()) => report.applied += 1,
            Err(reason) => {
                log::warn!(
                    "skipped {} at {}: {reason:?}",
                    patch.kind(),
                    patch.path()
                );
                report.skipped.push(SkippedPatch {
                    index,
                    kind: patch.kind(),
                    path: patch.path().clone(),
                    reason,
                });
            }
        }
    }
    report
}

fn replace_root(tree: &mut LiveTree, report: &mut ApplyReport, node: &VNode) {
    let new_root = tree.insert_vnode(node);
    if tree.contains(report.root) {
        tree.replace(report.root, new_root);
    }
    report.root = new_root;
    report.replaced_root = true;
}

fn apply_one(tree: &mut LiveTree, report: &mut ApplyReport, patch: &Patch) -> Result<(), SkipReason> {
    let root = report.root;
    match patch {
        Patch::Create { path, node } => {
            let (parent_path, index) = path.split_last().ok_or(SkipReason::PathNotFound)?;
            let parent = resolve_element(tree, root, parent_path)?;
            let reference = tree.meaningful_children(parent).get(index).copied();
            let child = tree.insert_vnode(node);
            tree.insert_before(parent, child, reference);
            Ok(())
        }
        Patch::Remove { path } => {
            if path.is_root() {
                return Err(SkipReason::DetachedRoot);
            }
            let target = resolve(tree, root, path)?;
            tree.remove(target);
            Ok(())
        }
        Patch::Replace { path, node } => {
            if path.is_root() {
                replace_root(tree, report, node);
                return Ok(());
            }
            let target = resolve(tree, root, path)?;
            let replacement = tree.insert_vnode(node);
            tree.replace(target, replacement);
            Ok(())
        }
        Patch::UpdateText { path, text } => {
            let target = resolve(tree, root, path)?;
            if tree.set_text(target, text) {
                Ok(())
            } else {
                Err(SkipReason::NotCharacterData)
            }
        }
        Patch::UpdateAttributes { path, set, remove } => {
            let target = resolve_element(tree, root, path.as_slice())?;
            update_attributes(tree, target, set, remove);
            Ok(())
        }
        Patch::Reorder { path, moves } => {
            let parent = resolve_element(tree, root, path.as_slice())?;
            reorder(tree, parent, moves)
        }
    }
}

fn resolve(tree: &LiveTree, root: NodeId, path: &NodePath) -> Result<NodeId, SkipReason> {
    tree.resolve(root, path.as_slice()).ok_or(SkipReason::PathNotFound)
}

fn resolve_element(tree: &LiveTree, root: NodeId, path: &[usize]) -> Result<NodeId, SkipReason> {
    let id = tree.resolve(root, path).ok_or(SkipReason::PathNotFound)?;
    match tree.get(id).map(|node| node.kind()) {
        Some(LiveKind::Element(_)) => Ok(id),
        _ => Err(SkipReason::NotAnElement),
    }
}

fn update_attributes(
    tree: &mut LiveTree,
    target: NodeId,
    set: &BTreeMap<String, String>,
    remove: &[String],
) {
    let input_like = tree
        .get(target)
        .and_then(|node| node.as_element())
        .is_some_and(|element| is_input_like(&element.tag));
    for (name, value) in set {
        tree.set_attribute(target, name, value);
        if input_like && name == "value" {
            tree.set_value(target, Some(value.clone()));
        }
    }
    for name in remove {
        tree.remove_attribute(target, name);
        if input_like && name == "value" {
            tree.set_value(target, None);
        }
    }
}

/// Applies `moves` to the children of `parent`, or none of them when any
/// move is out of range.
fn reorder(tree: &mut LiveTree, parent: NodeId, moves: &[Move]) -> Result<(), SkipReason> {
    let mut children = tree.meaningful_children(parent);
    let mut scratch = children.clone();
    for step in moves {
        let len = scratch.len();
        if !step.apply_to(&mut scratch) {
            return Err(SkipReason::MoveOutOfRange {
                from: step.from,
                to: step.to,
                len,
            });
        }
    }

    for step in moves {
        step.apply_to(&mut children);
        let moved = children[step.to];
        let reference = children.get(step.to + 1).copied();
        tree.insert_before(parent, moved, reference);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use delta_core::vnode::Element;

    fn li(key: &str) -> VNode {
        Element::new("li")
            .with_attribute("data-key", key)
            .with_child(VNode::text(key))
            .into()
    }

    fn ul(keys: &[&str]) -> VNode {
        Element::new("ul")
            .with_children(keys.iter().map(|k| li(k)))
            .into()
    }

    #[test]
    fn empty_list_changes_nothing() {
        let old = ul(&["a", "b"]);
        let (mut tree, root) = LiveTree::from_vnode(&old);
        let report = apply_patches(&mut tree, root, &[]);
        assert_eq!(report, ApplyReport::untouched(root));
        assert_eq!(build(&tree, root), old);
    }

    #[test]
    fn reorder_moves_are_sequential() {
        // [a, b, c] -> move(0, 2) -> [b, c, a] -> move(0, 1) -> [c, b, a]
        let (mut tree, root) = LiveTree::from_vnode(&ul(&["a", "b", "c"]));
        let before = tree.meaningful_children(root);
        let report = apply_patches(
            &mut tree,
            root,
            &[Patch::Reorder {
                path: NodePath::root(),
                moves: vec![Move::new(0, 2), Move::new(0, 1)],
            }],
        );
        assert!(!report.diverged());
        assert_eq!(build(&tree, root), ul(&["c", "b", "a"]));
        assert_eq!(
            tree.meaningful_children(root),
            vec![before[2], before[1], before[0]]
        );
    }

    #[test]
    fn create_inserts_before_or_appends() {
        let (mut tree, root) = LiveTree::from_vnode(&ul(&["a", "c"]));
        let gap = tree.create_text("\n");
        tree.append(root, gap);

        apply_patches(
            &mut tree,
            root,
            &[
                Patch::Create {
                    path: [1].into(),
                    node: li("b"),
                },
                Patch::Create {
                    path: [3].into(),
                    node: li("d"),
                },
            ],
        );
        assert_eq!(build(&tree, root), ul(&["a", "b", "c", "d"]));
    }

    #[test]
    fn value_attribute_syncs_live_value() {
        let form: VNode = Element::new("form")
            .with_child(Element::new("input").with_attribute("value", "old"))
            .into();
        let (mut tree, root) = LiveTree::from_vnode(&form);
        let input = tree.resolve(root, &[0]).expect("input");
        tree.set_value(input, Some("typed".into()));

        apply_patches(
            &mut tree,
            root,
            &[Patch::UpdateAttributes {
                path: [0].into(),
                set: BTreeMap::from([("value".to_owned(), "new".to_owned())]),
                remove: Vec::new(),
            }],
        );
        assert_eq!(tree.value(input), Some("new"));

        apply_patches(
            &mut tree,
            root,
            &[Patch::UpdateAttributes {
                path: [0].into(),
                set: BTreeMap::new(),
                remove: vec!["value".to_owned()],
            }],
        );
        assert_eq!(tree.value(input), None);
    }

    #[test]
    fn value_attribute_on_other_elements_is_only_an_attribute() {
        let meter: VNode = Element::new("div")
            .with_child(Element::new("meter").with_attribute("value", "1"))
            .into();
        let (mut tree, root) = LiveTree::from_vnode(&meter);
        let target = tree.resolve(root, &[0]).expect("meter");

        apply_patches(
            &mut tree,
            root,
            &[Patch::UpdateAttributes {
                path: [0].into(),
                set: BTreeMap::from([("value".to_owned(), "2".to_owned())]),
                remove: Vec::new(),
            }],
        );
        assert_eq!(tree.value(target), None);
        assert_eq!(
            tree.get(target)
                .and_then(|node| node.as_element())
                .and_then(|element| element.attributes.get("value"))
                .map(String::as_str),
            Some("2")
        );
    }

    #[test]
    fn reorder_with_a_bad_move_leaves_the_list_alone() {
        let (mut tree, root) = LiveTree::from_vnode(&ul(&["a", "b", "c"]));
        let before = tree.meaningful_children(root);

        let report = apply_patches(
            &mut tree,
            root,
            &[Patch::Reorder {
                path: NodePath::root(),
                moves: vec![Move::new(0, 2), Move::new(1, 7)],
            }],
        );
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::MoveOutOfRange { from: 1, to: 7, len: 3 }
        );
        assert_eq!(tree.meaningful_children(root), before);
        assert_eq!(build(&tree, root), ul(&["a", "b", "c"]));
    }

    #[test]
    fn unresolvable_patches_are_reported() {
        let (mut tree, root) = LiveTree::from_vnode(&ul(&["a"]));
        let report = apply_patches(
            &mut tree,
            root,
            &[
                Patch::Remove { path: [5].into() },
                Patch::UpdateText {
                    path: [0].into(),
                    text: "x".into(),
                },
                Patch::Reorder {
                    path: NodePath::root(),
                    moves: vec![Move::new(0, 3)],
                },
                Patch::Remove {
                    path: NodePath::root(),
                },
                Patch::UpdateText {
                    path: [0, 0].into(),
                    text: "z".into(),
                },
            ],
        );
        assert!(report.diverged());
        assert_eq!(report.applied, 1);
        let reasons: Vec<SkipReason> = report.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::PathNotFound,
                SkipReason::NotCharacterData,
                SkipReason::MoveOutOfRange { from: 0, to: 3, len: 1 },
                SkipReason::DetachedRoot,
            ]
        );
        assert_eq!(report.skipped[2].index, 2);
    }

    #[test]
    fn root_replacement_swaps_the_region() {
        let (mut tree, root) = LiveTree::from_vnode(&ul(&["a"]));
        let host = tree.create_element("main");
        tree.append(host, root);

        let region: VNode = Element::new("section").into();
        let report = apply_patches(
            &mut tree,
            root,
            &[Patch::Replace {
                path: NodePath::root(),
                node: region.clone(),
            }],
        );
        assert!(report.replaced_root);
        assert_ne!(report.root, root);
        assert!(!tree.contains(root));
        assert_eq!(tree.meaningful_children(host), vec![report.root]);
        assert_eq!(build(&tree, report.root), region);
    }
}
