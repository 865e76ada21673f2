//! Tree diff producing an ordered patch list.
//!
//! Every path except a [`Patch::Create`] insertion index addresses the old
//! tree. The emission order keeps that true for an applier walking its live
//! tree in list order:
//!
//! - unkeyed children are diffed positionally; nested patches come first,
//!   then removals from the highest index down, then appends;
//! - keyed children (every child keyed, keys unique on both sides) emit
//!   nested patches for the surviving items at their old index, removals
//!   from the highest old index down, one [`Patch::Reorder`] over the list
//!   left by the removals, and finally creations in ascending final index.
//!
//! Reorder moves are computed from a longest increasing subsequence of the
//! surviving items, so items on that subsequence never move.

use crate::fingerprint::fingerprint;
use delta_core::patch::{Move, NodePath, Patch};
use delta_core::vnode::{Element, VNode};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Computes the patches that turn `old` into `new`.
///
/// The result is deterministic. When the roots themselves differ in kind,
/// tag or key the result is a single root [`Patch::Replace`].
///
/// ```rust
/// use delta_server::builder::parse;
/// use delta_server::diff::diff;
/// use delta_core::patch::Patch;
///
/// let old = parse("<div><span>A</span><span>B</span></div>");
/// let new = parse("<div><span>A</span><span>C</span></div>");
/// assert_eq!(
///     diff(&old, &new),
///     vec![Patch::UpdateText { path: [1, 0].into(), text: "C".into() }]
/// );
/// ```
#[must_use]
pub fn diff(old: &VNode, new: &VNode) -> Vec<Patch> {
    let mut out = Vec::new();
    diff_node(old, new, &NodePath::root(), &mut out);
    tracing::trace!(patches = out.len(), "computed tree diff");
    out
}

/// Like [`diff`], but falls back to a whole-region replacement when the
/// client's structural fingerprint does not match `old`.
///
/// A client without a fingerprint is treated as out of date.
#[must_use]
pub fn diff_with_fingerprint(old: &VNode, new: &VNode, client_fingerprint: &str) -> Vec<Patch> {
    let expected = fingerprint(old);
    if client_fingerprint != expected {
        tracing::debug!(
            %expected,
            client = %client_fingerprint,
            "client fingerprint is stale, replacing region"
        );
        return vec![Patch::Replace {
            path: NodePath::root(),
            node: new.clone(),
        }];
    }
    diff(old, new)
}

fn same_node(old: &VNode, new: &VNode) -> bool {
    match (old, new) {
        (VNode::Element(a), VNode::Element(b)) => a.tag == b.tag && a.key == b.key,
        (VNode::Text { .. }, VNode::Text { .. }) | (VNode::Comment { .. }, VNode::Comment { .. }) => {
            true
        }
        _ => false,
    }
}

fn diff_node(old: &VNode, new: &VNode, path: &NodePath, out: &mut Vec<Patch>) {
    if !same_node(old, new) {
        out.push(Patch::Replace {
            path: path.clone(),
            node: new.clone(),
        });
        return;
    }

    match (old, new) {
        (VNode::Text { content: a }, VNode::Text { content: b })
        | (VNode::Comment { content: a }, VNode::Comment { content: b }) => {
            if a != b {
                out.push(Patch::UpdateText {
                    path: path.clone(),
                    text: b.clone(),
                });
            }
        }
        (VNode::Element(a), VNode::Element(b)) => {
            diff_attributes(a, b, path, out);
            let old_children: Vec<&VNode> = old.meaningful_children().collect();
            let new_children: Vec<&VNode> = new.meaningful_children().collect();
            match (keys_of(&old_children), keys_of(&new_children)) {
                (Some(old_keys), Some(new_keys)) => diff_keyed(
                    &old_children,
                    &new_children,
                    &old_keys,
                    &new_keys,
                    path,
                    out,
                ),
                _ => diff_positional(&old_children, &new_children, path, out),
            }
        }
        _ => {}
    }
}

fn diff_attributes(old: &Element, new: &Element, path: &NodePath, out: &mut Vec<Patch>) {
    let set: BTreeMap<String, String> = new
        .attributes
        .iter()
        .filter(|(name, value)| old.attributes.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let remove: Vec<String> = old
        .attributes
        .keys()
        .filter(|name| !new.attributes.contains_key(*name))
        .cloned()
        .collect();

    if !set.is_empty() || !remove.is_empty() {
        out.push(Patch::UpdateAttributes {
            path: path.clone(),
            set,
            remove,
        });
    }
}

/// Keys of every child, or `None` unless all children are keyed elements
/// with distinct keys.
fn keys_of<'a>(children: &[&'a VNode]) -> Option<Vec<&'a str>> {
    let mut seen = HashSet::with_capacity(children.len());
    children
        .iter()
        .map(|&child| {
            let key = child.as_element()?.key.as_deref()?;
            seen.insert(key).then_some(key)
        })
        .collect()
}

fn diff_positional(old: &[&VNode], new: &[&VNode], path: &NodePath, out: &mut Vec<Patch>) {
    for (index, (a, b)) in old.iter().zip(new).enumerate() {
        diff_node(a, b, &path.child(index), out);
    }
    for index in (new.len()..old.len()).rev() {
        out.push(Patch::Remove {
            path: path.child(index),
        });
    }
    for (index, node) in new.iter().enumerate().skip(old.len()) {
        out.push(Patch::Create {
            path: path.child(index),
            node: (*node).clone(),
        });
    }
}

fn diff_keyed(
    old: &[&VNode],
    new: &[&VNode],
    old_keys: &[&str],
    new_keys: &[&str],
    path: &NodePath,
    out: &mut Vec<Patch>,
) {
    let old_index: HashMap<&str, usize> = old_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let new_index: HashMap<&str, usize> = new_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    for (i, key) in old_keys.iter().enumerate() {
        if let Some(&j) = new_index.get(key) {
            diff_node(old[i], new[j], &path.child(i), out);
        }
    }

    for (index, key) in old_keys.iter().enumerate().rev() {
        if !new_index.contains_key(key) {
            out.push(Patch::Remove {
                path: path.child(index),
            });
        }
    }

    // old index of every surviving item, in new order
    let matched: Vec<usize> = new_keys
        .iter()
        .filter_map(|key| old_index.get(key).copied())
        .collect();

    let mut rank_by_old = vec![None; old.len()];
    for (rank, &i) in matched.iter().enumerate() {
        rank_by_old[i] = Some(rank);
    }
    let current: Vec<usize> = rank_by_old.iter().filter_map(|rank| *rank).collect();
    let moves = reorder_moves(&current);
    if !moves.is_empty() {
        out.push(Patch::Reorder {
            path: path.clone(),
            moves,
        });
    }

    for (index, (node, key)) in new.iter().zip(new_keys).enumerate() {
        if !old_index.contains_key(key) {
            out.push(Patch::Create {
                path: path.child(index),
                node: (*node).clone(),
            });
        }
    }
}

/// Moves that sort `current`, a permutation of `0..n`, into ascending order.
///
/// Each move is relative to the list as left by the previous one and is
/// performed as remove-then-insert. Items on the longest increasing
/// subsequence stay put; every other item is placed right after its
/// predecessor in the target order.
pub(crate) fn reorder_moves(current: &[usize]) -> Vec<Move> {
    let mut stable = vec![false; current.len()];
    for index in longest_increasing_subsequence(current) {
        stable[current[index]] = true;
    }

    let mut working = current.to_vec();
    let mut moves = Vec::new();
    for rank in 0..working.len() {
        if stable[rank] {
            continue;
        }
        let Some(from) = working.iter().position(|&r| r == rank) else {
            continue;
        };
        let to = match rank.checked_sub(1) {
            None => 0,
            Some(previous) => match working.iter().position(|&r| r == previous) {
                Some(at) if from < at => at,
                Some(at) => at + 1,
                None => 0,
            },
        };
        if from != to {
            let step = Move::new(from, to);
            step.apply_to(&mut working);
            moves.push(step);
        }
    }
    moves
}

/// Indices into `seq` of one longest strictly increasing subsequence.
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < value);
        if slot > 0 {
            previous[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = previous[i];
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::parse;
    use proptest::prelude::*;

    fn keyed(keys: &[(&str, &str)]) -> VNode {
        let items: String = keys
            .iter()
            .map(|(k, text)| format!("<li data-key=\"{k}\">{text}</li>"))
            .collect();
        parse(&format!("<ul>{items}</ul>"))
    }

    #[test]
    fn text_update() {
        let old = parse("<div><span>A</span><span>B</span></div>");
        let new = parse("<div><span>A</span><span>C</span></div>");
        assert_eq!(
            diff(&old, &new),
            vec![Patch::UpdateText {
                path: [1, 0].into(),
                text: "C".into()
            }]
        );
    }

    #[test]
    fn attribute_update() {
        let old = parse("<button class=\"a\" disabled=\"true\">x</button>");
        let new = parse("<button class=\"b\">x</button>");
        assert_eq!(
            diff(&old, &new),
            vec![Patch::UpdateAttributes {
                path: NodePath::root(),
                set: BTreeMap::from([("class".to_owned(), "b".to_owned())]),
                remove: vec!["disabled".to_owned()],
            }]
        );
    }

    #[test]
    fn identical_trees_produce_nothing() {
        let tree = parse("<div id=\"a\"><p>x</p><!--c--></div>");
        assert!(diff(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn keyed_reorder_is_a_single_reorder() {
        let old = keyed(&[("1", "A"), ("2", "B"), ("3", "C")]);
        let new = keyed(&[("3", "C"), ("1", "A"), ("2", "B")]);
        let patches = diff(&old, &new);
        assert_eq!(
            patches,
            vec![Patch::Reorder {
                path: NodePath::root(),
                moves: vec![Move::new(2, 0)],
            }]
        );
    }

    #[test]
    fn keyed_mix_orders_remove_reorder_update_create() {
        let old = keyed(&[("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")]);
        let new = keyed(&[("d", "D"), ("x", "X"), ("a", "A2"), ("c", "C")]);
        let patches = diff(&old, &new);
        let kinds: Vec<_> = patches.iter().map(Patch::kind).collect();
        assert_eq!(kinds, vec!["UpdateText", "Remove", "Reorder", "Create"]);
        assert_eq!(
            patches[0],
            Patch::UpdateText {
                path: [0, 0].into(),
                text: "A2".into()
            }
        );
        assert_eq!(patches[1], Patch::Remove { path: [1].into() });
        // survivors [a, c, d] become [d, a, c]
        assert_eq!(
            patches[2],
            Patch::Reorder {
                path: NodePath::root(),
                moves: vec![Move::new(2, 0)],
            }
        );
        assert_eq!(patches[3].path(), &NodePath::from([1]));
    }

    #[test]
    fn keyed_updates_address_the_old_position() {
        let old = keyed(&[("a", "A"), ("b", "B")]);
        let new = keyed(&[("b", "B"), ("a", "A2")]);
        let patches = diff(&old, &new);
        assert_eq!(
            patches,
            vec![
                Patch::UpdateText {
                    path: [0, 0].into(),
                    text: "A2".into()
                },
                Patch::Reorder {
                    path: NodePath::root(),
                    moves: vec![Move::new(0, 1)],
                },
            ]
        );
        // the edited text is found at that path in the old tree
        assert_eq!(old.at_path(&[0, 0]), Some(&VNode::text("A")));
    }

    #[test]
    fn removals_go_from_the_highest_index() {
        let old = parse("<ul><li>1</li><li>2</li><li>3</li><li>4</li></ul>");
        let new = parse("<ul><li>1</li><li>2</li></ul>");
        assert_eq!(
            diff(&old, &new),
            vec![
                Patch::Remove { path: [3].into() },
                Patch::Remove { path: [2].into() },
            ]
        );
    }

    #[test]
    fn duplicate_keys_fall_back_to_positional() {
        let old = keyed(&[("1", "A"), ("1", "B")]);
        let new = keyed(&[("1", "B"), ("1", "A")]);
        let kinds: Vec<_> = diff(&old, &new).iter().map(Patch::kind).collect();
        assert_eq!(kinds, vec!["UpdateText", "UpdateText"]);
    }

    #[test]
    fn root_change_replaces_region() {
        let old = parse("<div>x</div>");
        let new = parse("<section>x</section>");
        assert_eq!(
            diff(&old, &new),
            vec![Patch::Replace {
                path: NodePath::root(),
                node: new.clone()
            }]
        );
    }

    #[test]
    fn kind_change_replaces_node() {
        let old = parse("<div><p>x</p></div>");
        let new = parse("<div>x</div>");
        assert_eq!(
            diff(&old, &new),
            vec![Patch::Replace {
                path: [0].into(),
                node: VNode::text("x")
            }]
        );
    }

    #[test]
    fn stale_fingerprint_replaces_region() {
        let old = parse("<div><p>1</p></div>");
        let new = parse("<div><p>2</p></div>");

        let fresh = diff_with_fingerprint(&old, &new, &fingerprint(&old));
        assert_eq!(fresh, diff(&old, &new));

        let stale = diff_with_fingerprint(&old, &new, "0000000000000000");
        assert_eq!(
            stale,
            vec![Patch::Replace {
                path: NodePath::root(),
                node: new
            }]
        );
    }

    #[test]
    fn lis_finds_longest_run() {
        let seq = [3, 0, 1, 4, 2];
        let lis = longest_increasing_subsequence(&seq);
        let values: Vec<_> = lis.iter().map(|&i| seq[i]).collect();
        assert_eq!(values, vec![0, 1, 2]);
        assert!(longest_increasing_subsequence(&[]).is_empty());
    }

    #[test]
    fn reorder_moves_sort_the_list() {
        for current in [
            vec![2, 0, 1],
            vec![1, 0],
            vec![3, 2, 1, 0],
            vec![0, 1, 2],
            vec![4, 0, 3, 1, 2],
        ] {
            let moves = reorder_moves(&current);
            let mut working = current.clone();
            for step in &moves {
                assert!(step.apply_to(&mut working));
            }
            let sorted: Vec<_> = (0..current.len()).collect();
            assert_eq!(working, sorted, "moves {moves:?} for {current:?}");
            let stable = longest_increasing_subsequence(&current).len();
            assert_eq!(moves.len(), current.len() - stable);
        }
    }

    fn permutation() -> impl Strategy<Value = Vec<usize>> {
        (0usize..20).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    }

    proptest! {
        #[test]
        fn reorder_moves_sort_any_permutation(current in permutation()) {
            let moves = reorder_moves(&current);
            let mut working = current.clone();
            for step in &moves {
                prop_assert!(step.apply_to(&mut working));
            }
            prop_assert_eq!(working, (0..current.len()).collect::<Vec<_>>());

            let stable = longest_increasing_subsequence(&current).len();
            prop_assert!(moves.len() <= current.len() - stable);
        }
    }
}
