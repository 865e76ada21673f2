//! Structural fingerprints of rendered trees.
//!
//! A fingerprint covers node kinds, tags, keys and child arity, but not text
//! or attribute values. Two renders of the same template with different data
//! share a fingerprint. A client holding a stale fingerprint is holding a
//! tree of a different shape, and gets a full region replacement instead of
//! a patch list addressed against the wrong structure.

use delta_core::vnode::VNode;
use sha2::{Digest, Sha256};

/// Hex length of a fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// Computes the structural fingerprint of a tree.
///
/// ```rust
/// use delta_server::builder::parse;
/// use delta_server::fingerprint::fingerprint;
///
/// let a = fingerprint(&parse("<p class=\"x\">hello</p>"));
/// let b = fingerprint(&parse("<p class=\"y\">world</p>"));
/// let c = fingerprint(&parse("<p><b>hello</b></p>"));
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[must_use]
pub fn fingerprint(node: &VNode) -> String {
    let mut hasher = Sha256::new();
    feed(node, &mut hasher);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

fn feed(node: &VNode, hasher: &mut Sha256) {
    match node {
        VNode::Text { .. } => hasher.update(b"t;"),
        VNode::Comment { .. } => hasher.update(b"c;"),
        VNode::Element(element) => {
            hasher.update(b"e:");
            hasher.update(element.tag.as_bytes());
            if let Some(key) = &element.key {
                hasher.update(b"#");
                hasher.update(key.as_bytes());
            }
            let children: Vec<&VNode> = node.meaningful_children().collect();
            hasher.update(format!("[{}]", children.len()).as_bytes());
            for child in children {
                feed(child, hasher);
            }
            hasher.update(b";");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::parse;

    #[test]
    fn ignores_values() {
        assert_eq!(
            fingerprint(&parse("<ul><li title=\"a\">1</li></ul>")),
            fingerprint(&parse("<ul><li title=\"b\">2</li></ul>"))
        );
    }

    #[test]
    fn sees_shape_keys_and_arity() {
        let base = fingerprint(&parse("<ul><li>1</li></ul>"));
        assert_ne!(base, fingerprint(&parse("<ul><li>1</li><li>2</li></ul>")));
        assert_ne!(base, fingerprint(&parse("<ol><li>1</li></ol>")));
        assert_ne!(base, fingerprint(&parse("<ul><li data-key=\"k\">1</li></ul>")));
        assert_ne!(base, fingerprint(&parse("<ul><li><!--1--></li></ul>")));
    }

    #[test]
    fn has_fixed_length() {
        let print = fingerprint(&parse("<p>x</p>"));
        assert_eq!(print.len(), FINGERPRINT_LEN);
        assert!(print.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
