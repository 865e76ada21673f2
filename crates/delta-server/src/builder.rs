//! Markup side tree builder.
//!
//! Rendered markup is parsed as an HTML5 fragment, so malformed input is
//! recovered the same way a browser would recover it. The result uses the
//! canonical shape from [`delta_core::vnode`]: lowercase tags, sorted
//! attributes, keys from `data-key`, and no insignificant whitespace text.
//! Doctypes and processing instructions are dropped.
//!
//! Table and select content only survives HTML5 parsing inside a matching
//! parent, so such markup is parsed inside that parent and then lifted out
//! of it.

use delta_core::vnode::{Element, VNode, is_significant};
use scraper::{ElementRef, Html, Node};

/// Tag used for the managed root when none is given.
pub const DEFAULT_ROOT_TAG: &str = "div";

/// Parses markup into a single tree.
///
/// One significant top-level node is returned as is. Several are wrapped in
/// a [`DEFAULT_ROOT_TAG`] element. Markup that yields no node at all becomes
/// an empty text node.
///
/// ```rust
/// use delta_server::builder::parse;
/// use delta_core::vnode::VNode;
///
/// let tree = parse("<ul>\n  <li>A</li>\n</ul>");
/// assert_eq!(tree.meaningful_children().count(), 1);
/// assert_eq!(parse("   "), VNode::text(""));
/// ```
#[must_use]
pub fn parse(markup: &str) -> VNode {
    let mut nodes = match leading_tag(markup).as_deref().and_then(enclosing_tag) {
        Some(context) => parse_nodes_in(markup, context),
        None => parse_nodes(markup),
    };
    match nodes.len() {
        0 => VNode::text(""),
        1 => nodes.remove(0),
        _ => Element::new(DEFAULT_ROOT_TAG).with_children(nodes).into(),
    }
}

/// Parses the contents of a component's host element.
///
/// The result is always a `root_tag` element whose children are the
/// significant top-level nodes of `markup`, so every render of a component
/// diffs against the same managed root. The markup is parsed as content of
/// `root_tag`, so a `tbody` host keeps its rows.
///
/// ```rust
/// use delta_server::builder::parse_region;
///
/// let rows = parse_region("<tr><td>A</td></tr>", "tbody");
/// assert_eq!(rows.to_html(), "<tbody><tr><td>A</td></tr></tbody>");
/// ```
#[must_use]
pub fn parse_region(markup: &str, root_tag: &str) -> VNode {
    let root = Element::new(root_tag);
    let children = parse_nodes_in(markup, &root.tag);
    root.with_children(children).into()
}

fn parse_nodes(markup: &str) -> Vec<VNode> {
    let fragment = Html::parse_fragment(markup);
    let nodes = convert_children(fragment.root_element());
    tracing::trace!(
        markup_len = markup.len(),
        top_level = nodes.len(),
        "parsed markup fragment"
    );
    nodes
}

/// Parses `markup` as the content of a `context` element.
fn parse_nodes_in(markup: &str, context: &str) -> Vec<VNode> {
    let Some((open, close)) = context_markup(context) else {
        return parse_nodes(markup);
    };
    let fragment = Html::parse_fragment(&format!("{open}{markup}{close}"));
    let host = fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == context);
    let nodes = host.map(convert_children).unwrap_or_default();
    tracing::trace!(
        context,
        markup_len = markup.len(),
        top_level = nodes.len(),
        "parsed markup fragment in context"
    );
    nodes
}

/// Opening and closing markup that puts the parser inside `tag`, for
/// elements whose content is not valid directly in `<body>`.
fn context_markup(tag: &str) -> Option<(&'static str, &'static str)> {
    let wrap = match tag {
        "table" => ("<table>", "</table>"),
        "caption" => ("<table><caption>", "</caption></table>"),
        "colgroup" => ("<table><colgroup>", "</colgroup></table>"),
        "thead" => ("<table><thead>", "</thead></table>"),
        "tbody" => ("<table><tbody>", "</tbody></table>"),
        "tfoot" => ("<table><tfoot>", "</tfoot></table>"),
        "tr" => ("<table><tbody><tr>", "</tr></tbody></table>"),
        "select" => ("<select>", "</select>"),
        _ => return None,
    };
    Some(wrap)
}

/// The parent a top-level `tag` needs in order to be parsed at all.
fn enclosing_tag(tag: &str) -> Option<&'static str> {
    match tag {
        "caption" | "colgroup" | "thead" | "tbody" | "tfoot" => Some("table"),
        "tr" => Some("tbody"),
        "td" | "th" => Some("tr"),
        "col" => Some("colgroup"),
        "option" | "optgroup" => Some("select"),
        _ => None,
    }
}

/// Lowercase name of the first element tag, if markup starts with one.
fn leading_tag(markup: &str) -> Option<String> {
    let rest = markup.trim_start().strip_prefix('<')?;
    let name: String = rest
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

fn convert_children(parent: ElementRef<'_>) -> Vec<VNode> {
    parent
        .children()
        .filter_map(|child| {
            let vnode = match child.value() {
                Node::Text(text) => VNode::text(&**text),
                Node::Comment(comment) => VNode::comment(&**comment),
                Node::Element(_) => convert_element(ElementRef::wrap(child)?),
                _ => return None,
            };
            is_significant(&vnode).then_some(vnode)
        })
        .collect()
}

fn convert_element(element: ElementRef<'_>) -> VNode {
    let mut out = Element::new(element.value().name());
    for (name, value) in element.value().attrs() {
        out.set_attribute(name.to_owned(), value.to_owned());
    }
    if !out.is_void() {
        out.children = convert_children(element);
    }
    out.into()
}
