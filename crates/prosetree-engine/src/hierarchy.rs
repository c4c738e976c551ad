//! Hierarchy normalization.
//!
//! Along any path from the document root, node kinds must appear in the
//! order `container* paragraph? inline?`: never inline content directly
//! under a container that requires a paragraph, never a paragraph nested
//! inside a paragraph, never a heading inside a caption. The functions here
//! repair violations after an edit by wrapping inline runs, promoting
//! misplaced blocks out of their ancestors (splitting those ancestors and
//! pruning emptied remnants), and re-wrapping promoted content in copies of
//! any meaningful inline ancestors so formatting survives the surgery.

use crate::dom::{Document, NodeId, Tag};
use crate::formatting;
use crate::position::Position;

/// Repair is expected to converge in a handful of steps; anything beyond
/// this is an invariant violation, not progress.
const MAX_REPAIR_ITERATIONS: usize = 200;

fn check_invalid_heading_nesting(doc: &Document, node: NodeId) -> bool {
    if !doc.is_heading(node) {
        return false;
    }
    match doc.parent(node).and_then(|p| doc.node(p).tag().cloned()) {
        Some(Tag::Body) | Some(Tag::Nav) | Some(Tag::Div) => false,
        _ => true,
    }
}

fn check_invalid_nesting(doc: &Document, node: NodeId) -> bool {
    let Some(parent) = doc.parent(node) else {
        return false;
    };
    let mut invalid = !doc.is_container(parent);
    match doc.node(parent).tag() {
        Some(Tag::Div) => {
            if doc.is_paragraph(node) || doc.is_list(node) {
                invalid = false;
            }
        }
        Some(Tag::Caption) | Some(Tag::Figcaption) | Some(Tag::Table) | Some(Tag::Figure) => {
            match doc.node(node).tag() {
                Some(Tag::Figure) | Some(Tag::Table) => return true,
                Some(t) if t.is_heading() => return true,
                _ => {}
            }
        }
        _ => {}
    }
    invalid
}

fn node_has_significant_children(doc: &Document, node: NodeId) -> bool {
    let mut child = doc.first_child(node);
    while let Some(c) = child {
        if !doc.is_whitespace_text_node(c) {
            return true;
        }
        child = doc.next_sibling(c);
    }
    false
}

/// Wrap the sibling run `first..=last` in fresh copies of `ancestors`
/// (outermost last), unless the run is only whitespace.
fn wrap_inline_children(doc: &mut Document, first: NodeId, last: NodeId, ancestors: &[NodeId]) {
    let mut have_non_whitespace = false;
    let mut node = Some(first);
    while let Some(n) = node {
        if !doc.is_whitespace_text_node(n) {
            have_non_whitespace = true;
        }
        if n == last {
            break;
        }
        node = doc.next_sibling(n);
    }
    if !have_non_whitespace {
        return;
    }

    let mut parent = doc.parent(first).expect("wrapping attached nodes");
    let mut next_sibling = Some(first);
    for ancestor in ancestors.iter().rev() {
        let copy = doc.shallow_copy_element(*ancestor);
        doc.insert_before(parent, copy, next_sibling);
        parent = copy;
        next_sibling = None;

        let mut node = first;
        loop {
            let next = doc.next_sibling(node);
            doc.insert_before(parent, node, None);
            if node == last {
                break;
            }
            node = next.expect("run ended before last");
        }
    }
}

fn wrap_inline_children_in_ancestors(doc: &mut Document, node: NodeId, ancestors: &[NodeId]) {
    let mut first_inline: Option<NodeId> = None;
    let mut last_inline: Option<NodeId> = None;

    let mut child = doc.first_child(node);
    loop {
        let next = child.and_then(|c| doc.next_sibling(c));
        let is_inline_child = child.is_some_and(|c| doc.is_inline(c));
        if !is_inline_child {
            if let (Some(first), Some(last)) = (first_inline, last_inline) {
                wrap_inline_children(doc, first, last, ancestors);
            }
            first_inline = None;
            last_inline = None;
            if let Some(c) = child {
                wrap_inline_children_in_ancestors(doc, c, ancestors);
            }
        } else {
            if first_inline.is_none() {
                first_inline = child;
            }
            last_inline = child;
        }
        match child {
            None => break,
            Some(_) => child = next,
        }
    }
}

/// Enforce the nesting grammar for `node` and its ancestors, repairing any
/// violations found on the way up to the body.
pub fn ensure_valid_hierarchy(doc: &mut Document, node: NodeId) {
    let mut count = 0;
    let mut current = Some(node);
    while let Some(node) = current {
        if doc.parent(node).is_none() || node == doc.body() {
            break;
        }
        count += 1;
        assert!(
            count <= MAX_REPAIR_ITERATIONS,
            "hierarchy repair did not converge"
        );

        if check_invalid_heading_nesting(doc, node) {
            // Split everything after the heading out of its ancestors, then
            // promote the heading to be a sibling of its parent, pruning the
            // parent if that emptied it.
            let offset = doc.node_offset(node);
            let parent = doc.parent(node).expect("checked");
            formatting::move_following(
                doc,
                Position::new(parent, offset + 1),
                &|_, _| false,
                false,
            );
            let parent_parent = doc.parent(parent).expect("parent in tree");
            let parent_next = doc.next_sibling(parent);
            doc.insert_before(parent_parent, node, parent_next);

            let mut prune = parent;
            while prune != doc.body() && !node_has_significant_children(doc, prune) {
                let grandparent = doc.parent(prune).expect("below body");
                doc.delete_node(prune);
                prune = grandparent;
            }
            continue;
        } else if (doc.is_container(node) || doc.is_paragraph(node))
            && check_invalid_nesting(doc, node)
        {
            // Collect meaningful inline ancestors (attribute-bearing spans,
            // or any other inline wrapper) so their formatting can be
            // re-applied to the promoted node's inline children.
            let mut ancestors: Vec<NodeId> = Vec::new();
            let mut child = node;
            while let Some(parent) = doc.parent(child) {
                if doc.is_container(parent) {
                    break;
                }
                if doc.is_inline(parent) {
                    let keep = if doc.has_tag(parent, &Tag::Span) {
                        let has_meaningful_attr = doc
                            .node(parent)
                            .attributes()
                            .is_some_and(|attrs| attrs.keys().any(|k| k != "id"))
                            || doc.node(parent).style().is_some_and(|s| !s.is_empty());
                        has_meaningful_attr
                    } else {
                        true
                    };
                    if keep {
                        ancestors.push(parent);
                    }
                }
                child = parent;
            }

            while check_invalid_nesting(doc, node) {
                let offset = doc.node_offset(node);
                let parent = doc.parent(node).expect("nested node has parent");
                formatting::move_following(
                    doc,
                    Position::new(parent, offset + 1),
                    &|doc, n| doc.is_container(n),
                    false,
                );
                let parent_parent = doc.parent(parent).expect("parent in tree");
                let parent_next = doc.next_sibling(parent);
                doc.insert_before(parent_parent, node, parent_next);
                if !node_has_significant_children(doc, parent) {
                    doc.delete_node(parent);
                }
            }
            wrap_inline_children_in_ancestors(doc, node, &ancestors);
        }

        current = doc.parent(node);
    }
}

/// If `node` is inline content sitting directly in a container that demands
/// a paragraph wrapper, wrap the surrounding inline run in a `<p>`. The
/// `weak` variant exempts direct children of table cells.
pub fn ensure_inline_nodes_in_paragraph(doc: &mut Document, node: NodeId, weak: bool) {
    let mut count = 0;
    let mut current = Some(node);
    while let Some(node) = current {
        if doc.parent(node).is_none() || node == doc.body() {
            break;
        }
        count += 1;
        assert!(
            count <= MAX_REPAIR_ITERATIONS,
            "hierarchy repair did not converge"
        );
        let parent = doc.parent(node).expect("checked");
        if doc.is_inline(node)
            && doc.is_container(parent)
            && !doc.has_tag(parent, &Tag::Li)
            && (!weak || !doc.is_table_cell(parent))
            && !doc.is_whitespace_text_node(node)
        {
            wrap_inline_nodes_in_paragraph(doc, node);
            return;
        }
        current = Some(parent);
    }
}

/// Wrap the contiguous run of inline siblings around `node` in a `<p>`.
pub fn wrap_inline_nodes_in_paragraph(doc: &mut Document, node: NodeId) -> NodeId {
    let mut start = node;
    let mut end = node;
    while let Some(prev) = doc.prev_sibling(start) {
        if !doc.is_inline(prev) {
            break;
        }
        start = prev;
    }
    while let Some(next) = doc.next_sibling(end) {
        if !doc.is_inline(next) {
            break;
        }
        end = next;
    }
    doc.wrap_siblings(start, end, Tag::P)
}

/// Wrap every run of inline children of `parent` in paragraphs, dropping
/// runs with no content.
pub fn avoid_inline_children(doc: &mut Document, parent: NodeId) {
    let mut child = doc.first_child(parent);
    while let Some(c) = child {
        if doc.is_inline(c) {
            let start = c;
            let mut end = c;
            while let Some(next) = doc.next_sibling(end) {
                if !doc.is_inline(next) {
                    break;
                }
                end = next;
            }
            let wrapper = doc.wrap_siblings(start, end, Tag::P);
            let next = doc.next_sibling(wrapper);
            if !doc.node_has_content(wrapper) {
                doc.delete_node(wrapper);
            }
            child = next;
        } else {
            child = doc.next_sibling(c);
        }
    }
}

/// Check the grammar over the whole document. Test support.
#[cfg(test)]
pub fn hierarchy_is_valid(doc: &Document) -> bool {
    use crate::dom::NodeKind;
    let mut current = Some(doc.body());
    while let Some(node) = current {
        if node != doc.body() {
            if let Some(parent) = doc.parent(node) {
                let pk = doc.kind(parent);
                let nk = doc.kind(node);
                let parent_is_phrasing_root = parent == doc.body();
                match (pk, nk) {
                    (NodeKind::Paragraph, NodeKind::Container)
                    | (NodeKind::Paragraph, NodeKind::Paragraph) => return false,
                    (NodeKind::Container, NodeKind::Inline) => {
                        // Whitespace between blocks is tolerated; real
                        // inline content directly under a container is not,
                        // except in cells/captions which allow it weakly.
                        if !doc.is_whitespace_text_node(node)
                            && (parent_is_phrasing_root || doc.is_list(parent))
                        {
                            return false;
                        }
                    }
                    _ => {}
                }
            }
        }
        current = doc.next_node(node);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse_document, serialize_subtree};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inline_directly_in_body_gets_paragraph_wrapper() {
        let mut doc = parse_document("loose text").unwrap();
        let text = doc.find_text("loose text").unwrap();
        ensure_inline_nodes_in_paragraph(&mut doc, text, false);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>loose text</p></body>"
        );
        assert!(hierarchy_is_valid(&doc));
    }

    #[test]
    fn test_inline_run_wrapped_as_single_paragraph() {
        let mut doc = parse_document("one <b>two</b> three<p>after</p>").unwrap();
        let text = doc.find_text("one").unwrap();
        ensure_inline_nodes_in_paragraph(&mut doc, text, false);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>one <b>two</b> three</p><p>after</p></body>"
        );
    }

    #[test]
    fn test_weak_variant_leaves_cell_content_alone() {
        let mut doc = parse_document(
            "<table><tbody><tr><td>plain</td></tr></tbody></table>",
        )
        .unwrap();
        let text = doc.find_text("plain").unwrap();
        ensure_inline_nodes_in_paragraph(&mut doc, text, true);
        // Direct inline children of a table cell are acceptable weakly.
        assert!(serialize_subtree(&doc, doc.body()).contains("<td>plain</td>"));
    }

    #[test]
    fn test_heading_promoted_out_of_paragraph_context() {
        let mut doc = parse_document("<blockquote><h1>title</h1></blockquote>").unwrap();
        let h1 = doc.find_first(&Tag::H1).unwrap();
        ensure_valid_hierarchy(&mut doc, h1);
        // The emptied blockquote is pruned, the heading promoted to body.
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><h1>title</h1></body>"
        );
    }

    #[test]
    fn test_heading_promotion_splits_following_content() {
        let mut doc =
            parse_document("<blockquote><p>before</p><h2>mid</h2><p>after</p></blockquote>")
                .unwrap();
        let h2 = doc.find_first(&Tag::H2).unwrap();
        ensure_valid_hierarchy(&mut doc, h2);
        let html = serialize_subtree(&doc, doc.body());
        assert_eq!(
            html,
            "<body><blockquote><p>before</p></blockquote><h2>mid</h2>\
             <blockquote><p>after</p></blockquote>"
        );
    }

    #[test]
    fn test_table_promoted_out_of_caption() {
        let mut doc = parse_document(
            "<table><caption>x<table id=\"inner\"><tbody><tr><td>c</td></tr></tbody></table>\
             </caption><tbody><tr><td>o</td></tr></tbody></table>",
        )
        .unwrap();
        let inner = doc.get_element_by_id("inner").unwrap();
        ensure_valid_hierarchy(&mut doc, inner);
        // The inner table may no longer live inside the caption.
        let caption = doc.find_first(&Tag::Caption).unwrap();
        let mut inside = false;
        let mut anc = doc.parent(inner);
        while let Some(a) = anc {
            if a == caption {
                inside = true;
            }
            anc = doc.parent(a);
        }
        assert!(!inside, "inner table still inside caption");
        assert!(doc.in_tree(inner));
    }

    #[test]
    fn test_meaningful_inline_ancestors_preserved() {
        // A paragraph illegally nested in a styled span: when the paragraph
        // is promoted, its inline children are re-wrapped in a copy of the
        // span so the formatting survives.
        let mut doc = parse_document(
            "<p>a<span class=\"note\"><p>inner</p></span>b</p>",
        )
        .unwrap();
        let inner_text = doc.find_text("inner").unwrap();
        let inner_p = doc.parent(inner_text).unwrap();
        ensure_valid_hierarchy(&mut doc, inner_p);
        let html = serialize_subtree(&doc, doc.body());
        assert!(
            html.contains("<span class=\"note\">inner</span>"),
            "formatting lost: {html}"
        );
        assert!(hierarchy_is_valid(&doc));
    }

    #[test]
    fn test_avoid_inline_children_wraps_runs() {
        let mut doc = parse_document("<ul><li>x</li></ul>").unwrap();
        let li = doc.find_first(&Tag::Li).unwrap();
        avoid_inline_children(&mut doc, li);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><ul><li><p>x</p></li></ul></body>"
        );
    }

    #[test]
    fn test_valid_tree_untouched() {
        let original = "<body><p>one</p><ul><li><p>two</p></li></ul></body>";
        let mut doc = parse_document("<p>one</p><ul><li><p>two</p></li></ul>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        ensure_valid_hierarchy(&mut doc, p);
        assert_eq!(serialize_subtree(&doc, doc.body()), original);
    }
}
