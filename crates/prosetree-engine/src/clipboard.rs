//! Structural insertion of foreign fragments.
//!
//! Pasted nodes are spliced into the tree at the cursor with list-aware
//! placement: list items pasted inside a list stay items, loose inline runs
//! pasted inside a list grow their own items, and everything else lands at
//! the split point. Afterwards the seams are merged, hierarchy repaired,
//! duplicate ids renamed, and the cursor placed after the pasted content.

use tracing::debug;

use crate::cursor;
use crate::dom::{Document, NodeId, Tag, MERGEABLE_INLINE};
use crate::formatting;
use crate::html;
use crate::position::{self, Position};
use crate::range::{self, Range};
use crate::tables;

/// Parse an HTML fragment and paste it at the cursor.
pub fn paste_html(doc: &mut Document, fragment: &str) -> Result<(), html::ParseError> {
    let nodes = html::parse_fragment(doc, fragment)?;
    paste_nodes(doc, nodes);
    Ok(())
}

/// Paste a list of (detached) nodes at the cursor. A lone table pasted while
/// the selection covers a table region replaces that region's cells instead
/// of nesting a table.
pub fn paste_nodes(doc: &mut Document, mut nodes: Vec<NodeId>) {
    if nodes.is_empty() {
        return;
    }
    debug!(count = nodes.len(), "pasting nodes");

    // Elements that only make sense at the document level are dropped (a
    // whole pasted HTML document brings its scaffolding along).
    nodes.retain(|n| match doc.node(*n).tag() {
        Some(Tag::Html) | Some(Tag::Body) => false,
        Some(Tag::Other(name)) => {
            !matches!(name.as_str(), "meta" | "title" | "script" | "style" | "head")
        }
        _ => true,
    });

    // Pasting a single table into a table selection replaces cells.
    if nodes.len() == 1 && doc.has_tag(nodes[0], &Tag::Table) {
        if let Some(sel) = doc.selection() {
            if !sel.is_empty() {
                if let Some(mut region) = tables::region_from_range(doc, sel, false) {
                    tables::paste_table(doc, nodes[0], &mut region);
                    return;
                }
            }
        }
    }

    if let Some(sel) = doc.selection() {
        if !sel.is_empty() {
            cursor::delete_selection_contents(doc);
        }
    }
    let Some(sel) = doc.selection() else {
        return;
    };

    let start = position::prefer_element_position(doc, sel.start);
    let (parent, previous_sibling, next_sibling);
    if doc.node(start.node).is_element() {
        parent = start.node;
        next_sibling = doc.child_at(start.node, start.offset);
        previous_sibling = if start.offset > 0 {
            doc.child_at(start.node, start.offset - 1)
        } else {
            None
        };
    } else {
        formatting::split_text_after(doc, start, &formatting::is_block, false);
        parent = doc.parent(start.node).expect("text in tree");
        next_sibling = doc.next_sibling(start.node);
        previous_sibling = Some(start.node);
    }

    // Where are we relative to list structure?
    let mut in_item = None;
    let mut in_list = None;
    let mut container_parent = None;
    let mut temp = Some(parent);
    while let Some(t) = temp {
        if doc.is_container(t) {
            match doc.node(t).tag() {
                Some(Tag::Li) => in_item = Some(t),
                Some(Tag::Ul) | Some(Tag::Ol) => in_list = Some(t),
                _ => {}
            }
            container_parent = doc.parent(t);
            break;
        }
        temp = doc.parent(t);
    }

    let mut pasted_nodes: Vec<NodeId>;
    if let Some(in_item) = in_item {
        pasted_nodes = Vec::new();
        for child in nodes {
            let offset = match next_sibling {
                Some(n) => doc.node_offset(n),
                None => doc.child_count(parent),
            };
            match doc.node(child).tag() {
                Some(Tag::Ul) | Some(Tag::Ol) => {
                    let stop = container_parent;
                    formatting::move_preceding(
                        doc,
                        Position::new(parent, offset),
                        &move |d: &Document, n: NodeId| Some(n) == stop || n == d.body(),
                        false,
                    );
                    let item_parent = doc.parent(in_item).expect("item in list");
                    insert_children_before(doc, item_parent, child, Some(in_item), &mut pasted_nodes);
                }
                Some(Tag::Li) => {
                    let stop = container_parent;
                    formatting::move_preceding(
                        doc,
                        Position::new(parent, offset),
                        &move |d: &Document, n: NodeId| Some(n) == stop || n == d.body(),
                        false,
                    );
                    let item_parent = doc.parent(in_item).expect("item in list");
                    doc.insert_before(item_parent, child, Some(in_item));
                    pasted_nodes.push(child);
                }
                _ => {
                    doc.insert_before(parent, child, next_sibling);
                    pasted_nodes.push(child);
                }
            }
        }
    } else if in_list.is_some() {
        pasted_nodes = Vec::new();
        let mut prev_li: Option<NodeId> = None;
        for child in nodes {
            match doc.node(child).tag() {
                Some(Tag::Ul) | Some(Tag::Ol) => {
                    insert_children_before(doc, parent, child, next_sibling, &mut pasted_nodes);
                    prev_li = None;
                }
                Some(Tag::Li) => {
                    doc.insert_before(parent, child, next_sibling);
                    pasted_nodes.push(child);
                    prev_li = None;
                }
                _ => {
                    if !doc.is_whitespace_text_node(child) {
                        let li = match prev_li {
                            Some(li) => li,
                            None => {
                                let li = doc.create_element(Tag::Li);
                                prev_li = Some(li);
                                li
                            }
                        };
                        doc.append_child(li, child);
                        doc.insert_before(parent, li, next_sibling);
                        pasted_nodes.push(child);
                    }
                }
            }
        }
    } else {
        pasted_nodes = nodes.clone();
        for child in nodes {
            doc.insert_before(parent, child, next_sibling);
        }
    }

    if pasted_nodes.is_empty() {
        return;
    }

    let prev_offset = match previous_sibling {
        Some(p) => doc.node_offset(p),
        None => 0,
    };
    let next_offset = match next_sibling {
        Some(n) => doc.node_offset(n),
        None => doc.child_count(parent),
    };
    let mut orig_range = Range::new(
        Position::new(parent, prev_offset),
        Position::new(parent, next_offset),
    );

    let first_pasted = pasted_nodes[0];
    let last_pasted = *pasted_nodes.last().expect("non-empty");
    let mut pasted_range = Range::new(
        Position::new(first_pasted, 0),
        Position::new(last_pasted, doc.max_offset(last_pasted)),
    );

    doc.track_range(&mut orig_range, |doc| {
        let mut inner = pasted_range;
        doc.track_range(&mut inner, |doc| {
            if let Some(prev) = previous_sibling {
                formatting::merge_with_neighbours(doc, prev, &MERGEABLE_INLINE, false);
            }
            if let Some(next) = next_sibling {
                formatting::merge_with_neighbours(doc, next, &MERGEABLE_INLINE, false);
            }
            cursor::update_br_at_end_of_paragraph(doc, parent);
        });
        pasted_range = inner;
        range::ensure_valid_hierarchy(doc, &mut pasted_range);
    });

    // Clean out any container chain left empty at the insertion point.
    let mut pos = orig_range.end;
    doc.track_range(&mut pasted_range, |doc| loop {
        let node = pos.node;
        if node == doc.body() {
            break;
        }
        if doc.is_container(node) && !doc.has_tag(node, &Tag::Li) {
            break;
        }
        if !doc.node_has_content(node) {
            let parent = doc.parent(node).expect("below body");
            let offset = doc.node_offset(node);
            pos = Position::new(parent, offset);
            doc.delete_node(node);
        } else {
            break;
        }
    });

    doc.ensure_unique_ids();

    let mut end_pos = pasted_range.end;
    while doc.is_opaque_node(end_pos.node) {
        let parent = doc.parent(end_pos.node).expect("opaque node in tree");
        end_pos = Position::new(parent, doc.node_offset(end_pos.node) + 1);
    }
    let end_pos = position::closest_match_backwards(doc, end_pos, position::ok_for_insertion);
    doc.set_cursor(end_pos);
}

fn insert_children_before(
    doc: &mut Document,
    parent: NodeId,
    child: NodeId,
    next_sibling: Option<NodeId>,
    pasted_nodes: &mut Vec<NodeId>,
) {
    while let Some(grandchild) = doc.first_child(child) {
        pasted_nodes.push(grandchild);
        doc.insert_before(parent, grandchild, next_sibling);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse_document, serialize_subtree};
    use pretty_assertions::assert_eq;

    fn cursor_in(doc: &mut Document, needle: &str, offset: usize) {
        let text = doc.find_text(needle).unwrap();
        doc.set_cursor(Position::new(text, offset));
    }

    #[test]
    fn test_paste_inline_run_into_paragraph() {
        let mut doc = parse_document("<p>before after</p>").unwrap();
        cursor_in(&mut doc, "before after", 7);
        paste_html(&mut doc, "pasted <b>bold</b> ").unwrap();
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>before pasted <b>bold</b> after</p></body>"
        );
    }

    #[test]
    fn test_paste_paragraphs_at_cursor() {
        let mut doc = parse_document("<p>start</p>").unwrap();
        cursor_in(&mut doc, "start", 5);
        paste_html(&mut doc, "<p>one</p><p>two</p>").unwrap();
        let html = serialize_subtree(&doc, doc.body());
        assert!(html.contains("<p>one</p>"), "{html}");
        assert!(html.contains("<p>two</p>"), "{html}");
    }

    #[test]
    fn test_paste_list_items_into_list() {
        let mut doc = parse_document("<ul><li>one</li><li>three</li></ul>").unwrap();
        let three = doc.find_text("three").unwrap();
        let li = doc.parent(three).unwrap();
        let ul = doc.parent(li).unwrap();
        doc.set_cursor(Position::new(ul, doc.node_offset(li)));
        paste_html(&mut doc, "<li>two</li>").unwrap();
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><ul><li>one</li><li>two</li><li>three</li></ul></body>"
        );
    }

    #[test]
    fn test_paste_loose_content_into_list_grows_item() {
        let mut doc = parse_document("<ul><li>one</li></ul>").unwrap();
        let one = doc.find_text("one").unwrap();
        let li = doc.parent(one).unwrap();
        let ul = doc.parent(li).unwrap();
        doc.set_cursor(Position::new(ul, 1));
        paste_html(&mut doc, "loose text").unwrap();
        let html = serialize_subtree(&doc, doc.body());
        assert_eq!(
            html,
            "<body><ul><li>one</li><li>loose text</li></ul></body>"
        );
    }

    #[test]
    fn test_paste_whole_document_drops_scaffolding() {
        let mut doc = parse_document("<p>x</p>").unwrap();
        cursor_in(&mut doc, "x", 1);
        paste_html(&mut doc, "<p>content</p>").unwrap();
        assert!(doc.find_text("content").is_some());
        // Only one body in the tree.
        assert_eq!(doc.find_all(&Tag::Body).len(), 1);
    }

    #[test]
    fn test_paste_renames_duplicate_ids() {
        let mut doc = parse_document("<h1 id=\"section1\">existing</h1><p>tail</p>").unwrap();
        cursor_in(&mut doc, "tail", 4);
        paste_html(&mut doc, "<h1 id=\"section1\">pasted</h1>").unwrap();
        let ids: Vec<String> = doc
            .find_all(&Tag::H1)
            .into_iter()
            .filter(|n| doc.in_tree(*n))
            .filter_map(|n| doc.node(n).attribute("id").map(|s| s.to_string()))
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_paste_replaces_selection() {
        let mut doc = parse_document("<p>delete me</p>").unwrap();
        let text = doc.find_text("delete me").unwrap();
        doc.set_selection(Range::new(Position::new(text, 0), Position::new(text, 9)));
        paste_html(&mut doc, "replacement").unwrap();
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>replacement</p></body>"
        );
    }

    #[test]
    fn test_cursor_lands_after_pasted_content() {
        let mut doc = parse_document("<p>ab</p>").unwrap();
        cursor_in(&mut doc, "ab", 1);
        paste_html(&mut doc, "XY").unwrap();
        let sel = doc.selection().unwrap();
        assert!(sel.is_empty());
        let text = sel.start.node;
        let value = doc.node_text(text);
        // Cursor sits right after the pasted characters.
        assert_eq!(value, "aXYb");
        assert_eq!(sel.start.offset, 3);
    }
}
