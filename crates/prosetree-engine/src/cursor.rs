//! Cursor-level editing: character insertion and deletion, the Enter-key
//! paragraph split, selection deletion, and the `<br>` placeholder that
//! keeps empty paragraphs visible and editable.
//!
//! Spaces are stored as no-break spaces at the insertion point and relaxed
//! back to ordinary spaces once the word boundary moves on, so a trailing
//! space never collapses away while the user is mid-word.

use tracing::debug;

use crate::dom::{Document, NodeId, Tag, MERGEABLE_BLOCK_AND_INLINE, MERGEABLE_INLINE};
use crate::formatting;
use crate::position::{self, Position};
use crate::range::{self, Range};
use crate::tables;

const NBSP: char = '\u{a0}';

fn ok_movement(doc: &Document, pos: Position) -> bool {
    position::ok_for_movement(doc, pos, false)
}

/// An empty paragraph does not render and cannot be clicked into; a `<br>`
/// child keeps it alive. Content and placeholder are mutually exclusive.
pub fn update_br_at_end_of_paragraph(doc: &mut Document, node: NodeId) {
    let mut paragraph = Some(node);
    while let Some(p) = paragraph {
        if doc.is_paragraph(p) {
            break;
        }
        paragraph = doc.parent(p);
    }
    let Some(paragraph) = paragraph else {
        return;
    };

    let mut br = None;
    let mut last = Some(paragraph);
    loop {
        let Some(current) = last else {
            break;
        };
        let mut child = Some(current);
        while let Some(c) = child {
            if !doc.is_whitespace_text_node(c) {
                break;
            }
            child = doc.prev_sibling(c);
        }
        if let Some(c) = child {
            if doc.has_tag(c, &Tag::Br) {
                br = Some(c);
            }
        }
        last = doc.last_child(current);
        if !last.is_some_and(|l| doc.is_inline(l)) {
            break;
        }
    }

    if doc.node_has_content(paragraph) {
        if let Some(br) = br {
            doc.delete_node(br);
        }
    } else if br.is_none() {
        let br = doc.create_element(Tag::Br);
        doc.append_child(paragraph, br);
    }
}

// ----------------------------------------------------------------------
// Selection deletion
// ----------------------------------------------------------------------

/// Re-express both selection endpoints as element positions where possible,
/// so structural checks see child indices rather than text offsets.
pub fn prefer_element_positions(doc: &mut Document) {
    if let Some(sel) = doc.selection() {
        let start = position::prefer_element_position(doc, sel.start);
        let end = position::prefer_element_position(doc, sel.end);
        doc.set_selection(Range::new(start, end));
    }
}

/// Delete the current selection's contents, leaving a cursor at the
/// deletion point.
pub fn delete_selection_contents(doc: &mut Document) {
    let Some(sel) = doc.selection() else {
        return;
    };
    delete_range_contents(doc, sel);
}

/// Delete everything a range covers. A selection spanning multiple table
/// cells deletes the table region instead (whole rows/columns/table when
/// fully covered, cell contents otherwise). Afterwards the paragraphs at
/// the two ends are joined and the cursor snaps to a valid stop at the
/// deletion point.
pub fn delete_range_contents(doc: &mut Document, range: Range) {
    let range = range.forwards(doc);
    if range.is_empty() {
        doc.set_cursor(range.start);
        return;
    }

    // Endpoints in different cells of one table: this is a table-region
    // deletion, not a text deletion.
    if let Some(region) = tables::region_from_range(doc, range, false) {
        let start_pos = Position::new(range.start.node, range.start.offset);
        tables::delete_region(doc, &region);
        let pos = position::closest_match_forwards(doc, start_pos, position::ok_for_insertion);
        doc.set_cursor(pos);
        return;
    }

    let mut start = range.start;
    let mut end = range.end;
    let mut positions = [start, end];
    doc.track_positions(&mut positions, |doc| {
        let outermost = range.outermost_nodes(doc);
        for node in outermost {
            if doc.node(node).is_text() {
                let len = doc.max_offset(node);
                let s = if node == range.start.node {
                    range.start.offset
                } else {
                    0
                };
                let e = if node == range.end.node {
                    range.end.offset
                } else {
                    len
                };
                if s == 0 && e == len {
                    doc.delete_node(node);
                } else {
                    doc.delete_characters(node, s, e);
                }
            } else {
                doc.delete_node(node);
            }
        }
    });
    start = positions[0];
    end = positions[1];

    // Join the blocks at the seam so the text on either side of the deleted
    // span flows together.
    let start_block = first_block_ancestor(doc, position::closest_actual_node(doc, start, false));
    let end_block = first_block_ancestor(doc, position::closest_actual_node(doc, end, false));
    let mut cursor = [start];
    doc.track_positions(&mut cursor, |doc| {
        if start_block != end_block
            && doc.in_tree(start_block)
            && doc.in_tree(end_block)
            && doc.parent(start_block) == doc.parent(end_block)
            && doc.is_paragraph(start_block)
            && doc.is_paragraph(end_block)
        {
            formatting::merge_with_neighbours(doc, start_block, &MERGEABLE_BLOCK_AND_INLINE, true);
        }
        if doc.in_tree(start_block) {
            update_br_at_end_of_paragraph(doc, start_block);
        }
    });

    let pos = position::closest_match_backwards(doc, cursor[0], position::ok_for_insertion);
    doc.set_cursor(pos);
}

fn first_block_ancestor(doc: &Document, node: NodeId) -> NodeId {
    let mut current = node;
    while doc.is_inline(current) {
        match doc.parent(current) {
            Some(p) => current = p,
            None => break,
        }
    }
    current
}

// ----------------------------------------------------------------------
// Space handling
// ----------------------------------------------------------------------

fn space_to_nbsp(doc: &mut Document, pos: Position) {
    let node = pos.node;
    let offset = pos.offset;
    if doc.node(node).is_text() && offset > 0 {
        let prev_is_space = doc
            .node(node)
            .text_value()
            .and_then(|v| v.chars().nth(offset - 1))
            .is_some_and(|c| c.is_whitespace());
        if prev_is_space {
            // Insert first so tracked positions are preserved.
            doc.insert_characters(node, offset - 1, &NBSP.to_string());
            doc.delete_characters(node, offset, offset + 1);
        }
    }
}

fn nbsp_to_space(doc: &mut Document, pos: Position) {
    let node = pos.node;
    let offset = pos.offset;
    if doc.node(node).is_text() && offset > 0 {
        let prev_is_nbsp = doc
            .node(node)
            .text_value()
            .and_then(|v| v.chars().nth(offset - 1))
            == Some(NBSP);
        if prev_is_nbsp {
            doc.insert_characters(node, offset - 1, " ");
            doc.delete_characters(node, offset, offset + 1);
        }
    }
}

fn check_nbsp(doc: &mut Document) {
    doc.preserve_selection_while(|doc| {
        if let Some(sel) = doc.selection() {
            nbsp_to_space(doc, sel.end);
        }
    });
}

fn is_pos_at_start_of_paragraph(doc: &Document, pos: Position) -> bool {
    if doc.node(pos.node).is_element() && pos.offset == 0 && !doc.is_inline(pos.node) {
        return true;
    }
    let mut pos = Some(pos);
    while let Some(p) = pos {
        if doc.node(p.node).is_element() {
            if p.offset == 0 && !doc.is_inline(p.node) {
                return true;
            }
            pos = position::prev(doc, p);
        } else if doc.node(p.node).is_text() {
            if p.offset > 0 {
                return false;
            }
            pos = position::prev(doc, p);
        } else {
            return false;
        }
    }
    false
}

/// The text immediately before the cursor within its text node.
pub fn get_preceding_word(doc: &Document) -> String {
    let Some(sel) = doc.selection() else {
        return String::new();
    };
    if !sel.is_empty() {
        return String::new();
    }
    match doc.node(sel.start.node).text_value() {
        Some(value) => value.chars().take(sel.start.offset).collect(),
        None => String::new(),
    }
}

// ----------------------------------------------------------------------
// Character insertion
// ----------------------------------------------------------------------

/// Insert a string at the cursor (replacing any selection), maintaining the
/// whitespace model and merging the new text into its neighbours.
pub fn insert_character(
    doc: &mut Document,
    s: &str,
    allow_invalid_pos: bool,
    allow_no_paragraph: bool,
) {
    let first_insertion = doc.undo_group_label() != Some("Insert text");
    if first_insertion {
        check_nbsp(doc);
        doc.undo_new_group("Insert text");
    }

    let mut s = s.to_string();
    if s == "-" {
        let preceding = get_preceding_word(doc);
        let trimmed = preceding.trim_end();
        if trimmed.chars().last().is_some_and(|c| c.is_ascii_digit()) {
            s = "\u{2013}".to_string(); // en dash in ranges like 1-2
        } else if preceding.chars().last().is_some_and(|c| c.is_whitespace()) {
            s = "\u{2014}".to_string(); // em dash after a space
        }
    }

    let Some(sel) = doc.selection() else {
        return;
    };
    if !sel.is_empty() {
        delete_selection_contents(doc);
    }
    let Some(sel) = doc.selection() else {
        return;
    };

    let mut pos = position::prefer_text_position(doc, sel.start);
    if s == " " && is_pos_at_start_of_paragraph(doc, pos) {
        return;
    }

    if !allow_invalid_pos && !position::ok_for_insertion(doc, pos) {
        let elem_pos = position::prefer_element_position(doc, pos);
        if position::ok_for_insertion(doc, elem_pos) {
            pos = elem_pos;
        } else {
            let old_pos = pos;
            pos = position::closest_match_forwards(doc, sel.start, position::ok_for_insertion);
            let difference = Range::new(old_pos, pos).forwards(doc);
            let mut tracked = [pos];
            doc.track_positions(&mut tracked, |doc| {
                if !difference.has_content(doc) {
                    delete_range_contents(doc, difference);
                }
            });
            pos = tracked[0];
        }
    }

    let mut node = pos.node;
    let mut offset = pos.offset;

    // A second space after a word turns the pending no-break space into a
    // sentence-ending period.
    if s == " " && !first_insertion && doc.node(node).is_text() && offset > 0 {
        let value: Vec<char> = doc.node(node).text_value().expect("text").chars().collect();
        if value.get(offset - 1) == Some(&NBSP) {
            let before: String = value[..offset].iter().collect();
            let ends_sentence = before
                .trim_end_matches(|c: char| c.is_whitespace())
                .ends_with('.');
            if !ends_sentence {
                doc.delete_characters(node, offset - 1, offset);
                doc.insert_characters(node, offset - 1, ".");
            }
        }
    }

    if crate::dom::is_whitespace_string(&s) && doc.node(node).is_text() && offset > 0 {
        let prev = doc
            .node(node)
            .text_value()
            .and_then(|v| v.chars().nth(offset - 1));
        if prev.is_some_and(|c| c.is_whitespace()) {
            return; // collapse repeated spaces
        }
    }

    nbsp_to_space(doc, pos);

    // An open-quote followed directly by a close-quote becomes one plain
    // double quote.
    if s == "\u{201d}" && doc.node(node).is_text() && offset > 0 {
        let prev = doc
            .node(node)
            .text_value()
            .and_then(|v| v.chars().nth(offset - 1));
        if prev == Some('\u{201c}') {
            doc.delete_characters(node, offset - 1, offset);
            offset -= 1;
            s = "\"".to_string();
        }
    }

    if doc.node(node).is_element() {
        let empty_text = doc.create_text("");
        let before = doc.child_at(node, offset);
        doc.insert_before(node, empty_text, before);
        node = empty_text;
        offset = 0;
    }

    if s == " " {
        doc.insert_characters(node, offset, &NBSP.to_string());
    } else {
        doc.insert_characters(node, offset, &s);
    }

    // Must happen after the text exists, so the wrapper has content.
    if !allow_no_paragraph {
        let parent_tag = doc.parent(node).and_then(|p| doc.node(p).tag().cloned());
        match parent_tag {
            Some(Tag::Caption) | Some(Tag::Figcaption) => {}
            _ => crate::hierarchy::ensure_inline_nodes_in_paragraph(doc, node, true),
        }
    }

    offset += s.chars().count();

    let mut tracked = [Position::new(node, offset)];
    doc.track_positions(&mut tracked, |doc| {
        formatting::merge_with_neighbours(doc, node, &MERGEABLE_INLINE, false);
    });
    let pos = tracked[0];

    doc.set_cursor(pos);
    doc.preserve_selection_while(|doc| {
        update_br_at_end_of_paragraph(doc, pos.node);
    });
}

// ----------------------------------------------------------------------
// Character deletion
// ----------------------------------------------------------------------

fn try_delete_empty_caption(doc: &mut Document, pos: Position) -> bool {
    let Some(caption) = position::caption_ancestor(doc, pos) else {
        return false;
    };
    if doc.node_has_content(caption) {
        return false;
    }
    let Some(container) = position::figure_or_table_ancestor(doc, pos) else {
        return false;
    };

    let parent = doc.parent(container).expect("container in tree");
    doc.set_cursor(Position::new(parent, doc.node_offset(container) + 1));
    doc.preserve_selection_while(|doc| {
        doc.delete_node(caption);
    });
    true
}

fn try_delete_empty_note(doc: &mut Document, pos: Position) -> bool {
    let Some(note) = position::note_ancestor(doc, pos) else {
        return false;
    };
    if doc.node_has_content(note) {
        return false;
    }

    let parent = doc.parent(note).expect("note in tree");
    doc.set_cursor(Position::new(parent, doc.node_offset(note) + 1));
    doc.preserve_selection_while(|doc| {
        doc.delete_node(note);
    });
    true
}

/// Backspace. Deletes the selection if there is one; otherwise one step
/// backwards, with special handling for atomic units (tables, figures,
/// links, notes) which are deleted whole, and for empty captions/notes.
pub fn delete_character(doc: &mut Document) {
    if doc.undo_group_label() != Some("Delete text") {
        check_nbsp(doc);
        doc.undo_new_group("Delete text");
    }

    prefer_element_positions(doc);
    let Some(sel) = doc.selection() else {
        return;
    };

    if !sel.is_empty() {
        delete_selection_contents(doc);
    } else {
        let current_pos = sel.start;

        // Backspace just after an atomic unit deletes the whole unit.
        let back = position::closest_match_backwards(doc, current_pos, ok_movement);
        if doc.node(back.node).is_element() && back.offset > 0 {
            if let Some(prev_node) = doc.child_at(back.node, back.offset - 1) {
                if doc.is_special_block(prev_node) {
                    let p = doc.create_element(Tag::P);
                    let parent = doc.parent(prev_node).expect("in tree");
                    doc.insert_before(parent, p, Some(prev_node));
                    doc.delete_node(prev_node);
                    update_br_at_end_of_paragraph(doc, p);
                    doc.set_cursor(Position::new(p, 0));
                    return;
                }
                if doc.has_tag(prev_node, &Tag::A) || doc.is_note_node(prev_node) {
                    doc.set_cursor(Position::new(back.node, back.offset - 1));
                    doc.preserve_selection_while(|doc| {
                        doc.delete_node(prev_node);
                    });
                    return;
                }
            }
        }

        if try_delete_empty_caption(doc, current_pos) {
            return;
        }

        let current_pos = position::prefer_text_position(doc, current_pos);
        let prev_pos = position::prev_match(doc, current_pos, ok_movement);

        if try_delete_empty_note(doc, current_pos) {
            return;
        }
        if let Some(prev_pos) = prev_pos {
            if try_delete_empty_note(doc, prev_pos) {
                return;
            }
        }

        if let Some(prev_pos) = prev_pos {
            let start_block =
                first_block_ancestor(doc, position::closest_actual_node(doc, prev_pos, false));
            let end_block =
                first_block_ancestor(doc, position::closest_actual_node(doc, sel.end, false));
            if start_block != end_block
                && doc.is_paragraph(start_block)
                && !doc.node_has_content(start_block)
            {
                doc.delete_node(start_block);
                doc.set_cursor(sel.end);
            } else {
                delete_range_contents(doc, Range::new(prev_pos, sel.end));
            }
        }
    }

    if let Some(sel) = doc.selection() {
        space_to_nbsp(doc, sel.end);
    }
}

// ----------------------------------------------------------------------
// Enter key
// ----------------------------------------------------------------------

fn get_block_to_split(doc: &Document, pos: Position) -> NodeId {
    let mut n = Some(pos.node);
    while let Some(node) = n {
        if doc.has_tag(node, &Tag::Li) {
            return node;
        }
        n = doc.parent(node);
    }
    let mut block = pos.node;
    while doc.is_inline(block) {
        block = doc.parent(block).expect("inline node has parent");
    }
    block
}

fn get_container_or_paragraph(doc: &Document, node: NodeId) -> NodeId {
    let mut current = node;
    while doc.is_inline(current) {
        match doc.parent(current) {
            Some(p) => current = p,
            None => break,
        }
    }
    current
}

fn position_at_start_of_heading(doc: &Document, pos: Position) -> bool {
    let container = get_container_or_paragraph(doc, pos.node);
    if !doc.is_heading(container) {
        return false;
    }
    let start_offset = match doc.first_child(container) {
        Some(first) if doc.is_opaque_node(first) => 1,
        _ => 0,
    };
    let range = Range::new(Position::new(container, start_offset), pos);
    !range.has_content(doc)
}

/// Split the current paragraph at the cursor. Headings split before their
/// content so Enter at the start of a heading opens a paragraph above it;
/// list items split into new items; captions get a fresh paragraph after
/// their table or figure.
pub fn enter_pressed(doc: &mut Document) {
    doc.undo_new_group("New paragraph");
    debug!("enter pressed");

    prefer_element_positions(doc);
    let Some(sel) = doc.selection() else {
        return;
    };
    if !sel.is_empty() {
        delete_selection_contents(doc);
    }
    let Some(mut sel) = doc.selection() else {
        return;
    };

    // Inside a caption: place an empty paragraph directly after the table
    // or figure rather than splitting the caption.
    let closest = position::closest_actual_node(doc, sel.start, false);
    let mut in_caption = false;
    let mut in_figcaption = false;
    let mut ancestor = Some(closest);
    while let Some(a) = ancestor {
        match doc.node(a).tag() {
            Some(Tag::Caption) => in_caption = true,
            Some(Tag::Figcaption) => in_figcaption = true,
            Some(Tag::Table) | Some(Tag::Figure) => {
                let is_table = doc.has_tag(a, &Tag::Table);
                if (in_caption && is_table) || (in_figcaption && !is_table) {
                    let p = doc.create_element(Tag::P);
                    let parent = doc.parent(a).expect("in tree");
                    let next = doc.next_sibling(a);
                    doc.insert_before(parent, p, next);
                    update_br_at_end_of_paragraph(doc, p);
                    doc.set_cursor(Position::new(p, 0));
                    return;
                }
            }
            _ => {}
        }
        ancestor = doc.parent(a);
    }

    // Inside a footnote/endnote: the split happens immediately after it.
    let note = if doc.node(sel.start.node).is_text() {
        position::note_ancestor(doc, sel.start)
    } else {
        let mut found = None;
        let mut anc = Some(sel.start.node);
        while let Some(a) = anc {
            if doc.is_note_node(a) {
                found = Some(a);
                break;
            }
            anc = doc.parent(a);
        }
        found
    };
    if let Some(note) = note {
        let parent = doc.parent(note).expect("note in tree");
        let offset = doc.node_offset(note);
        sel = Range::collapsed(Position::new(parent, offset + 1));
    }

    // Next to a table or figure: a fresh empty paragraph, no splitting.
    let check = position::prefer_element_position(doc, sel.start);
    if doc.node(check.node).is_element() {
        let before = if check.offset > 0 {
            doc.child_at(check.node, check.offset - 1)
        } else {
            None
        };
        let after = doc.child_at(check.node, check.offset);
        if before.is_some_and(|n| doc.is_special_block(n))
            || after.is_some_and(|n| doc.is_special_block(n))
        {
            let p = doc.create_element(Tag::P);
            let next = doc.child_at(check.node, check.offset);
            doc.insert_before(check.node, p, next);
            update_br_at_end_of_paragraph(doc, p);
            doc.set_cursor(Position::new(p, 0));
            return;
        }
    }

    range::ensure_inline_nodes_in_paragraph(doc, &mut sel);
    range::ensure_valid_hierarchy(doc, &mut sel);

    // Directly in a list container: open a new item.
    let detail = sel.detail(doc);
    if doc.is_list(detail.start_parent) {
        let li = doc.create_element(Tag::Li);
        doc.insert_before(detail.start_parent, li, detail.start_child);
        doc.set_cursor(Position::new(li, 0));
        return;
    }

    let mut pos = sel.start;
    doc.track_range(&mut sel, |doc| {
        // If we're directly in a container, add a paragraph so there is
        // something to split.
        if doc.is_container(pos.node) && !doc.has_tag(pos.node, &Tag::Li) {
            let p = doc.create_element(Tag::P);
            let next = doc.child_at(pos.node, pos.offset);
            doc.insert_before(pos.node, p, next);
            pos = Position::new(p, 0);
        }

        let block_to_split = get_block_to_split(doc, pos);
        let stop_at = doc.parent(block_to_split).expect("block in tree");
        let at_stop = move |d: &Document, n: NodeId| n == stop_at || n == d.body();

        if position_at_start_of_heading(doc, pos) {
            let container = get_container_or_paragraph(doc, pos.node);
            pos = formatting::move_preceding(
                doc,
                Position::new(container, 0),
                &at_stop,
                true,
            );
        } else if doc.node(pos.node).is_text() {
            pos = formatting::split_text_after(doc, pos, &at_stop, true);
        } else {
            pos = formatting::move_following(doc, pos, &at_stop, true);
        }
    });

    doc.set_cursor(pos);
    let Some(mut sel) = doc.selection() else {
        return;
    };

    doc.track_range(&mut sel, |doc| {
        if doc.node(pos.node).is_text() && doc.max_offset(pos.node) == 0 {
            doc.delete_node(pos.node);
        }
    });

    let detail = sel.detail(doc);
    let start = detail.start_child.unwrap_or(detail.start_parent);

    doc.track_range(&mut sel, |doc| {
        // If the paragraph before the split is now empty, restore its
        // placeholder; an emptied list item is cleaned out entirely.
        let mut ancestor = Some(start);
        while let Some(a) = ancestor {
            if let Some(prev) = doc.prev_sibling(a) {
                if doc.is_paragraph(prev) && !doc.node_has_content(prev) {
                    doc.delete_all_children(prev);
                    update_br_at_end_of_paragraph(doc, prev);
                    break;
                } else if doc.has_tag(prev, &Tag::Li) && !doc.node_has_content(prev) {
                    let children = doc.children(prev);
                    for child in children {
                        if doc.is_whitespace_text_node(child) {
                            doc.delete_node(child);
                        } else {
                            update_br_at_end_of_paragraph(doc, child);
                        }
                    }
                    break;
                }
            }
            ancestor = doc.parent(a);
        }

        let mut ancestor = Some(start);
        while let Some(a) = ancestor {
            if doc.is_paragraph(a) && !doc.node_has_content(a) {
                update_br_at_end_of_paragraph(doc, a);
                break;
            } else if doc.has_tag(a, &Tag::Li) && !doc.node_has_content(a) {
                doc.delete_all_children(a);
                break;
            }
            ancestor = doc.parent(a);
        }
    });

    doc.set_selection(sel);
    doc.preserve_selection_while(|doc| {
        if let Some(sel) = doc.selection() {
            let single = sel.single_node(doc);
            update_br_at_end_of_paragraph(doc, single);
        }
    });
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
    fn test_insert_character_simple() {
        let mut doc = parse_document("<p>helo</p>").unwrap();
        cursor_in(&mut doc, "helo", 3);
        insert_character(&mut doc, "l", false, false);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>hello</p></body>"
        );
        let sel = doc.selection().unwrap();
        assert_eq!(sel.start.offset, 4);
    }

    #[test]
    fn test_insert_space_becomes_nbsp() {
        let mut doc = parse_document("<p>ab</p>").unwrap();
        cursor_in(&mut doc, "ab", 2);
        insert_character(&mut doc, " ", false, false);
        let text = doc.find_text("ab").unwrap();
        assert_eq!(doc.node_text(text), "ab\u{a0}");
    }

    #[test]
    fn test_next_insertion_relaxes_nbsp() {
        let mut doc = parse_document("<p>ab</p>").unwrap();
        cursor_in(&mut doc, "ab", 2);
        insert_character(&mut doc, " ", false, false);
        insert_character(&mut doc, "c", false, false);
        let text = doc.find_text("ab").unwrap();
        assert_eq!(doc.node_text(text), "ab c");
    }

    #[test]
    fn test_space_at_start_of_paragraph_ignored() {
        let mut doc = parse_document("<p>word</p>").unwrap();
        cursor_in(&mut doc, "word", 0);
        insert_character(&mut doc, " ", false, false);
        let text = doc.find_text("word").unwrap();
        assert_eq!(doc.node_text(text), "word");
    }

    #[test]
    fn test_double_space_becomes_period() {
        let mut doc = parse_document("<p>word</p>").unwrap();
        cursor_in(&mut doc, "word", 4);
        insert_character(&mut doc, " ", false, false);
        insert_character(&mut doc, "x", false, false);
        insert_character(&mut doc, " ", false, false);
        insert_character(&mut doc, " ", false, false);
        let text = doc.find_text("word").unwrap();
        // A second space after a word ends the sentence.
        assert_eq!(doc.node_text(text), "word x.\u{a0}");
    }

    #[test]
    fn test_insert_replaces_selection() {
        let mut doc = parse_document("<p>abcdef</p>").unwrap();
        let text = doc.find_text("abcdef").unwrap();
        doc.set_selection(Range::new(Position::new(text, 1), Position::new(text, 5)));
        insert_character(&mut doc, "X", false, false);
        let text = doc.find_text("a").unwrap();
        assert_eq!(doc.node_text(text), "aXf");
    }

    #[test]
    fn test_insert_into_bare_container_wraps_paragraph() {
        let mut doc = parse_document("").unwrap();
        doc.set_cursor(Position::new(doc.body(), 0));
        insert_character(&mut doc, "a", false, false);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>a</p></body>"
        );
    }

    #[test]
    fn test_delete_character_simple() {
        let mut doc = parse_document("<p>hello</p>").unwrap();
        cursor_in(&mut doc, "hello", 5);
        delete_character(&mut doc);
        let text = doc.find_text("hell").unwrap();
        assert_eq!(doc.node_text(text), "hell");
    }

    #[test]
    fn test_delete_joins_paragraphs() {
        let mut doc = parse_document("<p>first</p><p>second</p>").unwrap();
        cursor_in(&mut doc, "second", 0);
        delete_character(&mut doc);
        let html = serialize_subtree(&doc, doc.body());
        assert_eq!(html, "<body><p>firstsecond</p></body>");
    }

    #[test]
    fn test_backspace_after_table_deletes_table() {
        let mut doc = parse_document(
            "<p>before</p><table><tbody><tr><td>x</td></tr></tbody></table><p>after</p>",
        )
        .unwrap();
        // Cursor sits between the table and the following paragraph.
        doc.set_cursor(Position::new(doc.body(), 2));
        delete_character(&mut doc);
        assert!(doc.find_first(&Tag::Table).is_none());
        // Replaced by an empty paragraph with its placeholder.
        let html = serialize_subtree(&doc, doc.body());
        assert_eq!(html, "<body><p>before</p><p><br></p><p>after</p></body>");
    }

    #[test]
    fn test_delete_selection_across_paragraphs() {
        let mut doc = parse_document("<p>alpha</p><p>omega</p>").unwrap();
        let alpha = doc.find_text("alpha").unwrap();
        let omega = doc.find_text("omega").unwrap();
        doc.set_selection(Range::new(Position::new(alpha, 3), Position::new(omega, 2)));
        delete_selection_contents(&mut doc);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>alpega</p></body>"
        );
    }

    #[test]
    fn test_enter_splits_paragraph_mid_text() {
        let mut doc = parse_document("<p>hello world</p>").unwrap();
        cursor_in(&mut doc, "hello world", 5);
        enter_pressed(&mut doc);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p>hello</p><p> world</p></body>"
        );
    }

    #[test]
    fn test_enter_in_empty_paragraph_duplicates_placeholder() {
        let mut doc = parse_document("<p><br></p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        doc.set_cursor(Position::new(p, 0));
        enter_pressed(&mut doc);
        assert_eq!(
            serialize_subtree(&doc, doc.body()),
            "<body><p><br></p><p><br></p></body>"
        );
        // Cursor ends in the second paragraph.
        let sel = doc.selection().unwrap();
        let paragraphs = doc.find_all(&Tag::P);
        let mut anc = sel.start.node;
        while !doc.is_paragraph(anc) {
            anc = doc.parent(anc).unwrap();
        }
        assert_eq!(anc, paragraphs[1]);
    }

    #[test]
    fn test_enter_at_start_of_heading_opens_paragraph_above() {
        let mut doc = parse_document("<h1>title</h1>").unwrap();
        cursor_in(&mut doc, "title", 0);
        enter_pressed(&mut doc);
        let html = serialize_subtree(&doc, doc.body());
        assert_eq!(html, "<body><h1><br></h1><h1>title</h1></body>");
    }

    #[test]
    fn test_enter_in_caption_adds_paragraph_after_table() {
        let mut doc = parse_document(
            "<table><caption>cap</caption><tbody><tr><td>x</td></tr></tbody></table>",
        )
        .unwrap();
        cursor_in(&mut doc, "cap", 3);
        enter_pressed(&mut doc);
        let table = doc.find_first(&Tag::Table).unwrap();
        let next = doc.next_sibling(table).unwrap();
        assert!(doc.has_tag(next, &Tag::P));
        assert!(!doc.node_has_content(next));
        let sel = doc.selection().unwrap();
        assert_eq!(sel.start, Position::new(next, 0));
    }

    #[test]
    fn test_update_br_placeholder_lifecycle() {
        let mut doc = parse_document("<p>text</p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        let text = doc.find_text("text").unwrap();

        // Removing all content adds the placeholder.
        doc.delete_node(text);
        update_br_at_end_of_paragraph(&mut doc, p);
        assert_eq!(serialize_subtree(&doc, p), "<p><br></p>");

        // Adding content removes it again.
        let fresh = doc.create_text("back");
        doc.append_child(p, fresh);
        update_br_at_end_of_paragraph(&mut doc, p);
        assert_eq!(serialize_subtree(&doc, p), "<p>back</p>");
    }

    #[test]
    fn test_dash_becomes_en_dash_after_digit() {
        let mut doc = parse_document("<p>1</p>").unwrap();
        cursor_in(&mut doc, "1", 1);
        insert_character(&mut doc, "-", false, false);
        let text = doc.find_text("1").unwrap();
        assert_eq!(doc.node_text(text), "1\u{2013}");
    }
}
