//! Abstract document locations.
//!
//! A [`Position`] is a point *between* content: a child index inside an
//! element, or a character index inside a text node — never "at" a node.
//! Positions move one step at a time in document order, can be tested for
//! legitimacy as cursor stops (whitespace collapsing mirrors how rendered
//! whitespace collapses), and can be snapped to the nearest legitimate stop.
//!
//! Live tracking across mutations is provided by the registry on
//! [`Document`]; see [`Document::track_positions`].

use std::cmp::Ordering;

use crate::dom::{Document, NodeId, Tag};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Position {
    pub node: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(node: NodeId, offset: usize) -> Position {
        Position { node, offset }
    }
}

/// Panic unless the position denotes a real location in the tree. Used by
/// compound operations to validate their inputs up front.
pub fn assert_valid(doc: &Document, pos: Position, description: &str) {
    let mut ancestor = pos.node;
    while ancestor != doc.body() {
        match doc.parent(ancestor) {
            Some(p) => ancestor = p,
            None => panic!("{description} node {} is not in tree", pos.node),
        }
    }
    let max = doc.max_offset(pos.node);
    assert!(
        pos.offset <= max,
        "{description} (in {}) has invalid offset {} (max allowed is {max})",
        pos.node,
        pos.offset
    );
}

/// Jumps between a table and its caption that plain parent/child stepping
/// would miss: moving into or out of a table should enter or exit its
/// caption rather than skip it.
fn position_special(
    doc: &Document,
    pos: Position,
    forwards: bool,
    backwards: bool,
) -> Option<Position> {
    let node = pos.node;
    let offset = pos.offset;

    let prev = if offset > 0 {
        doc.child_at(node, offset - 1)
    } else {
        None
    };
    let next = doc.child_at(node, offset);

    // Moving left from the start of a caption: go to the end of the table.
    if doc.has_tag(node, &Tag::Caption) && backwards && prev.is_none() {
        let table = doc.parent(node)?;
        return Some(Position::new(table, doc.child_count(table)));
    }

    // Moving right from the end of a caption: go after the table.
    if doc.has_tag(node, &Tag::Caption) && forwards && next.is_none() {
        let table = doc.parent(node)?;
        let grandparent = doc.parent(table)?;
        return Some(Position::new(grandparent, doc.node_offset(table) + 1));
    }

    // Moving left from just after a table: go to the end of its caption.
    if backwards {
        if let Some(prev) = prev {
            if doc.has_tag(prev, &Tag::Table) {
                if let Some(first) = first_child_element(doc, prev) {
                    if doc.has_tag(first, &Tag::Caption) {
                        return Some(Position::new(first, doc.child_count(first)));
                    }
                }
            }
        }
    }

    // Moving right from just before a table: bypass the caption.
    if forwards {
        if let Some(next) = next {
            if doc.has_tag(next, &Tag::Table) {
                if let Some(first) = first_child_element(doc, next) {
                    if doc.has_tag(first, &Tag::Caption) {
                        return Some(Position::new(next, doc.node_offset(first) + 1));
                    }
                }
            }
        }
    }

    // Moving right from the end of a table: go to the start of its caption.
    if doc.has_tag(node, &Tag::Table) && next.is_none() && forwards {
        if let Some(first) = first_child_element(doc, node) {
            if doc.has_tag(first, &Tag::Caption) {
                return Some(Position::new(first, 0));
            }
        }
    }

    // Moving left just after a caption node: skip over the caption.
    if backwards {
        if let Some(prev) = prev {
            if doc.has_tag(prev, &Tag::Caption) {
                return Some(Position::new(node, offset - 1));
            }
        }
    }

    None
}

fn first_child_element(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut child = doc.first_child(node);
    while let Some(c) = child {
        if doc.node(c).is_element() {
            return Some(c);
        }
        child = doc.next_sibling(c);
    }
    None
}

/// Single-step document-order predecessor, or `None` at the document start.
pub fn prev(doc: &Document, pos: Position) -> Option<Position> {
    let node = doc.node(pos.node);
    if node.is_element() {
        if let Some(special) = position_special(doc, pos, false, true) {
            return Some(special);
        }
        if pos.offset == 0 {
            up_and_back(doc, pos)
        } else {
            let child = doc.child_at(pos.node, pos.offset - 1)?;
            Some(Position::new(child, doc.max_offset(child)))
        }
    } else if node.is_text() {
        if pos.offset > 0 {
            Some(Position::new(pos.node, pos.offset - 1))
        } else {
            up_and_back(doc, pos)
        }
    } else {
        None
    }
}

/// Single-step document-order successor, or `None` at the document end.
pub fn next(doc: &Document, pos: Position) -> Option<Position> {
    let node = doc.node(pos.node);
    if node.is_element() {
        if let Some(special) = position_special(doc, pos, true, false) {
            return Some(special);
        }
        match doc.child_at(pos.node, pos.offset) {
            None => up_and_forwards(doc, pos),
            Some(child) => Some(Position::new(child, 0)),
        }
    } else if node.is_text() {
        if pos.offset < doc.max_offset(pos.node) {
            Some(Position::new(pos.node, pos.offset + 1))
        } else {
            up_and_forwards(doc, pos)
        }
    } else {
        None
    }
}

fn up_and_back(doc: &Document, pos: Position) -> Option<Position> {
    if pos.node == doc.body() {
        None
    } else {
        let parent = doc.parent(pos.node)?;
        Some(Position::new(parent, doc.node_offset(pos.node)))
    }
}

fn up_and_forwards(doc: &Document, pos: Position) -> Option<Position> {
    if pos.node == doc.body() {
        None
    } else {
        let parent = doc.parent(pos.node)?;
        Some(Position::new(parent, doc.node_offset(pos.node) + 1))
    }
}

/// The node a position is "at": the child it points at, or the nearest
/// sibling. With `prefer_element`, an element on the left wins over a text
/// node on the right.
pub fn closest_actual_node(doc: &Document, pos: Position, prefer_element: bool) -> NodeId {
    let node = pos.node;
    let offset = pos.offset;
    if !doc.node(node).is_element() || doc.first_child(node).is_none() {
        return node;
    }
    let count = doc.child_count(node);
    if offset == 0 {
        return doc.first_child(node).expect("non-empty");
    }
    if offset >= count {
        return doc.last_child(node).expect("non-empty");
    }
    let prev = doc.child_at(node, offset - 1).expect("in range");
    let next = doc.child_at(node, offset).expect("in range");
    if prefer_element && !doc.node(next).is_element() && doc.node(prev).is_element() {
        prev
    } else {
        next
    }
}

fn node_causes_line_break(doc: &Document, node: NodeId) -> bool {
    doc.has_tag(node, &Tag::Br) || !doc.is_inline(node)
}

/// Count the collapsible spaces between a node and the next rendered
/// content on the same line. `None` means a line break intervenes.
fn spaces_until_next_content(doc: &Document, start: NodeId) -> Option<usize> {
    let mut spaces = 0;
    let mut node = start;
    loop {
        if let Some(child) = doc.first_child(node) {
            node = child;
        } else if let Some(sibling) = doc.next_sibling(node) {
            node = sibling;
        } else {
            loop {
                match doc.parent(node) {
                    Some(parent) if doc.next_sibling(parent).is_none() => {
                        node = parent;
                        if node_causes_line_break(doc, node) {
                            return None;
                        }
                    }
                    _ => break,
                }
            }
            match doc.parent(node) {
                None => return None,
                Some(parent) => match doc.next_sibling(parent) {
                    None => return None,
                    Some(sibling) => node = sibling,
                },
            }
        }

        if node_causes_line_break(doc, node) {
            return None;
        }
        if doc.is_opaque_node(node) {
            return Some(spaces);
        }
        if let Some(value) = doc.node(node).text_value() {
            if doc.is_whitespace_text_node(node) {
                spaces += value.chars().count();
            } else {
                let leading = value.chars().take_while(|c| c.is_whitespace()).count();
                spaces += leading;
                return Some(spaces);
            }
        }
    }
}

pub fn ok_for_insertion(doc: &Document, pos: Position) -> bool {
    ok_for_movement(doc, pos, true)
}

/// Is this position a legitimate cursor stop?
///
/// Excludes positions inside opaque nodes, inside non-caption descendants of
/// a figure, and most positions surrounded only by collapsible whitespace:
/// within a run of whitespace only the first rendered boundary is a stop,
/// mirroring HTML whitespace collapse. `insertion` mode is slightly more
/// permissive, allowing stops that movement would skip.
pub fn ok_for_movement(doc: &Document, pos: Position, insertion: bool) -> bool {
    let node = pos.node;

    if doc.is_opaque_node(node) {
        return false;
    }

    // Inside a figure the only editable region is the caption.
    {
        let mut ancestor = Some(node);
        while let Some(a) = ancestor {
            if doc.has_tag(a, &Tag::Figcaption) {
                break;
            }
            if doc.has_tag(a, &Tag::Figure) {
                return false;
            }
            ancestor = doc.parent(a);
        }
    }

    if doc.node(node).is_text() {
        ok_for_movement_in_text(doc, pos, insertion)
    } else if doc.node(node).is_element() {
        ok_for_movement_in_element(doc, pos)
    } else {
        false
    }
}

fn ok_for_movement_in_text(doc: &Document, pos: Position, insertion: bool) -> bool {
    let node = pos.node;
    let mut offset = pos.offset;

    // Runs of adjacent text nodes render as one; fold them together and
    // adjust the offset so the checks below see the combined value.
    let mut first_node = node;
    let mut last_node = node;
    let mut value = doc.node(node).text_value().expect("text node").to_string();

    while let Some(prev) = doc.prev_sibling(first_node) {
        if !doc.node(prev).is_text() {
            break;
        }
        first_node = prev;
        let prev_value = doc.node(prev).text_value().expect("text node");
        offset += prev_value.chars().count();
        value = format!("{prev_value}{value}");
    }
    while let Some(next) = doc.next_sibling(last_node) {
        if !doc.node(next).is_text() {
            break;
        }
        last_node = next;
        value.push_str(doc.node(next).text_value().expect("text node"));
    }

    let chars: Vec<char> = value.chars().collect();
    let prev_char = offset.checked_sub(1).and_then(|i| chars.get(i).copied());
    let next_char = chars.get(offset).copied();
    let have_prev_char = prev_char.is_some_and(|c| !c.is_whitespace());
    let have_next_char = next_char.is_some_and(|c| !c.is_whitespace());
    if have_prev_char && have_next_char {
        return true;
    }

    if chars.iter().all(|c| c.is_whitespace()) {
        // The whole rendered run is whitespace: only a handful of
        // situations make such a run a legitimate stop.
        if offset == 0 {
            if node == first_node
                && doc.prev_sibling(first_node).is_none()
                && doc.next_sibling(last_node).is_none()
            {
                return true;
            }
            if let Some(next_sib) = doc.next_sibling(node) {
                if doc.has_tag(next_sib, &Tag::Br) {
                    return true;
                }
            }
            if doc.prev_sibling(node).is_none() && doc.next_sibling(node).is_none() {
                return true;
            }
            if insertion {
                if let Some(prev_sib) = doc.prev_sibling(node) {
                    if doc.is_inline(prev_sib)
                        && !doc.is_opaque_node(prev_sib)
                        && !doc.has_tag(prev_sib, &Tag::Br)
                    {
                        return true;
                    }
                }
            }
        }
        return false;
    }

    if insertion {
        return true;
    }

    let preceding: String = chars[..offset.min(chars.len())].iter().collect();
    if preceding.chars().all(|c| c.is_whitespace()) {
        return have_next_char
            && (match doc.prev_sibling(node) {
                None => true,
                Some(prev_sib) => {
                    doc.has_tag(prev_sib, &Tag::Br)
                        || doc.is_note_node(prev_sib)
                        || doc.is_paragraph(prev_sib)
                        || doc
                            .node_text(prev_sib)
                            .chars()
                            .last()
                            .is_some_and(|c| c.is_whitespace())
                        || doc.is_item_number(prev_sib)
                        || !preceding.is_empty()
                }
            });
    }

    let following: String = chars[offset.min(chars.len())..].iter().collect();
    if following.chars().all(|c| c.is_whitespace()) {
        return have_prev_char
            && (match doc.next_sibling(node) {
                None => true,
                Some(next_sib) => {
                    doc.is_note_node(next_sib)
                        || !following.is_empty()
                        || spaces_until_next_content(doc, node) != Some(0)
                }
            });
    }

    have_prev_char || have_next_char
}

fn ok_for_movement_in_element(doc: &Document, pos: Position) -> bool {
    let node = pos.node;
    let offset = pos.offset;

    if doc.first_child(node).is_none() {
        match doc.node(node).tag() {
            Some(Tag::Li) | Some(Tag::Th) | Some(Tag::Td) => return true,
            _ => {
                if doc.is_paragraph(node) {
                    return true;
                }
            }
        }
    }

    let prev_node = if offset > 0 {
        doc.child_at(node, offset - 1)
    } else {
        None
    };
    let next_node = doc.child_at(node, offset);

    let prev_is_note = prev_node.is_some_and(|n| doc.is_note_node(n));
    let next_is_note = next_node.is_some_and(|n| doc.is_note_node(n));
    if prev_is_note && !next_node.is_some_and(|n| doc.node_has_content(n)) {
        return true;
    }
    if next_is_note && !prev_node.is_some_and(|n| doc.node_has_content(n)) {
        return true;
    }
    if prev_is_note && next_is_note {
        return true;
    }

    if prev_node.is_none() && next_node.is_none() {
        let allows = doc
            .node(node)
            .tag()
            .is_some_and(|t| t.allows_direct_children());
        if allows
            || (doc.is_inline(node) && !doc.is_opaque_node(node) && !doc.has_tag(node, &Tag::Br))
        {
            return true;
        }
    }

    if prev_node.is_some_and(|n| doc.is_special_block(n)) {
        return true;
    }
    if next_node.is_some_and(|n| doc.is_special_block(n)) {
        return true;
    }

    if next_node.is_some_and(|n| doc.is_item_number(n)) {
        return false;
    }
    if prev_node.is_some_and(|n| doc.is_item_number(n)) {
        return match next_node {
            None => true,
            Some(n) => doc.is_whitespace_text_node(n),
        };
    }

    if let Some(n) = next_node {
        if doc.has_tag(n, &Tag::Br) {
            return !prev_node.is_some_and(|p| doc.node(p).is_text());
        }
    }

    if let Some(p) = prev_node {
        if doc.is_opaque_node(p) || doc.has_tag(p, &Tag::Table) {
            return match next_node {
                None => true,
                Some(n) => {
                    doc.node(n).is_text() || doc.has_tag(n, &Tag::Table) || doc.is_opaque_node(n)
                }
            };
        }
    }
    if let Some(n) = next_node {
        if doc.is_opaque_node(n) || doc.has_tag(n, &Tag::Table) {
            return match prev_node {
                None => true,
                Some(p) => {
                    doc.node(p).is_text() || doc.has_tag(p, &Tag::Table) || doc.is_opaque_node(p)
                }
            };
        }
    }

    false
}

/// Step backwards until `predicate` holds; `None` if it never does.
pub fn prev_match(
    doc: &Document,
    mut pos: Position,
    predicate: impl Fn(&Document, Position) -> bool,
) -> Option<Position> {
    loop {
        pos = prev(doc, pos)?;
        if predicate(doc, pos) {
            return Some(pos);
        }
    }
}

/// Step forwards until `predicate` holds; `None` if it never does.
pub fn next_match(
    doc: &Document,
    mut pos: Position,
    predicate: impl Fn(&Document, Position) -> bool,
) -> Option<Position> {
    loop {
        pos = next(doc, pos)?;
        if predicate(doc, pos) {
            return Some(pos);
        }
    }
}

/// Some positions are equivalent to a neighbouring one that the predicate
/// accepts (element boundary vs. adjacent text end, or a spot just after
/// trailing whitespace); try those before walking away.
fn find_equivalent_valid_position(
    doc: &Document,
    pos: Position,
    predicate: &impl Fn(&Document, Position) -> bool,
) -> Position {
    if doc.node(pos.node).is_element() {
        let before = if pos.offset > 0 {
            doc.child_at(pos.node, pos.offset - 1)
        } else {
            None
        };
        let after = doc.child_at(pos.node, pos.offset);
        if let Some(before) = before {
            if doc.node(before).is_text() {
                let candidate = Position::new(before, doc.max_offset(before));
                if predicate(doc, candidate) {
                    return candidate;
                }
            }
        }
        if let Some(after) = after {
            if doc.node(after).is_text() {
                let candidate = Position::new(after, 0);
                if predicate(doc, candidate) {
                    return candidate;
                }
            }
        }
    }

    if let Some(value) = doc.node(pos.node).text_value() {
        let chars: Vec<char> = value.chars().collect();
        if chars[pos.offset.min(chars.len())..]
            .iter()
            .all(|c| c.is_whitespace())
        {
            let trailing = chars.iter().rev().take_while(|c| c.is_whitespace()).count();
            if trailing > 0 {
                return Position::new(pos.node, chars.len() - trailing + 1);
            }
        }
    }
    pos
}

/// Snap to the nearest matching position, searching forwards first and
/// falling back to backwards, then to the end of the document.
pub fn closest_match_forwards(
    doc: &Document,
    pos: Position,
    predicate: impl Fn(&Document, Position) -> bool,
) -> Position {
    let candidate = if predicate(doc, pos) {
        pos
    } else {
        find_equivalent_valid_position(doc, pos, &predicate)
    };
    if predicate(doc, candidate) {
        return candidate;
    }
    if let Some(next) = next_match(doc, candidate, &predicate) {
        return next;
    }
    if let Some(prev) = prev_match(doc, candidate, &predicate) {
        return prev;
    }
    Position::new(doc.body(), doc.child_count(doc.body()))
}

/// Snap to the nearest matching position, searching backwards first and
/// falling back to forwards, then to the start of the document.
pub fn closest_match_backwards(
    doc: &Document,
    pos: Position,
    predicate: impl Fn(&Document, Position) -> bool,
) -> Position {
    let candidate = if predicate(doc, pos) {
        pos
    } else {
        find_equivalent_valid_position(doc, pos, &predicate)
    };
    if predicate(doc, candidate) {
        return candidate;
    }
    if let Some(prev) = prev_match(doc, candidate, &predicate) {
        return prev;
    }
    if let Some(next) = next_match(doc, candidate, &predicate) {
        return next;
    }
    Position::new(doc.body(), 0)
}

/// An element-boundary position re-expressed inside an adjacent text node,
/// when possible.
pub fn prefer_text_position(doc: &Document, pos: Position) -> Position {
    if doc.node(pos.node).is_element() {
        let before = if pos.offset > 0 {
            doc.child_at(pos.node, pos.offset - 1)
        } else {
            None
        };
        let after = doc.child_at(pos.node, pos.offset);
        if let Some(before) = before {
            if doc.node(before).is_text() {
                return Position::new(before, doc.max_offset(before));
            }
        }
        if let Some(after) = after {
            if doc.node(after).is_text() {
                return Position::new(after, 0);
            }
        }
    }
    pos
}

/// A text-boundary position re-expressed as a child index in the parent,
/// when it sits at either end of its text node.
pub fn prefer_element_position(doc: &Document, pos: Position) -> Position {
    if doc.node(pos.node).is_text() {
        let parent = doc
            .parent(pos.node)
            .unwrap_or_else(|| panic!("position node {} has no parent", pos.node));
        if pos.offset == 0 {
            return Position::new(parent, doc.node_offset(pos.node));
        }
        if pos.offset == doc.max_offset(pos.node) {
            return Position::new(parent, doc.node_offset(pos.node) + 1);
        }
    }
    pos
}

/// Total order over positions sharing a root. Panics if the positions have
/// no common ancestor (one of them is outside the tree).
pub fn compare(doc: &Document, first: Position, second: Position) -> Ordering {
    if first.node == second.node {
        return first.offset.cmp(&second.offset);
    }

    let (first_parent, first_child) = if doc.node(first.node).is_element() {
        (first.node, doc.child_at(first.node, first.offset))
    } else {
        (
            doc.parent(first.node)
                .unwrap_or_else(|| panic!("first node has been removed from document")),
            Some(first.node),
        )
    };
    let (second_parent, second_child) = if doc.node(second.node).is_element() {
        (second.node, doc.child_at(second.node, second.offset))
    } else {
        (
            doc.parent(second.node)
                .unwrap_or_else(|| panic!("second node has been removed from document")),
            Some(second.node),
        )
    };

    if doc.node(first.node).is_text() && first_child == second_child {
        return Ordering::Greater;
    }

    let mut first_c = first_child;
    let mut first_p = Some(first_parent);
    while let Some(fp) = first_p {
        let mut second_c = second_child;
        let mut second_p = Some(second_parent);
        while let Some(sp) = second_p {
            if second_c == Some(fp) {
                return Ordering::Greater;
            }
            if fp == sp {
                // Shared ancestor found: document order is sibling order.
                let Some(sc) = second_c else {
                    return Ordering::Less;
                };
                let mut n = first_c;
                while let Some(current) = n {
                    if current == sc {
                        return Ordering::Less;
                    }
                    n = doc.next_sibling(current);
                }
                return Ordering::Greater;
            }
            second_c = Some(sp);
            second_p = doc.parent(sp);
        }
        first_c = Some(fp);
        first_p = doc.parent(fp);
    }
    panic!("could not find common ancestor of positions");
}

/// Nearest enclosing footnote/endnote marker.
pub fn note_ancestor(doc: &Document, pos: Position) -> Option<NodeId> {
    let mut node = Some(closest_actual_node(doc, pos, false));
    while let Some(n) = node {
        if doc.is_note_node(n) {
            return Some(n);
        }
        node = doc.parent(n);
    }
    None
}

/// Nearest enclosing `<caption>`/`<figcaption>`.
pub fn caption_ancestor(doc: &Document, pos: Position) -> Option<NodeId> {
    let mut node = Some(closest_actual_node(doc, pos, false));
    while let Some(n) = node {
        if doc.has_tag(n, &Tag::Caption) || doc.has_tag(n, &Tag::Figcaption) {
            return Some(n);
        }
        node = doc.parent(n);
    }
    None
}

/// Nearest enclosing `<figure>`/`<table>`.
pub fn figure_or_table_ancestor(doc: &Document, pos: Position) -> Option<NodeId> {
    let mut node = Some(closest_actual_node(doc, pos, false));
    while let Some(n) = node {
        if doc.has_tag(n, &Tag::Figure) || doc.has_tag(n, &Tag::Table) {
            return Some(n);
        }
        node = doc.parent(n);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_document;
    use pretty_assertions::assert_eq;

    fn walk_forwards(doc: &Document) -> Vec<Position> {
        let mut result = Vec::new();
        let mut pos = Some(Position::new(doc.body(), 0));
        while let Some(p) = pos {
            result.push(p);
            pos = next(doc, p);
        }
        result
    }

    #[test]
    fn test_next_and_prev_are_inverse() {
        let doc = parse_document("<p>ab</p><p><b>c</b></p>").unwrap();
        let forwards = walk_forwards(&doc);
        // Walking back from the last position visits the same points.
        let mut back = Vec::new();
        let mut pos = Some(*forwards.last().unwrap());
        while let Some(p) = pos {
            back.push(p);
            pos = prev(&doc, p);
        }
        back.reverse();
        assert_eq!(forwards, back);
    }

    #[test]
    fn test_stepping_covers_characters() {
        let doc = parse_document("<p>abc</p>").unwrap();
        let text = doc.find_text("abc").unwrap();
        let offsets: Vec<usize> = walk_forwards(&doc)
            .into_iter()
            .filter(|p| p.node == text)
            .map(|p| p.offset)
            .collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_compare_orders_document_positions() {
        let doc = parse_document("<p>ab</p><p>cd</p>").unwrap();
        let positions = walk_forwards(&doc);
        for window in positions.windows(2) {
            let order = compare(&doc, window[0], window[1]);
            assert_ne!(order, Ordering::Greater, "{:?} > {:?}", window[0], window[1]);
        }
        assert_eq!(
            compare(&doc, positions[0], *positions.last().unwrap()),
            Ordering::Less
        );
    }

    #[test]
    fn test_ok_for_movement_interior_of_word() {
        let doc = parse_document("<p>hi there</p>").unwrap();
        let text = doc.find_text("hi").unwrap();
        assert!(ok_for_movement(&doc, Position::new(text, 1), false));
        assert!(ok_for_movement(&doc, Position::new(text, 0), false));
        assert!(ok_for_movement(&doc, Position::new(text, 8), false));
    }

    #[test]
    fn test_ok_for_movement_collapses_whitespace_run() {
        // Only the first boundary of the interior whitespace run is a stop.
        let doc = parse_document("<p>a&nbsp;&nbsp;&nbsp;b</p>").unwrap();
        let text = doc.find_text("a").unwrap();
        assert!(ok_for_movement(&doc, Position::new(text, 0), false));
        assert!(ok_for_movement(&doc, Position::new(text, 1), false));
        assert!(!ok_for_movement(&doc, Position::new(text, 2), false));
        assert!(!ok_for_movement(&doc, Position::new(text, 3), false));
        assert!(ok_for_movement(&doc, Position::new(text, 4), false));
        assert!(ok_for_movement(&doc, Position::new(text, 5), false));
    }

    #[test]
    fn test_positions_inside_figure_rejected_outside_caption() {
        let doc = parse_document(
            "<figure><img src=\"x.png\"><figcaption>cap</figcaption></figure>",
        )
        .unwrap();
        let caption_text = doc.find_text("cap").unwrap();
        let figure = doc.find_first(&Tag::Figure).unwrap();
        assert!(ok_for_movement(&doc, Position::new(caption_text, 1), false));
        assert!(!ok_for_movement(&doc, Position::new(figure, 0), false));
    }

    #[test]
    fn test_empty_paragraph_is_valid_stop() {
        let doc = parse_document("<p></p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        assert!(ok_for_movement(&doc, Position::new(p, 0), false));
    }

    #[test]
    fn test_caption_jump_moving_into_table() {
        let doc = parse_document(
            "<table><caption>title</caption><tbody><tr><td><p>cell</p></td></tr></tbody></table>",
        )
        .unwrap();
        let table = doc.find_first(&Tag::Table).unwrap();
        let caption = doc.find_first(&Tag::Caption).unwrap();
        let body = doc.body();

        // Stepping right from just before the table enters past the caption.
        let entered = next(&doc, Position::new(body, 0)).unwrap();
        assert_eq!(entered, Position::new(table, 1));

        // Stepping right from the end of the table enters the caption.
        let end_of_table = Position::new(table, doc.child_count(table));
        let into_caption = next(&doc, end_of_table).unwrap();
        assert_eq!(into_caption, Position::new(caption, 0));

        // Stepping left from the start of the caption goes to the table end.
        let back = prev(&doc, Position::new(caption, 0)).unwrap();
        assert_eq!(back, end_of_table);
    }

    #[test]
    fn test_closest_match_falls_back_to_document_end() {
        let doc = parse_document("").unwrap();
        let pos = closest_match_forwards(&doc, Position::new(doc.body(), 0), |_, _| false);
        assert_eq!(pos, Position::new(doc.body(), 0));
    }

    #[test]
    fn test_closest_match_snaps_to_text() {
        let doc = parse_document("<p>word</p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        let text = doc.find_text("word").unwrap();
        let snapped = closest_match_forwards(&doc, Position::new(p, 0), ok_for_insertion);
        assert_eq!(snapped, Position::new(text, 0));
    }

    #[test]
    fn test_prefer_element_and_text_positions() {
        let doc = parse_document("<p>word</p>").unwrap();
        let p = doc.find_first(&Tag::P).unwrap();
        let text = doc.find_text("word").unwrap();

        let elem = prefer_element_position(&doc, Position::new(text, 4));
        assert_eq!(elem, Position::new(p, 1));
        let back = prefer_text_position(&doc, Position::new(p, 0));
        assert_eq!(back, Position::new(text, 0));
    }

    #[test]
    fn test_opaque_link_interior_rejected() {
        let doc =
            parse_document("<p>see <a href=\"http://x\">link</a> here</p>").unwrap();
        let link_text = doc.find_text("link").unwrap();
        assert!(!ok_for_movement(&doc, Position::new(link_text, 2), false));
    }
}
