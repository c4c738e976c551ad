//! Caret geometry.
//!
//! The engine never computes pixel layout; it decides *which* node and
//! offset to ask the host about, and how to combine or fall back between
//! the candidate rectangles the host returns. The [`Layout`] trait is that
//! host contract: a pure query interface that may legitimately return
//! nothing (content not laid out, empty captions, atomic blocks), in which
//! case the fallback chain here degrades gracefully rather than failing.

use crate::dom::{Document, NodeId};
use crate::position::{self, Position};
use crate::range::Range;
use crate::text;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }
}

/// Host-provided layout queries. All methods may return nothing.
pub trait Layout {
    /// Rectangles covering characters `start..end` of a text node.
    fn text_rects(&self, doc: &Document, node: NodeId, start: usize, end: usize) -> Vec<Rect>;

    /// Bounding rectangle of an element.
    fn node_rect(&self, doc: &Document, node: NodeId) -> Option<Rect>;
}

fn zero_width_left(rect: Rect) -> Rect {
    Rect {
        left: rect.left,
        top: rect.top,
        width: 0.0,
        height: rect.height,
    }
}

fn zero_width_right(rect: Rect) -> Rect {
    Rect {
        left: rect.right(),
        top: rect.top,
        width: 0.0,
        height: rect.height,
    }
}

fn zero_width_mid(rect: Rect) -> Rect {
    Rect {
        left: rect.left + rect.width / 2.0,
        top: rect.top,
        width: 0.0,
        height: rect.height,
    }
}

/// Client rectangles of a range: per-text-node slices plus element bounds,
/// over the range's outermost nodes.
pub fn range_rects(doc: &Document, layout: &dyn Layout, range: Range) -> Vec<Rect> {
    let mut result = Vec::new();
    for node in range.outermost_nodes_at_least_one(doc) {
        if doc.node(node).is_text() {
            let start = if node == range.start.node {
                range.start.offset
            } else {
                0
            };
            let end = if node == range.end.node {
                range.end.offset
            } else {
                doc.max_offset(node)
            };
            result.extend(layout.text_rects(doc, node, start, end));
        } else if doc.node(node).is_element() {
            result.extend(layout.node_rect(doc, node));
        }
    }
    result
}

/// The rectangle of the content at a position, when the layout has one.
pub fn rect_at_pos(doc: &Document, layout: &dyn Layout, pos: Position) -> Option<Rect> {
    let range = Range::collapsed(pos);
    let rects = range_rects(doc, layout, range);
    if let Some(first) = rects.first() {
        if !first.is_empty() {
            return Some(*first);
        }
    }

    if doc.is_paragraph(pos.node) && pos.offset == 0 {
        if let Some(rect) = layout.node_rect(doc, pos.node) {
            if !rect.is_empty() {
                return Some(rect);
            }
        }
    }
    None
}

fn exact_rect_at_pos(doc: &Document, layout: &dyn Layout, pos: Position) -> Option<Rect> {
    let node = pos.node;
    let offset = pos.offset;

    if doc.node(node).is_element() {
        assert!(
            offset <= doc.child_count(node),
            "invalid offset {offset} of {}",
            doc.child_count(node)
        );
        let before = if offset > 0 {
            doc.child_at(node, offset - 1)
        } else {
            None
        };
        let after = doc.child_at(node, offset);

        // A caret adjacent to an atomic block is a zero-width line at the
        // block's edge.
        if let Some(before) = before {
            if doc.is_special_block(before) {
                return layout.node_rect(doc, before).map(zero_width_right);
            }
        }
        if let Some(after) = after {
            if doc.is_special_block(after) {
                return layout.node_rect(doc, after).map(zero_width_left);
            }
        }

        if offset == 0 && doc.is_paragraph(node) && !doc.node_has_content(node) {
            return layout.node_rect(doc, node).map(zero_width_left);
        }
        None
    } else if doc.node(node).is_text() {
        let rects = layout.text_rects(doc, node, offset, offset);
        if let Some(last) = rects.last() {
            if last.height > 0.0 {
                return Some(zero_width_right(*last));
            }
        }
        if offset > 0 {
            let rects = layout.text_rects(doc, node, offset - 1, offset);
            if let Some(last) = rects.last() {
                if last.height > 0.0 {
                    return Some(zero_width_right(*last));
                }
            }
        }
        None
    } else {
        None
    }
}

/// Measure where a caret would sit when nothing at the position itself has
/// geometry: insert a probe space through the ordinary mutation primitives,
/// measure it, and remove it again. The undo records cancel out.
fn temp_space_rect(
    doc: &mut Document,
    layout: &dyn Layout,
    parent: NodeId,
    next_sibling: Option<NodeId>,
) -> Option<Rect> {
    let space = doc.create_text("\u{a0}");
    doc.insert_before(parent, space, next_sibling);
    let rects = layout.text_rects(doc, space, 0, 1);
    doc.delete_node(space);
    rects.first().copied()
}

/// Best-effort caret rectangle with graceful degradation: exact geometry,
/// then note/caption probes, then scanning for the nearest position in the
/// same paragraph with geometry, then the enclosing element's bounds.
pub fn display_rect_at_pos(doc: &mut Document, layout: &dyn Layout, pos: Position) -> Option<Rect> {
    if let Some(rect) = exact_rect_at_pos(doc, layout, pos) {
        return Some(rect);
    }

    if let Some(note) = position::note_ancestor(doc, pos) {
        if !doc.node_has_content(note) {
            return layout.node_rect(doc, note).map(zero_width_mid);
        }
    }

    // Immediately before or after an empty note there is often no adjacent
    // text to measure; probe with a temporary space outside the note.
    if doc.node(pos.node).is_element() {
        let before = if pos.offset > 0 {
            doc.child_at(pos.node, pos.offset - 1)
        } else {
            None
        };
        let after = doc.child_at(pos.node, pos.offset);
        let adjacent_note = before.is_some_and(|n| doc.is_note_node(n))
            || after.is_some_and(|n| doc.is_note_node(n));
        if adjacent_note {
            let next = doc.child_at(pos.node, pos.offset);
            if let Some(rect) = temp_space_rect(doc, layout, pos.node, next) {
                return Some(zero_width_left(rect));
            }
        }
    }

    if let Some(caption) = position::caption_ancestor(doc, pos) {
        if !doc.node_has_content(caption) {
            if let Some(rect) = temp_space_rect(doc, layout, caption, None) {
                return Some(zero_width_right(rect));
            }
        }
    }

    let paragraph = text::find_paragraph_boundaries(doc, pos);

    let mut back_rect = None;
    let mut back_pos = Some(pos);
    while let Some(p) = back_pos {
        back_rect = exact_rect_at_pos(doc, layout, p);
        if back_rect.is_some()
            || (p.node == paragraph.node && p.offset == paragraph.start_offset)
        {
            break;
        }
        back_pos = position::prev(doc, p);
    }

    let mut forward_rect = None;
    let mut forward_pos = Some(pos);
    while let Some(p) = forward_pos {
        forward_rect = exact_rect_at_pos(doc, layout, p);
        if forward_rect.is_some()
            || (p.node == paragraph.node && p.offset == paragraph.end_offset)
        {
            break;
        }
        forward_pos = position::next(doc, p);
    }

    if let Some(rect) = back_rect {
        return Some(rect);
    }
    if let Some(rect) = forward_rect {
        return Some(rect);
    }

    // Last resort (e.g. an empty list item): the enclosing element's bounds.
    let node = if doc.node(pos.node).is_text() {
        doc.parent(pos.node).expect("text in tree")
    } else {
        pos.node
    };
    layout.node_rect(doc, node).map(zero_width_left)
}
