//! Paragraph-level text analysis.
//!
//! A "paragraph" here is a maximal run of inline content: usually the
//! children of a paragraph element, but also a bare sequence of inline nodes
//! sitting between two block nodes. The analysis flattens such a run into
//! its text with a list of [`Run`]s mapping text offsets back to nodes, which
//! is what cursor navigation and spell-checking-style consumers work over.

use crate::dom::{Document, NodeId};
use crate::position::{self, Position};

/// The enclosing inline run of a position: `node` is the block-level parent,
/// and the run spans its children `[start_offset, end_offset)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParagraphBoundaries {
    pub node: NodeId,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// One text node's contribution to a paragraph's flattened text.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

/// A paragraph flattened to text plus the runs that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ParagraphAnalysis {
    pub node: NodeId,
    pub start_offset: usize,
    pub end_offset: usize,
    pub runs: Vec<Run>,
    pub text: String,
}

/// Find the run of inline siblings containing `pos`. Panics if the position
/// does not resolve to an element context (a comment position, say).
pub fn find_paragraph_boundaries(doc: &Document, pos: Position) -> ParagraphBoundaries {
    position::assert_valid(doc, pos, "Paragraph boundary position");
    let mut start_offset = pos.offset;
    let mut end_offset = pos.offset;
    let mut node = pos.node;

    while doc.is_inline(node) {
        start_offset = doc.node_offset(node);
        end_offset = doc.node_offset(node) + 1;
        node = doc.parent(node).expect("inline node has parent");
    }

    assert!(
        doc.node(node).is_element(),
        "paragraph boundary search landed on a non-element"
    );

    while start_offset > 0 {
        let child = doc.child_at(node, start_offset - 1).expect("in range");
        if !doc.is_inline(child) {
            break;
        }
        start_offset -= 1;
    }
    let count = doc.child_count(node);
    while end_offset < count {
        let child = doc.child_at(node, end_offset).expect("in range");
        if !doc.is_inline(child) {
            break;
        }
        end_offset += 1;
    }

    ParagraphBoundaries {
        node,
        start_offset,
        end_offset,
    }
}

/// Flatten the paragraph containing `pos` into text and runs.
pub fn analyse_paragraph(doc: &Document, pos: Position) -> ParagraphAnalysis {
    let boundaries = find_paragraph_boundaries(doc, pos);
    let mut runs = Vec::new();
    let mut text = String::new();
    let mut offset = 0;

    for i in boundaries.start_offset..boundaries.end_offset {
        let child = doc.child_at(boundaries.node, i).expect("in range");
        collect_runs(doc, child, &mut runs, &mut text, &mut offset);
    }

    ParagraphAnalysis {
        node: boundaries.node,
        start_offset: boundaries.start_offset,
        end_offset: boundaries.end_offset,
        runs,
        text,
    }
}

fn collect_runs(
    doc: &Document,
    node: NodeId,
    runs: &mut Vec<Run>,
    text: &mut String,
    offset: &mut usize,
) {
    if let Some(value) = doc.node(node).text_value() {
        let len = value.chars().count();
        runs.push(Run {
            node,
            start: *offset,
            end: *offset + len,
        });
        text.push_str(value);
        *offset += len;
    }
    let mut child = doc.first_child(node);
    while let Some(c) = child {
        collect_runs(doc, c, runs, text, offset);
        child = doc.next_sibling(c);
    }
}

impl ParagraphAnalysis {
    /// The run containing a flattened-text offset. With `end` set, an offset
    /// on a run boundary resolves to the earlier run.
    pub fn run_from_offset(&self, offset: usize, end: bool) -> Option<&Run> {
        assert!(!self.runs.is_empty(), "paragraph has no runs");
        if !end {
            for (i, run) in self.runs.iter().enumerate() {
                if offset >= run.start && offset < run.end {
                    return Some(run);
                }
                if i == self.runs.len() - 1 && offset == run.end {
                    return Some(run);
                }
            }
        } else {
            for (i, run) in self.runs.iter().enumerate() {
                if offset > run.start && offset <= run.end {
                    return Some(run);
                }
                if i == 0 && offset == 0 {
                    return Some(run);
                }
            }
        }
        None
    }

    pub fn run_from_node(&self, node: NodeId) -> Option<&Run> {
        self.runs.iter().find(|r| r.node == node)
    }

    /// Map a flattened-text offset to a document position.
    pub fn position_at_offset(&self, offset: usize, end: bool) -> Position {
        let run = self
            .run_from_offset(offset, end)
            .unwrap_or_else(|| panic!("run at offset {offset} not found"));
        Position::new(run.node, offset - run.start)
    }

    /// Map a document position inside one of the runs to a flattened-text
    /// offset.
    pub fn offset_at_position(&self, pos: Position) -> Option<usize> {
        self.run_from_node(pos.node).map(|run| run.start + pos.offset)
    }
}

/// Nearest position inside a non-whitespace text node at or before `pos`.
pub fn closest_pos_backwards(doc: &Document, pos: Position) -> Option<Position> {
    if doc.is_non_whitespace_text_node(pos.node) {
        return Some(pos);
    }
    let mut node = if doc.node(pos.node).is_element() && pos.offset > 0 {
        let mut n = doc.child_at(pos.node, pos.offset - 1).expect("in range");
        while let Some(last) = doc.last_child(n) {
            n = last;
        }
        Some(n)
    } else {
        Some(pos.node)
    };
    while let Some(n) = node {
        if n == doc.body() {
            return None;
        }
        if doc.is_non_whitespace_text_node(n) {
            return Some(Position::new(n, doc.max_offset(n)));
        }
        node = doc.prev_node(n);
    }
    None
}

/// Nearest position inside a non-whitespace text node at or after `pos`.
pub fn closest_pos_forwards(doc: &Document, pos: Position) -> Option<Position> {
    if doc.is_non_whitespace_text_node(pos.node) {
        return Some(pos);
    }
    let mut node = if doc.node(pos.node).is_element() && pos.offset < doc.max_offset(pos.node) {
        let mut n = doc.child_at(pos.node, pos.offset).expect("in range");
        while let Some(first) = doc.first_child(n) {
            n = first;
        }
        Some(n)
    } else {
        doc.next_node_after(pos.node)
    };
    while let Some(n) = node {
        if doc.is_non_whitespace_text_node(n) {
            return Some(Position::new(n, 0));
        }
        node = doc.next_node(n);
    }
    None
}

/// Snap to the start of the paragraph containing `pos`.
pub fn to_start_of_paragraph(doc: &Document, pos: Position) -> Option<Position> {
    let pos = position::closest_match_backwards(doc, pos, |d, p| {
        position::ok_for_movement(d, p, false)
    });
    let paragraph = analyse_paragraph(doc, pos);
    let new_pos = Position::new(paragraph.node, paragraph.start_offset);
    Some(position::closest_match_forwards(doc, new_pos, |d, p| {
        position::ok_for_movement(d, p, false)
    }))
}

/// Snap to the end of the paragraph containing `pos`.
pub fn to_end_of_paragraph(doc: &Document, pos: Position) -> Option<Position> {
    let pos = position::closest_match_forwards(doc, pos, |d, p| {
        position::ok_for_movement(d, p, false)
    });
    let paragraph = analyse_paragraph(doc, pos);
    let new_pos = Position::new(paragraph.node, paragraph.end_offset);
    Some(position::closest_match_backwards(doc, new_pos, |d, p| {
        position::ok_for_movement(d, p, false)
    }))
}
