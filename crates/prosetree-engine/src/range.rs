//! Spans of document content: an ordered pair of positions.
//!
//! The central computation here is [`outermost_nodes`]: the minimal node list
//! whose descendants exactly cover the range, produced by walking the start
//! ancestor chain, the middle siblings, and the end ancestor chain. Nearly
//! every structural operation in the crate leans on it.

use std::cmp::Ordering;

use crate::dom::{is_whitespace_string, Document, NodeId};
use crate::hierarchy;
use crate::position::{self, Position};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// The (parent, child) decomposition of a range's two endpoints plus their
/// common ancestor. `child == None` encodes "after the last child".
#[derive(Copy, Clone, Debug)]
pub struct RangeDetail {
    pub start_parent: NodeId,
    pub start_child: Option<NodeId>,
    pub end_parent: NodeId,
    pub end_child: Option<NodeId>,
    pub common_ancestor: NodeId,
    pub start_ancestor: Option<NodeId>,
    pub end_ancestor: Option<NodeId>,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Range {
        Range { start, end }
    }

    pub fn collapsed(pos: Position) -> Range {
        Range {
            start: pos,
            end: pos,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_forwards(&self, doc: &Document) -> bool {
        position::compare(doc, self.start, self.end) != Ordering::Greater
    }

    /// The range with its endpoints in document order.
    pub fn forwards(&self, doc: &Document) -> Range {
        if self.is_forwards(doc) {
            *self
        } else {
            let reversed = Range::new(self.end, self.start);
            assert!(
                reversed.is_forwards(doc),
                "range and its reverse are both backwards"
            );
            reversed
        }
    }

    /// Widen both endpoints outward while they sit at a node boundary, up to
    /// the nearest ancestor boundary. Applied before block-level edits so
    /// wrappers enclosing the full selection are included.
    pub fn expand(&mut self, doc: &Document) {
        while self.start.offset == 0 && self.start.node != doc.body() {
            let offset = doc.node_offset(self.start.node);
            self.start = Position::new(doc.parent(self.start.node).expect("in tree"), offset);
        }
        while self.end.offset == doc.max_offset(self.end.node) && self.end.node != doc.body() {
            let offset = doc.node_offset(self.end.node);
            self.end = Position::new(doc.parent(self.end.node).expect("in tree"), offset + 1);
        }
    }

    /// Decompose the endpoints and find their common ancestor. Panics if the
    /// endpoints share no ancestor (a detached range is a programming error).
    pub fn detail(&self, doc: &Document) -> RangeDetail {
        let range = self.forwards(doc);
        let start = range.start;
        let end = range.end;

        let (start_parent, start_child) = if doc.node(start.node).is_element() {
            (start.node, doc.child_at(start.node, start.offset))
        } else {
            (
                doc.parent(start.node).expect("start node in tree"),
                Some(start.node),
            )
        };

        let (end_parent, end_child) = if doc.node(end.node).is_element() {
            (end.node, doc.child_at(end.node, end.offset))
        } else if end.offset == 0 {
            (doc.parent(end.node).expect("end node in tree"), Some(end.node))
        } else {
            (
                doc.parent(end.node).expect("end node in tree"),
                doc.next_sibling(end.node),
            )
        };

        let mut start_p = Some(start_parent);
        let mut start_c = start_child;
        while let Some(sp) = start_p {
            let mut end_p = Some(end_parent);
            let mut end_c = end_child;
            while let Some(ep) = end_p {
                if sp == ep {
                    return RangeDetail {
                        start_parent,
                        start_child,
                        end_parent,
                        end_child,
                        common_ancestor: sp,
                        start_ancestor: start_c,
                        end_ancestor: end_c,
                    };
                }
                end_c = Some(ep);
                end_p = doc.parent(ep);
            }
            start_c = Some(sp);
            start_p = doc.parent(sp);
        }
        panic!("start and end of range have no common ancestor");
    }

    /// The single node a collapsed range refers to.
    pub fn single_node(&self, doc: &Document) -> NodeId {
        position::closest_actual_node(doc, self.start, true)
    }

    /// Does the range contain anything beyond collapsible whitespace?
    pub fn has_content(&self, doc: &Document) -> bool {
        for node in self.outermost_nodes(doc) {
            if let Some(value) = doc.node(node).text_value() {
                let chars: Vec<char> = value.chars().collect();
                let start = if node == self.start.node {
                    self.start.offset
                } else {
                    0
                };
                let end = if node == self.end.node {
                    self.end.offset
                } else {
                    chars.len()
                };
                let slice: String = chars[start.min(chars.len())..end.min(chars.len())]
                    .iter()
                    .collect();
                if !is_whitespace_string(&slice) {
                    return true;
                }
            } else if doc.node(node).is_element() && doc.node_has_content(node) {
                return true;
            }
        }
        false
    }

    /// The minimal set of nodes whose descendants exactly cover the range.
    pub fn outermost_nodes(&self, doc: &Document) -> Vec<NodeId> {
        self.outermost_nodes_impl(doc, false)
    }

    /// As [`Range::outermost_nodes`], but a collapsed range yields its
    /// single adjacent node instead of nothing.
    pub fn outermost_nodes_at_least_one(&self, doc: &Document) -> Vec<NodeId> {
        self.outermost_nodes_impl(doc, true)
    }

    fn outermost_nodes_impl(&self, doc: &Document, at_least_one: bool) -> Vec<NodeId> {
        // The endpoints are *points*, always between nodes or characters.
        // Everything strictly between them is covered; the three phases
        // below collect (a) the tail of each ancestor level above the start,
        // (b) whole siblings between the two ancestor chains, and (c) the
        // head of each ancestor level above the end.
        let mut before_nodes: Vec<NodeId> = Vec::new();
        let mut middle_nodes: Vec<NodeId> = Vec::new();
        let mut after_nodes: Vec<NodeId> = Vec::new();

        if self.is_empty() {
            return if at_least_one {
                vec![self.single_node(doc)]
            } else {
                Vec::new()
            };
        }

        let detail = self.detail(doc);
        let common = detail.common_ancestor;

        // Start ancestor chain.
        let mut top_parent = detail.start_parent;
        let mut top_child = detail.start_child;
        while top_parent != common {
            if let Some(c) = top_child {
                before_nodes.push(c);
            }
            while (top_child.is_none()
                || doc.next_sibling(top_child.expect("checked")).is_none())
                && top_parent != common
            {
                top_child = Some(top_parent);
                top_parent = doc.parent(top_parent).expect("below common ancestor");
            }
            if top_parent != common {
                top_child = doc.next_sibling(top_child.expect("climbed"));
            }
        }

        // Middle siblings directly under the common ancestor.
        if detail.start_ancestor != detail.end_ancestor {
            let mut c = detail.start_ancestor;
            if c.is_some() && c != detail.start_child {
                c = c.and_then(|n| doc.next_sibling(n));
            }
            while c != detail.end_ancestor {
                let current = c.expect("end ancestor is a later sibling");
                middle_nodes.push(current);
                c = doc.next_sibling(current);
            }
        }

        // End ancestor chain.
        let prev_of = |parent: NodeId, child: Option<NodeId>| -> Option<NodeId> {
            match child {
                Some(c) => doc.prev_sibling(c),
                None => doc.last_child(parent),
            }
        };
        let mut bottom_parent = detail.end_parent;
        let mut bottom_child = detail.end_child;
        loop {
            while prev_of(bottom_parent, bottom_child).is_none() && bottom_parent != common {
                bottom_child = Some(bottom_parent);
                bottom_parent = doc.parent(bottom_parent).expect("below common ancestor");
            }
            if bottom_parent != common {
                bottom_child = prev_of(bottom_parent, bottom_child);
            }
            if bottom_parent == common {
                break;
            }
            after_nodes.push(bottom_child.expect("stepped to previous sibling"));
        }
        after_nodes.reverse();

        let mut result = before_nodes;
        result.extend(middle_nodes);
        result.extend(after_nodes);

        if result.is_empty() && at_least_one {
            result.push(self.single_node(doc));
        }
        result
    }

    /// Every node covered by the range: the outermost nodes plus all their
    /// descendants, in document order.
    pub fn all_nodes(&self, doc: &Document) -> Vec<NodeId> {
        let mut result = Vec::new();
        for outer in self.outermost_nodes_at_least_one(doc) {
            add_recursive(doc, outer, &mut result);
        }
        return result;

        fn add_recursive(doc: &Document, node: NodeId, result: &mut Vec<NodeId>) {
            result.push(node);
            let mut child = doc.first_child(node);
            while let Some(c) = child {
                add_recursive(doc, c, result);
                child = doc.next_sibling(c);
            }
        }
    }

    /// Plain-text rendering of the range, reinserting a newline at each
    /// paragraph-level boundary and collapsing interior whitespace.
    pub fn text_content(&self, doc: &Document) -> String {
        let range = self.forwards(doc);
        let start = range.start;
        let end = range.end;

        let (start_node, start_offset) = if doc.node(start.node).is_element() {
            match doc.child_at(start.node, start.offset) {
                Some(child) => (Some(child), 0),
                None => (doc.next_node_after(start.node), 0),
            }
        } else {
            (Some(start.node), start.offset)
        };
        let (end_node, end_offset) = if doc.node(end.node).is_element() {
            match doc.child_at(end.node, end.offset) {
                Some(child) => (Some(child), 0),
                None => (doc.next_node_after(end.node), 0),
            }
        } else {
            (Some(end.node), end.offset)
        };
        let (Some(start_node), Some(end_node)) = (start_node, end_node) else {
            return String::new();
        };

        let mut components: Vec<String> = Vec::new();
        let mut significant_paragraph = true;
        let mut node = start_node;
        loop {
            if let Some(value) = doc.node(node).text_value() {
                let chars: Vec<char> = value.chars().collect();
                if !significant_paragraph && !is_whitespace_string(value) {
                    significant_paragraph = true;
                    components.push("\n".to_string());
                }
                if significant_paragraph {
                    let lo = if node == start_node { start_offset } else { 0 };
                    let hi = if node == end_node {
                        end_offset
                    } else {
                        chars.len()
                    };
                    let slice: String =
                        chars[lo.min(chars.len())..hi.min(chars.len())].iter().collect();
                    components.push(collapse_whitespace(&slice));
                }
            }
            if node == end_node {
                break;
            }
            let mut entered_paragraph = false;
            let mut exited_paragraph = false;
            let next = doc.next_node_with(
                node,
                &mut |n| {
                    if doc.is_paragraph(n) {
                        entered_paragraph = true;
                    }
                },
                &mut |n| {
                    if doc.is_paragraph(n) {
                        exited_paragraph = true;
                    }
                },
            );
            if exited_paragraph {
                significant_paragraph = false;
            }
            if entered_paragraph {
                significant_paragraph = true;
                components.push("\n".to_string());
            }
            node = next.expect("end node not reached before document end");
        }
        components.concat()
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_ws {
                result.push(' ');
            }
            in_ws = true;
        } else {
            result.push(c);
            in_ws = false;
        }
    }
    result
}

/// Wrap any directly-placed inline content covered by the range in
/// paragraphs, keeping the range tracking the same logical span.
pub fn ensure_inline_nodes_in_paragraph(doc: &mut Document, range: &mut Range) {
    let nodes = range.all_nodes(doc);
    doc.track_range(range, |doc| {
        for node in nodes {
            hierarchy::ensure_inline_nodes_in_paragraph(doc, node, false);
        }
    });
}

/// Run full hierarchy repair over every node the range covers.
pub fn ensure_valid_hierarchy(doc: &mut Document, range: &mut Range) {
    let nodes = range.all_nodes(doc);
    doc.track_range(range, |doc| {
        for node in nodes.into_iter().rev() {
            hierarchy::ensure_valid_hierarchy(doc, node);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Tag;
    use crate::html::parse_document;
    use pretty_assertions::assert_eq;

    fn range_over(doc: &Document, start: (NodeId, usize), end: (NodeId, usize)) -> Range {
        Range::new(
            Position::new(start.0, start.1),
            Position::new(end.0, end.1),
        )
    }

    #[test]
    fn test_forwards_normalizes_reversed_range() {
        let doc = parse_document("<p>ab</p><p>cd</p>").unwrap();
        let ab = doc.find_text("ab").unwrap();
        let cd = doc.find_text("cd").unwrap();
        let backwards = range_over(&doc, (cd, 1), (ab, 1));
        let forwards = backwards.forwards(&doc);
        assert_eq!(forwards.start, Position::new(ab, 1));
        assert_eq!(forwards.end, Position::new(cd, 1));
    }

    #[test]
    fn test_expand_widens_to_block_boundaries() {
        let doc = parse_document("<p><b>bold</b></p>").unwrap();
        let text = doc.find_text("bold").unwrap();
        let mut range = range_over(&doc, (text, 0), (text, 4));
        range.expand(&doc);
        assert_eq!(range.start, Position::new(doc.body(), 0));
        assert_eq!(range.end, Position::new(doc.body(), 1));
    }

    #[test]
    fn test_outermost_single_text_selection() {
        let doc = parse_document("<p>hello</p>").unwrap();
        let text = doc.find_text("hello").unwrap();
        let range = range_over(&doc, (text, 1), (text, 4));
        assert_eq!(range.outermost_nodes(&doc), vec![text]);
    }

    #[test]
    fn test_outermost_spanning_paragraphs() {
        let doc = parse_document("<p>one</p><p>two</p><p>three</p>").unwrap();
        let one = doc.find_text("one").unwrap();
        let three = doc.find_text("three").unwrap();
        let paragraphs = doc.find_all(&Tag::P);
        let range = range_over(&doc, (one, 1), (three, 2));
        let outermost = range.outermost_nodes(&doc);
        // Partial start and end stay at the text level; the fully covered
        // middle paragraph is compressed to its root.
        assert_eq!(outermost, vec![one, paragraphs[1], three]);
    }

    #[test]
    fn test_outermost_nodes_compression_is_lossless() {
        let doc = parse_document(
            "<p>alpha <b>beta</b></p><ul><li><p>gamma</p></li></ul><p>delta</p>",
        )
        .unwrap();
        let alpha = doc.find_text("alpha").unwrap();
        let delta = doc.find_text("delta").unwrap();
        let range = range_over(&doc, (alpha, 2), (delta, 3));

        // The leaves a naive start-to-end document-order walk touches.
        let mut naive_leaves = Vec::new();
        let mut node = Some(alpha);
        while let Some(n) = node {
            if doc.first_child(n).is_none() {
                naive_leaves.push(n);
            }
            if n == delta {
                break;
            }
            node = doc.next_node(n);
        }

        // The compressed covered set yields exactly the same leaves.
        let covered_leaves: Vec<_> = range
            .all_nodes(&doc)
            .into_iter()
            .filter(|n| doc.first_child(*n).is_none())
            .collect();
        assert_eq!(covered_leaves, naive_leaves);

        // No outermost node is a descendant of another.
        let outermost = range.outermost_nodes(&doc);
        for a in &outermost {
            for b in &outermost {
                if a != b {
                    assert!(
                        !doc.ancestors(*a).contains(b),
                        "{a} is inside {b} in outermost set"
                    );
                }
            }
        }
    }

    #[test]
    fn test_empty_range_has_no_outermost_nodes() {
        let doc = parse_document("<p>x</p>").unwrap();
        let text = doc.find_text("x").unwrap();
        let range = Range::collapsed(Position::new(text, 0));
        assert!(range.outermost_nodes(&doc).is_empty());
        assert_eq!(range.outermost_nodes_at_least_one(&doc), vec![text]);
    }

    #[test]
    fn test_has_content_ignores_whitespace() {
        let doc = parse_document("<p>a   b</p>").unwrap();
        let text = doc.find_text("a").unwrap();
        assert!(!range_over(&doc, (text, 1), (text, 4)).has_content(&doc));
        assert!(range_over(&doc, (text, 1), (text, 5)).has_content(&doc));
    }

    #[test]
    fn test_text_content_inserts_paragraph_breaks() {
        let doc = parse_document("<p>first</p><p>second</p>").unwrap();
        let first = doc.find_text("first").unwrap();
        let second = doc.find_text("second").unwrap();
        let range = range_over(&doc, (first, 0), (second, 6));
        assert_eq!(range.text_content(&doc), "first\nsecond");
    }

    #[test]
    fn test_text_content_partial_nodes() {
        let doc = parse_document("<p>abcdef</p>").unwrap();
        let text = doc.find_text("abcdef").unwrap();
        let range = range_over(&doc, (text, 2), (text, 4));
        assert_eq!(range.text_content(&doc), "cd");
    }
}
