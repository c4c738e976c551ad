//! Tree mutation primitives.
//!
//! These are the only operations that change the document. Each one, before
//! mutating, records its inverse with the undo manager and adjusts every
//! tracked position anchored on the affected nodes so it keeps denoting the
//! same logical location. All higher-level code — hierarchy repair,
//! formatting, tables, cursor editing — is built from these.
//!
//! Offsets into text nodes count Unicode scalars, not bytes; the helpers at
//! the bottom convert to byte indices at the last moment.

use std::collections::BTreeMap;

use crate::dom::node::{NodeData, NodeId, Tag};
use crate::dom::undo::UndoOp;
use crate::dom::Document;

/// Which element types may be merged with an equal neighbour, and whether
/// any two paragraph-level nodes merge regardless of tag ("force").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MergeRules {
    pub inline: bool,
    pub block: bool,
    pub force_paragraph: bool,
}

/// Inline wrappers and text runs.
pub const MERGEABLE_INLINE: MergeRules = MergeRules {
    inline: true,
    block: false,
    force_paragraph: false,
};

/// Paragraph-level and list elements.
pub const MERGEABLE_BLOCK: MergeRules = MergeRules {
    inline: false,
    block: true,
    force_paragraph: false,
};

/// Both of the above, plus force-merging of paragraph nodes with different
/// tags (used when joining paragraphs across a deleted range).
pub const MERGEABLE_BLOCK_AND_INLINE: MergeRules = MergeRules {
    inline: true,
    block: true,
    force_paragraph: true,
};

impl MergeRules {
    pub fn allows(&self, tag: &Tag) -> bool {
        let inline = matches!(
            tag,
            Tag::Span
                | Tag::A
                | Tag::Q
                | Tag::Em
                | Tag::Strong
                | Tag::Dfn
                | Tag::Code
                | Tag::Samp
                | Tag::Kbd
                | Tag::Var
                | Tag::Cite
                | Tag::Abbr
                | Tag::Sub
                | Tag::Sup
                | Tag::I
                | Tag::B
                | Tag::Small
                | Tag::S
                | Tag::U
        );
        let block = matches!(
            tag,
            Tag::P
                | Tag::H1
                | Tag::H2
                | Tag::H3
                | Tag::H4
                | Tag::H5
                | Tag::H6
                | Tag::Div
                | Tag::Pre
                | Tag::Blockquote
                | Tag::Ul
                | Tag::Ol
                | Tag::Li
        );
        (self.inline && inline) || (self.block && block)
    }
}

impl Document {
    // ------------------------------------------------------------------
    // Node creation (no undo: a node only becomes undoable once attached)
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: Tag) -> NodeId {
        self.alloc(NodeData::Element {
            tag,
            attrs: BTreeMap::new(),
            style: BTreeMap::new(),
        })
    }

    pub fn create_element_named(&mut self, name: &str) -> NodeId {
        self.create_element(Tag::from_name(name))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text {
            value: text.to_string(),
        })
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment {
            value: text.to_string(),
        })
    }

    /// Copy a node (and optionally its subtree) into fresh ids. `strip_id`
    /// drops the `id` attribute on the copy, which callers use to avoid
    /// duplicating anchor targets.
    pub fn clone_subtree(&mut self, node: NodeId, deep: bool, strip_id: bool) -> NodeId {
        let data = self.node(node).data.clone();
        let copy = self.alloc(data);
        if strip_id {
            if let NodeData::Element { attrs, .. } = &mut self.node_mut(copy).data {
                attrs.remove("id");
            }
        }
        if deep {
            let children = self.children(node);
            for child in children {
                let child_copy = self.clone_subtree(child, true, false);
                self.attach(copy, child_copy, None);
            }
        }
        copy
    }

    /// Shallow element copy without the `id` attribute; the building block
    /// of ancestor-chain splitting.
    pub fn shallow_copy_element(&mut self, node: NodeId) -> NodeId {
        self.clone_subtree(node, false, true)
    }

    // ------------------------------------------------------------------
    // Internal primitives: record inverse, touch links, nothing else
    // ------------------------------------------------------------------

    fn insert_before_internal(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        if self.node(child).parent.is_none() {
            self.undo.record(UndoOp::DeleteNode { node: child });
        } else {
            let old_parent = self.node(child).parent.expect("checked above");
            let old_next = self.node(child).next_sibling;
            self.undo.record(UndoOp::InsertBefore {
                parent: old_parent,
                node: child,
                before: old_next,
            });
            self.detach(child);
        }
        self.attach(parent, child, before);
    }

    fn delete_node_internal(&mut self, node: NodeId) {
        let parent = self
            .node(node)
            .parent
            .unwrap_or_else(|| panic!("undo delete {node}: parent is null"));
        let next = self.node(node).next_sibling;
        self.undo.record(UndoOp::InsertBefore {
            parent,
            node,
            before: next,
        });
        self.detach(node);
    }

    fn append_child_internal(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before_internal(parent, child, None);
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent`, before `before` (or at the end). If the
    /// child is already in the tree it is moved, and positions tracking its
    /// old location follow it.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        let mut new_offset = match before {
            Some(b) => self.node_offset(b),
            None => self.child_count(parent),
        };

        let old_parent = self.node(child).parent;
        if let Some(old_parent) = old_parent {
            let old_offset = self.node_offset(child);
            if old_parent == parent && new_offset > old_offset {
                new_offset -= 1;
            }
            self.adjust_tracked(old_parent, |pos| {
                if pos.offset > old_offset {
                    pos.offset -= 1;
                } else if pos.offset == old_offset {
                    pos.node = parent;
                    pos.offset = new_offset;
                }
            });
        }

        self.insert_before_internal(parent, child, before);
        self.adjust_tracked(parent, |pos| {
            if pos.offset > new_offset {
                pos.offset += 1;
            }
        });
    }

    /// Remove a node and its subtree from the tree. Positions inside the
    /// subtree cascade up to `(parent, offsetOfDeletedNode)`; positions after
    /// it shift back. Deleting an already-detached node is a silent no-op.
    pub fn delete_node(&mut self, node: NodeId) {
        if self.node(node).parent.is_none() {
            return;
        }
        self.adjust_positions_for_delete(node);
        self.delete_node_internal(node);
    }

    fn adjust_positions_for_delete(&mut self, current: NodeId) {
        let children = self.children(current);
        for child in children {
            self.adjust_positions_for_delete(child);
        }
        let offset = self.node_offset(current);
        let parent = self.node(current).parent.expect("node attached");
        self.adjust_tracked(parent, |pos| {
            if offset < pos.offset {
                pos.offset -= 1;
            }
        });
        self.adjust_tracked(current, |pos| {
            pos.node = parent;
            pos.offset = offset;
        });
    }

    /// Unwrap: delete a node but splice its children into its place.
    pub fn remove_node_but_keep_children(&mut self, node: NodeId) {
        let parent = self
            .node(node)
            .parent
            .unwrap_or_else(|| panic!("node {node} has no parent"));
        let offset = self.node_offset(node);
        let child_count = self.child_count(node);

        self.adjust_tracked(parent, |pos| {
            if pos.offset > offset {
                pos.offset = pos.offset + child_count - 1;
            }
        });
        self.adjust_tracked(node, |pos| {
            pos.node = parent;
            pos.offset += offset;
        });

        let next = self.node(node).next_sibling;
        self.delete_node_internal(node);
        let children = self.children(node);
        for child in children {
            self.insert_before_internal(parent, child, next);
        }
    }

    /// Change an element's tag while preserving attributes, children and
    /// tracked positions. Composite of delete + insert + children-move, but
    /// the deletion happens first so no two nodes with the same logical role
    /// (e.g. the same `id`) are ever attached simultaneously.
    pub fn replace_element(&mut self, old: NodeId, tag: Tag) -> NodeId {
        let new = self.create_element(tag);
        let attrs: Vec<(String, String)> = self
            .node(old)
            .attributes()
            .map(|a| a.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        for (name, value) in attrs {
            self.set_attribute(new, &name, Some(&value));
        }
        let style: BTreeMap<String, Option<String>> = self
            .node(old)
            .style()
            .map(|s| s.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect())
            .unwrap_or_default();
        if !style.is_empty() {
            self.set_style_properties(new, &style);
        }

        self.retarget_tracked(old, new);

        let parent = self.node(old).parent.expect("replace of detached element");
        let next = self.node(old).next_sibling;
        let children = self.children(old);
        for child in children {
            self.append_child_internal(new, child);
        }
        self.delete_node_internal(old);
        self.insert_before_internal(parent, new, next);
        new
    }

    pub fn delete_all_children(&mut self, parent: NodeId) {
        while let Some(child) = self.first_child(parent) {
            self.delete_node(child);
        }
    }

    // ------------------------------------------------------------------
    // Attributes and style
    // ------------------------------------------------------------------

    /// Set or (with `None`) remove an attribute, recording the previous
    /// value. The `style` attribute is managed through
    /// [`Document::set_style_properties`] and may not be set here.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: Option<&str>) {
        let name = name.to_ascii_lowercase();
        assert!(
            name != "style",
            "style must be modified via set_style_properties"
        );
        let old = self.node(node).attribute(&name).map(|s| s.to_string());
        self.undo.record(UndoOp::SetAttribute {
            node,
            name: name.clone(),
            value: old,
        });
        match &mut self.node_mut(node).data {
            NodeData::Element { attrs, .. } => match value {
                Some(v) => {
                    attrs.insert(name, v.to_string());
                }
                None => {
                    attrs.remove(&name);
                }
            },
            _ => panic!("set_attribute on non-element node {node}"),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.set_attribute(node, name, None);
    }

    /// Set (`Some`) or remove (`None`) individual style properties,
    /// recording the previous value of each touched key.
    pub fn set_style_properties(
        &mut self,
        node: NodeId,
        properties: &BTreeMap<String, Option<String>>,
    ) {
        if properties.is_empty() {
            return;
        }
        let old: BTreeMap<String, Option<String>> = {
            let style = self
                .node(node)
                .style()
                .unwrap_or_else(|| panic!("set_style_properties on non-element {node}"));
            properties
                .keys()
                .map(|k| (k.clone(), style.get(k).cloned()))
                .collect()
        };
        self.undo.record(UndoOp::SetStyleProperties {
            node,
            properties: old,
        });
        if let NodeData::Element { style, .. } = &mut self.node_mut(node).data {
            for (name, value) in properties {
                match value {
                    Some(v) => {
                        style.insert(name.clone(), v.clone());
                    }
                    None => {
                        style.remove(name);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Text mutation
    // ------------------------------------------------------------------

    pub fn insert_characters(&mut self, node: NodeId, offset: usize, text: &str) {
        let inserted = text.chars().count();
        {
            let value = self.text_value_of(node, "insert_characters");
            let len = value.chars().count();
            assert!(
                offset <= len,
                "insert_characters at {offset} beyond length {len}"
            );
        }
        self.adjust_tracked(node, |pos| {
            if pos.offset > offset {
                pos.offset += inserted;
            }
        });
        let byte = self.byte_at_char(node, offset);
        if let NodeData::Text { value } = &mut self.node_mut(node).data {
            value.insert_str(byte, text);
        }
        self.undo.record(UndoOp::DeleteCharacters {
            node,
            start: offset,
            end: offset + inserted,
        });
    }

    pub fn delete_characters(&mut self, node: NodeId, start: usize, end: usize) {
        {
            let value = self.text_value_of(node, "delete_characters");
            let len = value.chars().count();
            assert!(
                start <= end && end <= len,
                "delete_characters with invalid range {start}..{end} of {len}"
            );
        }
        let count = end - start;
        self.adjust_tracked(node, |pos| {
            if pos.offset > start && pos.offset < end {
                pos.offset = start;
            } else if pos.offset >= end {
                pos.offset -= count;
            }
        });
        let start_byte = self.byte_at_char(node, start);
        let end_byte = self.byte_at_char(node, end);
        let removed;
        if let NodeData::Text { value } = &mut self.node_mut(node).data {
            removed = value[start_byte..end_byte].to_string();
            value.replace_range(start_byte..end_byte, "");
        } else {
            unreachable!();
        }
        self.undo.record(UndoOp::InsertCharacters {
            node,
            offset: start,
            text: removed,
        });
    }

    /// Move a span of characters between two text nodes, carrying tracked
    /// positions inside the span with it. The exclusivity flags control
    /// whether positions exactly at the span boundaries travel or stay.
    pub fn move_characters(
        &mut self,
        src: NodeId,
        src_start: usize,
        src_end: usize,
        dest: NodeId,
        dest_offset: usize,
        exclude_start: bool,
        exclude_end: bool,
    ) {
        assert!(src != dest, "src and dest text nodes cannot be the same");
        {
            let src_len = self.text_value_of(src, "move_characters").chars().count();
            let dest_len = self.text_value_of(dest, "move_characters").chars().count();
            assert!(
                src_start <= src_end && src_end <= src_len,
                "invalid src range {src_start}..{src_end} of {src_len}"
            );
            assert!(
                dest_offset <= dest_len,
                "dest offset {dest_offset} beyond length {dest_len}"
            );
        }
        let length = src_end - src_start;

        self.undo.record(UndoOp::MoveCharacters {
            src: dest,
            src_start: dest_offset,
            src_end: dest_offset + length,
            dest: src,
            dest_offset: src_start,
            exclude_start,
            exclude_end,
        });

        self.adjust_tracked(dest, |pos| {
            let start_match = if exclude_start {
                pos.offset > dest_offset
            } else {
                pos.offset >= dest_offset
            };
            if start_match {
                pos.offset += length;
            }
        });
        self.adjust_tracked(src, |pos| {
            let start_match = if exclude_start {
                pos.offset > src_start
            } else {
                pos.offset >= src_start
            };
            let end_match = if exclude_end {
                pos.offset < src_end
            } else {
                pos.offset <= src_end
            };
            if start_match && end_match {
                pos.node = dest;
                pos.offset = dest_offset + (pos.offset - src_start);
            } else if pos.offset >= src_end {
                pos.offset -= length;
            }
        });

        let start_byte = self.byte_at_char(src, src_start);
        let end_byte = self.byte_at_char(src, src_end);
        let extract;
        if let NodeData::Text { value } = &mut self.node_mut(src).data {
            extract = value[start_byte..end_byte].to_string();
            value.replace_range(start_byte..end_byte, "");
        } else {
            unreachable!();
        }
        let dest_byte = self.byte_at_char(dest, dest_offset);
        if let NodeData::Text { value } = &mut self.node_mut(dest).data {
            value.insert_str(dest_byte, &extract);
        }
    }

    pub fn set_node_value(&mut self, node: NodeId, value: &str) {
        let old = self.text_value_of(node, "set_node_value").to_string();
        self.adjust_tracked(node, |pos| {
            pos.offset = 0;
        });
        self.undo.record(UndoOp::SetNodeValue { node, value: old });
        if let NodeData::Text { value: v } = &mut self.node_mut(node).data {
            *v = value.to_string();
        }
    }

    /// Replace a character range. Insertion happens before deletion so a
    /// tracked position at the start of the range ends up after the
    /// replacement (or stays put if it was exactly at `start`).
    pub fn replace_characters(&mut self, node: NodeId, start: usize, end: usize, text: &str) {
        let inserted = text.chars().count();
        self.insert_characters(node, start, text);
        self.delete_characters(node, start + inserted, end + inserted);
    }

    // ------------------------------------------------------------------
    // Wrapping and merging
    // ------------------------------------------------------------------

    pub fn wrap_node(&mut self, node: NodeId, tag: Tag) -> NodeId {
        self.wrap_siblings(node, node, tag)
    }

    /// Wrap the sibling run `first..=last` in a new element. Positions
    /// between the two are re-homed into the wrapper.
    pub fn wrap_siblings(&mut self, first: NodeId, last: NodeId, tag: Tag) -> NodeId {
        let parent = self.node(first).parent;
        assert_eq!(
            parent,
            self.node(last).parent,
            "first and last are not siblings"
        );
        let wrapper = self.create_element(tag);

        if let Some(parent) = parent {
            let first_offset = self.node_offset(first);
            let last_offset = self.node_offset(last);
            let node_count = last_offset - first_offset + 1;
            self.adjust_tracked(parent, |pos| {
                if pos.offset >= first_offset && pos.offset <= last_offset + 1 {
                    pos.node = wrapper;
                    pos.offset -= first_offset;
                } else if pos.offset > last_offset + 1 {
                    pos.offset -= node_count - 1;
                }
            });
            self.insert_before_internal(parent, wrapper, Some(first));
        }

        let mut current = first;
        loop {
            let next = self.node(current).next_sibling;
            self.append_child_internal(wrapper, current);
            if current == last {
                break;
            }
            current = next.expect("ran past last sibling while wrapping");
        }
        wrapper
    }

    /// Can `a` and `b` be merged into one node under the given rules? Text
    /// pairs always can; element pairs need identical tags, attributes and
    /// styles (or the force-paragraph rule).
    pub fn nodes_mergeable(&self, a: NodeId, b: NodeId, rules: &MergeRules) -> bool {
        let (na, nb) = (self.node(a), self.node(b));
        match (&na.data, &nb.data) {
            (NodeData::Text { .. }, NodeData::Text { .. }) => true,
            (
                NodeData::Element {
                    tag: tag_a,
                    attrs: attrs_a,
                    style: style_a,
                },
                NodeData::Element {
                    tag: tag_b,
                    attrs: attrs_b,
                    style: style_b,
                },
            ) => {
                if rules.force_paragraph && self.is_paragraph(a) && self.is_paragraph(b) {
                    return true;
                }
                tag_a == tag_b
                    && rules.allows(tag_a)
                    && attrs_a == attrs_b
                    && style_a == style_b
            }
            _ => false,
        }
    }

    /// Merge `node` with its next sibling if the rules permit, recursing
    /// into the seam so nested wrappers collapse too.
    pub fn merge_with_next_sibling(&mut self, node: NodeId, rules: &MergeRules) {
        let Some(next) = self.node(node).next_sibling else {
            return;
        };
        if !self.nodes_mergeable(node, next, rules) {
            return;
        }

        let current_length = self.max_offset(node);
        let parent = self.node(node).parent.expect("merging detached node");
        let next_offset = self.node_offset(next);

        let mut seam_child = None;

        if self.node(node).is_element() {
            seam_child = self.last_child(node);
            self.insert_before(node, next, None);
            self.remove_node_but_keep_children(next);
        } else {
            let next_value = self
                .node(next)
                .text_value()
                .expect("text node expected")
                .to_string();
            let own_len = self.max_offset(node);
            self.insert_characters(node, own_len, &next_value);

            self.adjust_tracked(next, |pos| {
                pos.node = node;
                pos.offset += current_length;
            });
            self.adjust_tracked(parent, |pos| {
                if pos.offset == next_offset {
                    pos.node = node;
                    pos.offset = current_length;
                }
            });
            self.delete_node(next);
        }

        if let Some(seam) = seam_child {
            self.merge_with_next_sibling(seam, rules);
        }
    }

    /// Delete any whitespace-only text siblings on either side of a node.
    pub fn remove_adjacent_whitespace(&mut self, node: NodeId) {
        while let Some(prev) = self.node(node).prev_sibling {
            if !self.is_whitespace_text_node(prev) {
                break;
            }
            self.delete_node(prev);
        }
        while let Some(next) = self.node(node).next_sibling {
            if !self.is_whitespace_text_node(next) {
                break;
            }
            self.delete_node(next);
        }
    }

    /// Rename any elements carrying a duplicate `id` so ids are unique again
    /// (pasted fragments routinely collide with existing anchors).
    pub fn ensure_unique_ids(&mut self) {
        let mut seen: std::collections::HashSet<String> = Default::default();
        let mut duplicates: Vec<NodeId> = Vec::new();

        let mut current = Some(self.root());
        while let Some(node) = current {
            if let Some(id_attr) = self.node(node).attribute("id") {
                if !id_attr.is_empty() {
                    if seen.contains(id_attr) {
                        duplicates.push(node);
                    } else {
                        seen.insert(id_attr.to_string());
                    }
                }
            }
            current = self.next_node(node);
        }

        let mut next_number: std::collections::HashMap<String, usize> = Default::default();
        for node in duplicates {
            let id_attr = self.node(node).attribute("id").expect("checked").to_string();
            let prefix: String = id_attr.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();
            let mut num = *next_number.get(&prefix).unwrap_or(&1);
            let candidate = loop {
                let candidate = format!("{prefix}{num}");
                num += 1;
                if !seen.contains(&candidate) {
                    break candidate;
                }
            };
            self.set_attribute(node, "id", Some(&candidate));
            seen.insert(candidate);
            next_number.insert(prefix, num);
        }
    }

    // ------------------------------------------------------------------
    // char/byte helpers
    // ------------------------------------------------------------------

    fn text_value_of(&self, node: NodeId, op: &str) -> &str {
        self.node(node)
            .text_value()
            .unwrap_or_else(|| panic!("{op} called on non-text node {node}"))
    }

    fn byte_at_char(&self, node: NodeId, char_index: usize) -> usize {
        let value = self.text_value_of(node, "byte_at_char");
        value
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use pretty_assertions::assert_eq;

    fn doc_with_text(text: &str) -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let t = doc.create_text(text);
        doc.append_child(p, t);
        doc.append_child(doc.body(), p);
        (doc, p, t)
    }

    #[test]
    fn test_insert_characters_shifts_following_positions() {
        let (mut doc, _p, t) = doc_with_text("hello");
        let mut positions = [
            Position::new(t, 0),
            Position::new(t, 2),
            Position::new(t, 5),
        ];
        doc.track_positions(&mut positions, |doc| {
            doc.insert_characters(t, 2, "XY");
        });
        // Positions at or before the insert point stay; later ones shift.
        assert_eq!(positions[0], Position::new(t, 0));
        assert_eq!(positions[1], Position::new(t, 2));
        assert_eq!(positions[2], Position::new(t, 7));
    }

    #[test]
    fn test_delete_characters_collapses_interior_positions() {
        let (mut doc, _p, t) = doc_with_text("abcdefgh");
        let mut positions = [
            Position::new(t, 1),
            Position::new(t, 4),
            Position::new(t, 8),
        ];
        doc.track_positions(&mut positions, |doc| {
            doc.delete_characters(t, 2, 6);
        });
        assert_eq!(doc.node_text(t), "abgh");
        assert_eq!(positions[0], Position::new(t, 1));
        assert_eq!(positions[1], Position::new(t, 2));
        assert_eq!(positions[2], Position::new(t, 4));
    }

    #[test]
    fn test_delete_node_reanchors_interior_positions() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let before = doc.create_text("before");
        let span = doc.create_element(Tag::Span);
        let inner = doc.create_text("inner");
        let after = doc.create_text("after");
        doc.append_child(p, before);
        doc.append_child(p, span);
        doc.append_child(span, inner);
        doc.append_child(p, after);
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(inner, 3), Position::new(p, 3)];
        doc.track_positions(&mut positions, |doc| {
            doc.delete_node(span);
        });
        // Inside the deleted subtree: collapses to the deletion point.
        assert_eq!(positions[0], Position::new(p, 1));
        // After the deleted node: shifts back by one.
        assert_eq!(positions[1], Position::new(p, 2));
    }

    #[test]
    fn test_delete_detached_node_is_noop() {
        let mut doc = Document::new();
        let orphan = doc.create_element(Tag::Span);
        doc.delete_node(orphan); // must not panic
    }

    #[test]
    fn test_remove_node_but_keep_children() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let b = doc.create_element(Tag::B);
        let t1 = doc.create_text("one");
        let t2 = doc.create_text("two");
        doc.append_child(b, t1);
        doc.append_child(b, t2);
        doc.append_child(p, b);
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(b, 1)];
        doc.track_positions(&mut positions, |doc| {
            doc.remove_node_but_keep_children(b);
        });
        assert_eq!(doc.children(p), vec![t1, t2]);
        assert_eq!(positions[0], Position::new(p, 1));
    }

    #[test]
    fn test_replace_element_preserves_children_attrs_positions() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        doc.set_attribute(p, "class", Some("fancy"));
        let t = doc.create_text("heading");
        doc.append_child(p, t);
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(p, 1)];
        let h2 = doc.track_positions(&mut positions, |doc| doc.replace_element(p, Tag::H2));

        assert_eq!(doc.node(h2).tag(), Some(&Tag::H2));
        assert_eq!(doc.node(h2).attribute("class"), Some("fancy"));
        assert_eq!(doc.children(h2), vec![t]);
        assert_eq!(positions[0], Position::new(h2, 1));
        assert!(doc.node(p).parent.is_none());
    }

    #[test]
    fn test_move_characters_carries_positions() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let src = doc.create_text("abcdef");
        let dest = doc.create_text("XY");
        doc.append_child(p, src);
        doc.append_child(p, dest);
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(src, 3), Position::new(src, 6)];
        doc.track_positions(&mut positions, |doc| {
            doc.move_characters(src, 2, 5, dest, 1, false, true);
        });
        assert_eq!(doc.node_text(src), "abf");
        assert_eq!(doc.node_text(dest), "XcdeY");
        // Offset 3 was inside [2,5): moves to dest.
        assert_eq!(positions[0], Position::new(dest, 2));
        // Offset 6 was past the span: shifts back by its length.
        assert_eq!(positions[1], Position::new(src, 3));
    }

    #[test]
    fn test_replace_characters_position_lands_after_replacement() {
        let (mut doc, _p, t) = doc_with_text("aXXb");
        let mut positions = [Position::new(t, 3)];
        doc.track_positions(&mut positions, |doc| {
            doc.replace_characters(t, 1, 3, "yyy");
        });
        assert_eq!(doc.node_text(t), "ayyyb");
        assert_eq!(positions[0], Position::new(t, 4));
    }

    #[test]
    fn test_wrap_siblings_rehomes_positions() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        for t in [a, b, c] {
            doc.append_child(p, t);
        }
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(p, 1), Position::new(p, 3)];
        let wrapper =
            doc.track_positions(&mut positions, |doc| doc.wrap_siblings(a, b, Tag::Span));
        assert_eq!(doc.children(p), vec![wrapper, c]);
        assert_eq!(doc.children(wrapper), vec![a, b]);
        assert_eq!(positions[0], Position::new(wrapper, 1));
        // Position after the wrapped run shifts back by count-1.
        assert_eq!(positions[1], Position::new(p, 2));
    }

    #[test]
    fn test_merge_text_nodes() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let a = doc.create_text("foo");
        let b = doc.create_text("bar");
        doc.append_child(p, a);
        doc.append_child(p, b);
        doc.append_child(doc.body(), p);

        let mut positions = [Position::new(b, 2)];
        doc.track_positions(&mut positions, |doc| {
            doc.merge_with_next_sibling(a, &MERGEABLE_INLINE);
        });
        assert_eq!(doc.node_text(a), "foobar");
        assert_eq!(doc.children(p), vec![a]);
        assert_eq!(positions[0], Position::new(a, 5));
    }

    #[test]
    fn test_merge_elements_requires_equal_attributes() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        let b1 = doc.create_element(Tag::B);
        let b2 = doc.create_element(Tag::B);
        let t1 = doc.create_text("x");
        let t2 = doc.create_text("y");
        doc.append_child(b1, t1);
        doc.append_child(b2, t2);
        doc.append_child(p, b1);
        doc.append_child(p, b2);
        doc.append_child(doc.body(), p);

        assert!(doc.nodes_mergeable(b1, b2, &MERGEABLE_INLINE));
        doc.set_attribute(b2, "class", Some("different"));
        assert!(!doc.nodes_mergeable(b1, b2, &MERGEABLE_INLINE));
        doc.remove_attribute(b2, "class");

        doc.merge_with_next_sibling(b1, &MERGEABLE_INLINE);
        assert_eq!(doc.children(p), vec![b1]);
        // The text seam inside the merged wrapper collapses too.
        assert_eq!(doc.children(b1), vec![t1]);
        assert_eq!(doc.node_text(b1), "xy");
    }

    #[test]
    fn test_ensure_unique_ids_renames_duplicates() {
        let mut doc = Document::new();
        let a = doc.create_element(Tag::P);
        let b = doc.create_element(Tag::P);
        doc.append_child(doc.body(), a);
        doc.append_child(doc.body(), b);
        doc.set_attribute(a, "id", Some("item1"));
        doc.set_attribute(b, "id", Some("item1"));

        doc.ensure_unique_ids();
        let id_a = doc.node(a).attribute("id").unwrap();
        let id_b = doc.node(b).attribute("id").unwrap();
        assert_eq!(id_a, "item1");
        assert_ne!(id_a, id_b);
        assert!(id_b.starts_with("item"));
    }

    #[test]
    #[should_panic(expected = "non-text node")]
    fn test_text_op_on_element_is_fatal() {
        let mut doc = Document::new();
        let p = doc.create_element(Tag::P);
        doc.append_child(doc.body(), p);
        doc.insert_characters(p, 0, "nope");
    }
}
