//! The document arena.
//!
//! A [`Document`] owns every node it has ever created, keyed by [`NodeId`].
//! Deleting a node detaches it from the tree but leaves it in the arena so
//! that the undo log can re-attach the identical node later; ids are never
//! reused. The document also owns the tracked-position registry, the undo
//! manager and the current selection, so independent documents can coexist
//! (there is no global state anywhere in the crate).

use std::collections::HashMap;

use crate::dom::node::{is_whitespace_string, Node, NodeData, NodeId, NodeKind, Tag};
use crate::dom::undo::UndoManager;
use crate::position::Position;
use crate::range::Range;

/// Handle for a position registered with [`Document::track`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PositionHandle(usize);

pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    root: NodeId,
    body: NodeId,
    /// Slab of live tracked positions. The live set is small (selection ends
    /// plus whatever a compound operation tracks), so mutations scan it
    /// linearly instead of maintaining a per-node index.
    tracked: Vec<Option<Position>>,
    free_slots: Vec<usize>,
    pub(crate) undo: UndoManager,
    selection: Option<Range>,
}

impl Document {
    /// Create a document containing an empty `<html><body></body></html>`
    /// skeleton.
    pub fn new() -> Document {
        let mut doc = Document {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
            body: NodeId(0),
            tracked: Vec::new(),
            free_slots: Vec::new(),
            undo: UndoManager::new(),
            selection: None,
        };
        let root = doc.alloc(NodeData::Element {
            tag: Tag::Html,
            attrs: Default::default(),
            style: Default::default(),
        });
        let body = doc.alloc(NodeData::Element {
            tag: Tag::Body,
            attrs: Default::default(),
            style: Default::default(),
        });
        doc.root = root;
        doc.body = body;
        doc.attach(root, body, None);
        doc
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, data));
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Immutable access to a node. Looking up an id this document never
    /// issued is a programming error and panics.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("node {id} does not belong to this document"))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("node {id} does not belong to this document"))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut child = self.first_child(id);
        while let Some(c) = child {
            result.push(c);
            child = self.next_sibling(c);
        }
        result
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut child = self.first_child(id);
        while let Some(c) = child {
            count += 1;
            child = self.next_sibling(c);
        }
        count
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        let mut child = self.first_child(id);
        for _ in 0..index {
            child = child.and_then(|c| self.next_sibling(c));
        }
        child
    }

    /// Index of `id` among its parent's children. Panics if detached.
    pub fn node_offset(&self, id: NodeId) -> usize {
        let parent = self
            .parent(id)
            .unwrap_or_else(|| panic!("node {id} has no parent"));
        let mut offset = 0;
        let mut child = self.first_child(parent);
        while let Some(c) = child {
            if c == id {
                return offset;
            }
            offset += 1;
            child = self.next_sibling(c);
        }
        panic!("node {id} not found among parent's children");
    }

    /// Maximum position offset within a node: character count for text
    /// nodes, child count for elements.
    pub fn max_offset(&self, id: NodeId) -> usize {
        match &self.node(id).data {
            NodeData::Element { .. } => self.child_count(id),
            NodeData::Text { value } => value.chars().count(),
            NodeData::Comment { .. } => panic!("max_offset on comment node {id}"),
        }
    }

    /// Is the node currently attached beneath the document root?
    pub fn in_tree(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(c) = current {
            result.push(c);
            current = self.parent(c);
        }
        result
    }

    /// Next node in document order, or `None` at the end.
    pub fn next_node(&self, id: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(id) {
            return Some(child);
        }
        self.next_node_after(id)
    }

    /// Next node in document order, skipping the subtree of `id`.
    pub fn next_node_after(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
    }

    /// Previous node in document order.
    pub fn prev_node(&self, id: NodeId) -> Option<NodeId> {
        if let Some(prev) = self.prev_sibling(id) {
            let mut current = prev;
            while let Some(last) = self.last_child(current) {
                current = last;
            }
            return Some(current);
        }
        self.parent(id)
    }

    /// Document-order walk with paragraph-level enter/exit notifications,
    /// used by plain-text extraction to reinsert paragraph breaks.
    pub(crate) fn next_node_with(
        &self,
        id: NodeId,
        entering: &mut dyn FnMut(NodeId),
        exiting: &mut dyn FnMut(NodeId),
    ) -> Option<NodeId> {
        if let Some(child) = self.first_child(id) {
            entering(child);
            return Some(child);
        }
        let mut current = id;
        loop {
            exiting(current);
            if let Some(sibling) = self.next_sibling(current) {
                entering(sibling);
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
    }

    pub fn first_descendant(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(child) = self.first_child(current) {
            current = child;
        }
        current
    }

    pub fn last_descendant(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(child) = self.last_child(current) {
            current = child;
        }
        current
    }

    // ------------------------------------------------------------------
    // Classification helpers
    // ------------------------------------------------------------------

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind()
    }

    pub fn is_container(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Container
    }

    pub fn is_paragraph(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Paragraph
    }

    pub fn is_inline(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Inline
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        !self.is_inline(id)
    }

    pub fn is_heading(&self, id: NodeId) -> bool {
        self.node(id).tag().is_some_and(|t| t.is_heading())
    }

    pub fn is_table_cell(&self, id: NodeId) -> bool {
        self.node(id).tag().is_some_and(|t| t.is_table_cell())
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        self.node(id).tag().is_some_and(|t| t.is_list())
    }

    pub fn has_tag(&self, id: NodeId, tag: &Tag) -> bool {
        self.node(id).tag() == Some(tag)
    }

    /// Footnote/endnote marker: a span carrying the `footnote` or `endnote`
    /// class. Opaque from the cursor's perspective.
    pub fn is_note_node(&self, id: NodeId) -> bool {
        self.has_tag(id, &Tag::Span)
            && matches!(
                self.node(id).attribute("class"),
                Some("footnote") | Some("endnote")
            )
    }

    pub fn is_empty_note_node(&self, id: NodeId) -> bool {
        self.is_note_node(id) && !self.node_has_content(id)
    }

    /// Generated item-number spans (heading/figure/table numbers), which the
    /// cursor must treat as single units.
    pub fn is_item_number(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match &node.data {
            NodeData::Text { .. } => match self.parent(id) {
                Some(p) => self.is_item_number(p),
                None => false,
            },
            NodeData::Element { tag: Tag::Span, .. } => matches!(
                node.attribute("class"),
                Some("prose-heading-number")
                    | Some("prose-figure-number")
                    | Some("prose-table-number")
            ),
            _ => false,
        }
    }

    fn is_toc_node(&self, id: NodeId) -> bool {
        self.has_tag(id, &Tag::Nav)
            && matches!(
                self.node(id).attribute("class"),
                Some("tableofcontents") | Some("listoffigures") | Some("listoftables")
            )
    }

    /// Atomic block-level units the cursor never enters mid-content.
    pub fn is_special_block(&self, id: NodeId) -> bool {
        match self.node(id).tag() {
            Some(Tag::Table) | Some(Tag::Figure) => true,
            Some(Tag::Nav) => self.is_toc_node(id),
            _ => false,
        }
    }

    /// Atomic leaf-like nodes whose interior is not addressable: images,
    /// hyperlinks, generated numbers, TOCs and selection fields. Opacity is
    /// inherited from ancestors.
    pub fn is_opaque_node(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match &node.data {
            NodeData::Text { .. } | NodeData::Comment { .. } => match self.parent(id) {
                Some(p) => self.is_opaque_node(p),
                None => false,
            },
            NodeData::Element { tag, .. } => match tag {
                Tag::Img => true,
                Tag::A => node.attribute("href").is_some(),
                Tag::Html => false,
                _ => {
                    let opaque_class = matches!(
                        node.attribute("class"),
                        Some("prose-heading-number")
                            | Some("prose-figure-number")
                            | Some("prose-table-number")
                            | Some("tableofcontents")
                            | Some("listoffigures")
                            | Some("listoftables")
                            | Some("prose-field")
                    );
                    if opaque_class {
                        true
                    } else {
                        match self.parent(id) {
                            Some(p) => self.is_opaque_node(p),
                            None => false,
                        }
                    }
                }
            },
        }
    }

    pub fn is_whitespace_text_node(&self, id: NodeId) -> bool {
        match self.node(id).text_value() {
            Some(value) => is_whitespace_string(value),
            None => false,
        }
    }

    pub fn is_non_whitespace_text_node(&self, id: NodeId) -> bool {
        match self.node(id).text_value() {
            Some(value) => !is_whitespace_string(value),
            None => false,
        }
    }

    /// Whether a subtree holds user-visible content. Images and tables
    /// always count; text counts unless it is collapsible whitespace.
    pub fn node_has_content(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match &node.data {
            NodeData::Text { value } => !is_whitespace_string(value),
            NodeData::Comment { .. } => false,
            NodeData::Element { tag, .. } => match tag {
                Tag::Img | Tag::Table => true,
                _ => {
                    let mut child = self.first_child(id);
                    while let Some(c) = child {
                        if self.node_has_content(c) {
                            return true;
                        }
                        child = self.next_sibling(c);
                    }
                    false
                }
            },
        }
    }

    /// Concatenated text of a subtree.
    pub fn node_text(&self, id: NodeId) -> String {
        let mut result = String::new();
        self.collect_text(id, &mut result);
        result
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text { value } => out.push_str(value),
            NodeData::Comment { .. } => {}
            NodeData::Element { .. } => {
                let mut child = self.first_child(id);
                while let Some(c) = child {
                    self.collect_text(c, out);
                    child = self.next_sibling(c);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Raw link surgery (no undo, no position adjustment)
    // ------------------------------------------------------------------

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        debug_assert!(self.node(child).parent.is_none(), "attach of attached node");
        let prev = match before {
            Some(b) => {
                debug_assert_eq!(self.node(b).parent, Some(parent));
                self.node(b).prev_sibling
            }
            None => self.node(parent).last_child,
        };
        {
            let c = self.node_mut(child);
            c.parent = Some(parent);
            c.prev_sibling = prev;
            c.next_sibling = before;
        }
        match prev {
            Some(p) => self.node_mut(p).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        match before {
            Some(b) => self.node_mut(b).prev_sibling = Some(child),
            None => self.node_mut(parent).last_child = Some(child),
        }
    }

    pub(crate) fn detach(&mut self, child: NodeId) {
        let (parent, prev, next) = {
            let n = self.node(child);
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        let parent = parent.expect("detach of detached node");
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let c = self.node_mut(child);
        c.parent = None;
        c.prev_sibling = None;
        c.next_sibling = None;
    }

    // ------------------------------------------------------------------
    // Tracked positions
    // ------------------------------------------------------------------

    /// Register a position for live adjustment across mutations. Must be
    /// balanced with [`Document::untrack`].
    pub fn track(&mut self, pos: Position) -> PositionHandle {
        match self.free_slots.pop() {
            Some(slot) => {
                self.tracked[slot] = Some(pos);
                PositionHandle(slot)
            }
            None => {
                self.tracked.push(Some(pos));
                PositionHandle(self.tracked.len() - 1)
            }
        }
    }

    /// Deregister a tracked position, returning its current value.
    pub fn untrack(&mut self, handle: PositionHandle) -> Position {
        let pos = self.tracked[handle.0]
            .take()
            .expect("untrack of unregistered position");
        self.free_slots.push(handle.0);
        pos
    }

    /// Current value of a tracked position without deregistering it.
    pub fn tracked_position(&self, handle: PositionHandle) -> Position {
        self.tracked[handle.0].expect("read of unregistered position")
    }

    /// Apply `adjust` to every tracked position currently anchored on
    /// `node`. Used by the mutation primitives.
    pub(crate) fn adjust_tracked(&mut self, node: NodeId, mut adjust: impl FnMut(&mut Position)) {
        for slot in self.tracked.iter_mut() {
            if let Some(pos) = slot {
                if pos.node == node {
                    adjust(pos);
                }
            }
        }
    }

    /// Move all tracked positions anchored on `from` to `to`, keeping
    /// offsets. Used by element replacement.
    pub(crate) fn retarget_tracked(&mut self, from: NodeId, to: NodeId) {
        for slot in self.tracked.iter_mut() {
            if let Some(pos) = slot {
                if pos.node == from {
                    pos.node = to;
                }
            }
        }
    }

    /// Run `f` with the given positions registered for live adjustment, then
    /// write the (possibly moved) values back into the slice. This is the
    /// scoped-acquisition discipline every compound operation uses: no
    /// intermediate state escapes, only the final positions do.
    pub fn track_positions<R>(
        &mut self,
        positions: &mut [Position],
        f: impl FnOnce(&mut Document) -> R,
    ) -> R {
        let handles: Vec<PositionHandle> = positions.iter().map(|p| self.track(*p)).collect();
        let result = f(self);
        for (pos, handle) in positions.iter_mut().zip(handles) {
            *pos = self.untrack(handle);
        }
        result
    }

    /// [`Document::track_positions`] for both ends of a range.
    pub fn track_range<R>(
        &mut self,
        range: &mut Range,
        f: impl FnOnce(&mut Document) -> R,
    ) -> R {
        let mut ends = [range.start, range.end];
        let result = self.track_positions(&mut ends, f);
        range.start = ends[0];
        range.end = ends[1];
        result
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn selection(&self) -> Option<Range> {
        self.selection
    }

    pub fn set_selection(&mut self, range: Range) {
        self.selection = Some(range);
    }

    pub fn set_cursor(&mut self, pos: Position) {
        self.selection = Some(Range::collapsed(pos));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Track the current selection across `f` so it still denotes the same
    /// logical span afterwards.
    pub fn preserve_selection_while<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        match self.selection {
            Some(mut range) => {
                let result = self.track_range(&mut range, f);
                self.selection = Some(range);
                result
            }
            None => f(self),
        }
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    pub fn get_element_by_id(&self, id_attr: &str) -> Option<NodeId> {
        let mut current = Some(self.root);
        while let Some(node) = current {
            if self.node(node).attribute("id") == Some(id_attr) {
                return Some(node);
            }
            current = self.next_node(node);
        }
        None
    }

    /// First element with the given tag in document order. Test convenience.
    pub fn find_first(&self, tag: &Tag) -> Option<NodeId> {
        let mut current = Some(self.root);
        while let Some(node) = current {
            if self.has_tag(node, tag) {
                return Some(node);
            }
            current = self.next_node(node);
        }
        None
    }

    /// All elements with the given tag in document order.
    pub fn find_all(&self, tag: &Tag) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = Some(self.root);
        while let Some(node) = current {
            if self.has_tag(node, tag) {
                result.push(node);
            }
            current = self.next_node(node);
        }
        result
    }

    /// First text node in document order whose value contains `needle`.
    pub fn find_text(&self, needle: &str) -> Option<NodeId> {
        let mut current = Some(self.root);
        while let Some(node) = current {
            if let Some(value) = self.node(node).text_value() {
                if value.contains(needle) {
                    return Some(node);
                }
            }
            current = self.next_node(node);
        }
        None
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}
