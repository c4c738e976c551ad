//! The formatting engine.
//!
//! Reading side: [`get_formatting`] computes the effective property set of
//! every leaf in the selection — inherited styles cascaded from the root,
//! with element-implied properties (`<b>`, `<i>`, `<u>`) folded in as
//! synthetic entries — and intersects them, so a property survives only when
//! the whole selection agrees on it.
//!
//! Writing side: [`apply_formatting_changes`] splits the document at the
//! selection boundaries, pushes inherited inline properties down onto the
//! covered nodes (so removing a wrapper later cannot lose formatting), strips
//! properties that are about to change, applies the requested ones via
//! wrapper elements and style entries, rewrites paragraph elements for
//! paragraph style selectors, and finally merges redundant neighbouring
//! wrappers back together.
//!
//! The split/move primitives at the top are shared with the hierarchy
//! normalizer and the cursor: they tear the tree at an arbitrary position by
//! shallow-copying each ancestor up to a stopping predicate and relocating
//! the leading or trailing siblings into the copy.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::cursor;
use crate::dom::{Document, MergeRules, NodeId, Tag, MERGEABLE_INLINE};
use crate::position::{self, Position};
use crate::range::{self, Range};

/// Synthetic property keys reported by [`get_formatting`].
pub const PARAGRAPH_STYLE_KEY: &str = "-prose-paragraph-style";
pub const NONE_STYLE: &str = "__none";
pub const IN_UL_KEY: &str = "-prose-in-ul";
pub const IN_OL_KEY: &str = "-prose-in-ol";
pub const IN_IMAGE_KEY: &str = "-prose-in-image";
pub const IN_FIGURE_KEY: &str = "-prose-in-figure";
pub const IN_TABLE_KEY: &str = "-prose-in-table";
pub const IN_LINK_KEY: &str = "-prose-in-link";
pub const IN_REFERENCE_KEY: &str = "-prose-in-reference";
pub const IN_TOC_KEY: &str = "-prose-in-toc";
pub const IN_ITEM_TITLE_KEY: &str = "-prose-in-item-title";
pub const SHIFT_KEY: &str = "-prose-shift";
pub const IN_BRACKETS_KEY: &str = "-prose-in-brackets";
pub const IN_QUOTES_KEY: &str = "-prose-in-quotes";

/// Requested property changes: `Some` sets a value, `None` clears it.
pub type PropertyChanges = BTreeMap<String, Option<String>>;
/// Concrete property values.
pub type Properties = BTreeMap<String, String>;

pub type NodePredicate<'a> = &'a dyn Fn(&Document, NodeId) -> bool;

pub fn is_block(doc: &Document, node: NodeId) -> bool {
    doc.is_block(node)
}

pub fn is_block_or_note(doc: &Document, node: NodeId) -> bool {
    doc.is_block(node) || doc.is_note_node(node)
}

// ----------------------------------------------------------------------
// Split / move primitives
// ----------------------------------------------------------------------

/// Split a text node before `pos.offset` and tear the ancestor chain so
/// everything preceding the position moves into shallow copies, up to the
/// first ancestor matching `parent_check`. Returns the end of the moved-out
/// text.
pub fn split_text_before(
    doc: &mut Document,
    pos: Position,
    parent_check: NodePredicate,
    force: bool,
) -> Position {
    let node = pos.node;
    let offset = pos.offset;

    if force || offset > 0 {
        let parent = doc.parent(node).expect("splitting attached text");
        let before = doc.create_text("");
        doc.insert_before(parent, before, Some(node));
        doc.move_characters(node, 0, offset, before, 0, false, true);
        move_preceding(
            doc,
            Position::new(parent, doc.node_offset(node)),
            parent_check,
            force,
        );
        Position::new(before, doc.max_offset(before))
    } else {
        let parent = doc.parent(node).expect("splitting attached text");
        move_preceding(
            doc,
            Position::new(parent, doc.node_offset(node)),
            parent_check,
            force,
        );
        pos
    }
}

/// Mirror image of [`split_text_before`]: everything following the position
/// moves into shallow copies. Returns the start of the moved-out text.
pub fn split_text_after(
    doc: &mut Document,
    pos: Position,
    parent_check: NodePredicate,
    force: bool,
) -> Position {
    let node = pos.node;
    let offset = pos.offset;

    if force || offset < doc.max_offset(node) {
        let parent = doc.parent(node).expect("splitting attached text");
        let after = doc.create_text("");
        let next = doc.next_sibling(node);
        doc.insert_before(parent, after, next);
        let len = doc.max_offset(node);
        doc.move_characters(node, offset, len, after, 0, true, false);
        move_following(
            doc,
            Position::new(parent, doc.node_offset(node) + 1),
            parent_check,
            force,
        );
        Position::new(after, 0)
    } else {
        let parent = doc.parent(node).expect("splitting attached text");
        move_following(
            doc,
            Position::new(parent, doc.node_offset(node) + 1),
            parent_check,
            force,
        );
        pos
    }
}

/// Move the children of `pos.node` before `pos.offset` into a shallow copy
/// of the node inserted before it, recursing outward until `parent_check`
/// accepts a node (or the body is reached). A run of pure whitespace is
/// hoisted rather than copied, unless `force` demands a split anyway.
pub fn move_preceding(
    doc: &mut Document,
    pos: Position,
    parent_check: NodePredicate,
    force: bool,
) -> Position {
    let node = pos.node;
    let offset = pos.offset;
    if parent_check(doc, node) || node == doc.body() {
        return pos;
    }

    let children = doc.children(node);
    let to_move: Vec<NodeId> = children[..offset.min(children.len())].to_vec();
    let just_whitespace = to_move.iter().all(|n| doc.is_whitespace_text_node(*n));
    let mut result = pos;

    if !to_move.is_empty() || force {
        let parent = doc.parent(node).expect("node below body");
        if just_whitespace && !force {
            for n in &to_move {
                doc.insert_before(parent, *n, Some(node));
            }
        } else {
            let copy = doc.shallow_copy_element(node);
            doc.insert_before(parent, copy, Some(node));
            for n in &to_move {
                doc.insert_before(copy, *n, None);
            }
            result = Position::new(copy, doc.child_count(copy));
        }
    }

    let parent = doc.parent(node).expect("node below body");
    move_preceding(
        doc,
        Position::new(parent, doc.node_offset(node)),
        parent_check,
        force,
    );
    result
}

/// Mirror image of [`move_preceding`] for the trailing siblings.
pub fn move_following(
    doc: &mut Document,
    pos: Position,
    parent_check: NodePredicate,
    force: bool,
) -> Position {
    let node = pos.node;
    let offset = pos.offset;
    if parent_check(doc, node) || node == doc.body() {
        return pos;
    }

    let children = doc.children(node);
    let to_move: Vec<NodeId> = children[offset.min(children.len())..].to_vec();
    let just_whitespace = to_move.iter().all(|n| doc.is_whitespace_text_node(*n));
    let mut result = pos;

    if !to_move.is_empty() || force {
        let parent = doc.parent(node).expect("node below body");
        if just_whitespace && !force {
            let next = doc.next_sibling(node);
            for n in &to_move {
                doc.insert_before(parent, *n, next);
            }
        } else {
            let copy = doc.shallow_copy_element(node);
            let next = doc.next_sibling(node);
            doc.insert_before(parent, copy, next);
            for n in &to_move {
                doc.insert_before(copy, *n, None);
            }
            result = Position::new(copy, 0);
        }
    }

    let parent = doc.parent(node).expect("node below body");
    move_following(
        doc,
        Position::new(parent, doc.node_offset(node) + 1),
        parent_check,
        force,
    );
    result
}

/// Split text and ancestor chains at both range boundaries so they align
/// exactly with node boundaries. The range keeps denoting the same content.
pub fn split_around_selection(doc: &mut Document, range: &mut Range, allow_direct_inline: bool) {
    if !allow_direct_inline {
        range::ensure_inline_nodes_in_paragraph(doc, range);
    }
    range::ensure_valid_hierarchy(doc, range);

    // Start boundary, with the range tracking the mutations.
    let start = range.start;
    doc.track_range(range, |doc| {
        if doc.node(start.node).is_text() && start.offset > 0 {
            split_text_before(doc, start, &is_block_or_note, false);
        } else if doc.node(start.node).is_element() {
            move_preceding(doc, start, &is_block_or_note, false);
        } else {
            let parent = doc.parent(start.node).expect("start in tree");
            move_preceding(
                doc,
                Position::new(parent, doc.node_offset(start.node)),
                &is_block_or_note,
                false,
            );
        }
    });

    // End boundary. Deliberately *not* tracked: moving the following
    // content into a copy would drag the end position with it, which is
    // exactly what we don't want here — the range must keep ending at the
    // split point.
    let end = range.end;
    if doc.node(end.node).is_text() && end.offset < doc.max_offset(end.node) {
        split_text_after(doc, end, &is_block_or_note, false);
    } else if doc.node(end.node).is_element() {
        move_following(doc, end, &is_block_or_note, false);
    } else {
        let parent = doc.parent(end.node).expect("end in tree");
        move_following(
            doc,
            Position::new(parent, doc.node_offset(end.node) + 1),
            &is_block_or_note,
            false,
        );
    }
}

// ----------------------------------------------------------------------
// Merging
// ----------------------------------------------------------------------

fn is_discardable(doc: &Document, node: NodeId) -> bool {
    if !doc.node(node).is_element() {
        return false;
    }
    if !doc.is_inline(node) || doc.is_opaque_node(node) {
        return false;
    }
    let mut child = doc.first_child(node);
    while let Some(c) = child {
        if !is_discardable(doc, c) {
            return false;
        }
        child = doc.next_sibling(c);
    }
    true
}

/// Merge `node` with as many mergeable siblings on both sides as possible,
/// optionally discarding empty inline debris at the seam first.
pub fn merge_with_neighbours(doc: &mut Document, node: NodeId, rules: &MergeRules, trim: bool) {
    if doc.parent(node).is_none() {
        return;
    }

    let mut start = node;
    let mut end = node;
    while let Some(prev) = doc.prev_sibling(start) {
        if !doc.nodes_mergeable(prev, start, rules) {
            break;
        }
        start = prev;
    }
    while let Some(next) = doc.next_sibling(end) {
        if !doc.nodes_mergeable(end, next, rules) {
            break;
        }
        end = next;
    }

    if trim {
        while let Some(prev) = doc.prev_sibling(start) {
            if !is_discardable(doc, prev) {
                break;
            }
            doc.delete_node(prev);
        }
        while let Some(next) = doc.next_sibling(end) {
            if !is_discardable(doc, next) {
                break;
            }
            doc.delete_node(next);
        }
    }

    if start != end {
        loop {
            let last_merge = doc.next_sibling(start) == Some(end);
            let seam = if doc.node(start).is_element() {
                doc.last_child(start)
            } else {
                None
            };
            doc.merge_with_next_sibling(start, rules);
            if let Some(seam) = seam {
                merge_with_neighbours(doc, seam, rules, false);
            }
            if last_merge {
                break;
            }
        }
    }
}

pub fn merge_upwards(doc: &mut Document, node: NodeId, rules: &MergeRules) {
    let mut current = Some(node);
    while let Some(n) = current {
        let allowed = doc.node(n).tag().is_some_and(|t| rules.allows(t));
        if !allowed {
            break;
        }
        let parent = doc.parent(n);
        merge_with_neighbours(doc, n, rules, true);
        current = parent;
    }
}

fn merge_range(doc: &mut Document, range: &Range, rules: &MergeRules) {
    let nodes = range.all_nodes(doc);
    for node in nodes {
        let mut p = Some(node);
        while let Some(current) = p {
            let next = doc.parent(current);
            merge_with_neighbours(doc, current, rules, false);
            p = next;
        }
    }
}

// ----------------------------------------------------------------------
// Effective properties
// ----------------------------------------------------------------------

/// The effective property set of a node: ancestors' explicit styles
/// cascaded root-down, element-implied properties folded in, plus the
/// synthetic paragraph-style and context keys.
pub fn get_all_node_properties(doc: &Document, node: NodeId) -> Properties {
    if node == doc.body() {
        return Properties::new();
    }
    let parent = doc
        .parent(node)
        .unwrap_or_else(|| panic!("node {node} is not in tree"));
    let mut properties = get_all_node_properties(doc, parent);

    let n = doc.node(node);
    if !n.is_element() {
        return properties;
    }

    if let Some(style) = n.style() {
        for (name, value) in style {
            properties.insert(name.clone(), value.clone());
        }
    }

    match n.tag() {
        Some(Tag::B) => {
            properties.insert("font-weight".to_string(), "bold".to_string());
        }
        Some(Tag::I) => {
            properties.insert("font-style".to_string(), "italic".to_string());
        }
        Some(Tag::U) => {
            let entry = properties.entry("text-decoration".to_string());
            match entry {
                std::collections::btree_map::Entry::Occupied(mut o) => {
                    if !o
                        .get()
                        .to_lowercase()
                        .split_whitespace()
                        .any(|c| c == "underline")
                    {
                        let appended = format!("{} underline", o.get());
                        o.insert(appended);
                    }
                }
                std::collections::btree_map::Entry::Vacant(v) => {
                    v.insert("underline".to_string());
                }
            }
        }
        Some(Tag::Img) => {
            properties.insert(IN_IMAGE_KEY.to_string(), "true".to_string());
        }
        Some(Tag::Figure) => {
            properties.insert(IN_FIGURE_KEY.to_string(), "true".to_string());
        }
        Some(Tag::Table) => {
            properties.insert(IN_TABLE_KEY.to_string(), "true".to_string());
        }
        Some(Tag::A) => {
            if let Some(href) = n.attribute("href") {
                if href.starts_with('#') {
                    properties.insert(IN_REFERENCE_KEY.to_string(), "true".to_string());
                } else {
                    properties.insert(IN_LINK_KEY.to_string(), "true".to_string());
                }
            }
        }
        Some(Tag::Nav) => {
            if matches!(
                n.attribute("class"),
                Some("tableofcontents") | Some("listoffigures") | Some("listoftables")
            ) {
                properties.insert(IN_TOC_KEY.to_string(), "true".to_string());
            }
        }
        Some(tag) if doc.is_paragraph(node) => {
            let selector = match n.attribute("class") {
                Some(class) => format!("{}.{}", tag.name(), class),
                None => tag.name().to_string(),
            };
            properties.insert(PARAGRAPH_STYLE_KEY.to_string(), selector);
        }
        _ => {}
    }

    let titled = doc.is_heading(node)
        || doc.has_tag(node, &Tag::Caption)
        || doc.has_tag(node, &Tag::Figcaption);
    if titled {
        if let Some(id) = n.attribute("id") {
            properties.insert(IN_ITEM_TITLE_KEY.to_string(), id.to_string());
        }
    }

    properties
}

/// Text of the paragraph containing `pos`, truncated at the position.
pub fn paragraph_text_up_to_position(doc: &Document, pos: Position) -> String {
    let (start_node, offset) = if doc.node(pos.node).is_text() {
        (pos.node, pos.offset)
    } else {
        (position::closest_actual_node(doc, pos, false), 0)
    };

    let mut components: Vec<String> = Vec::new();
    let mut node = start_node;
    while doc.is_inline(node) {
        if let Some(value) = doc.node(node).text_value() {
            if node == start_node {
                components.push(value.chars().take(offset).collect());
            } else {
                components.push(value.to_string());
            }
        }
        if let Some(prev) = doc.prev_sibling(node) {
            node = prev;
            while doc.is_inline(node) {
                match doc.last_child(node) {
                    Some(last) => node = last,
                    None => break,
                }
            }
        } else {
            match doc.parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }
    }
    components.reverse();
    components.concat()
}

static ENDS_WITH_PERIOD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\s*$").unwrap());
static UNCLOSED_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*$").unwrap());
static UNCLOSED_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{201c}[^\u{201d}]*$").unwrap());

/// The common formatting state of the current selection: properties present
/// with equal values in every non-whitespace leaf, plus list membership and
/// cursor-context flags.
pub fn get_formatting(doc: &Document) -> Properties {
    let Some(range) = doc.selection() else {
        return Properties::new();
    };
    position::assert_valid(doc, range.start, "Selection start");
    position::assert_valid(doc, range.end, "Selection end");

    let outermost = range.outermost_nodes_at_least_one(doc);
    let mut leaf_nodes: Vec<NodeId> = Vec::new();
    for node in &outermost {
        collect_leaf_nodes(doc, *node, &mut leaf_nodes);
    }
    let empty = range.is_empty();

    let mut common: Option<Properties> = None;
    for leaf in &leaf_nodes {
        if !doc.is_whitespace_text_node(*leaf) || empty {
            let mut props = get_all_node_properties(doc, *leaf);
            props
                .entry(PARAGRAPH_STYLE_KEY.to_string())
                .or_insert_with(|| NONE_STYLE.to_string());
            common = Some(match common {
                None => props,
                Some(existing) => existing
                    .into_iter()
                    .filter(|(k, v)| props.get(k) == Some(v))
                    .collect(),
            });
        }
    }
    let mut common = common.unwrap_or_else(|| {
        let mut props = Properties::new();
        props.insert(PARAGRAPH_STYLE_KEY.to_string(), NONE_STYLE.to_string());
        props
    });

    for leaf in &leaf_nodes {
        if doc.has_tag(*leaf, &Tag::Li) {
            match doc.parent(*leaf).and_then(|p| doc.node(p).tag().cloned()) {
                Some(Tag::Ul) => {
                    common.insert(IN_UL_KEY.to_string(), "true".to_string());
                }
                Some(Tag::Ol) => {
                    common.insert(IN_OL_KEY.to_string(), "true".to_string());
                }
                _ => {}
            }
        } else {
            let mut ancestor = *leaf;
            while let Some(parent) = doc.parent(ancestor) {
                if doc.has_tag(parent, &Tag::Li) {
                    let mut have_prev = false;
                    let mut c = doc.prev_sibling(ancestor);
                    while let Some(p) = c {
                        if !doc.is_whitespace_text_node(p) {
                            have_prev = true;
                            break;
                        }
                        c = doc.prev_sibling(p);
                    }
                    if !have_prev {
                        let list = doc.parent(parent);
                        match list.and_then(|l| doc.node(l).tag().cloned()) {
                            Some(Tag::Ul) => {
                                common.insert(IN_UL_KEY.to_string(), "true".to_string());
                            }
                            Some(Tag::Ol) => {
                                common.insert(IN_OL_KEY.to_string(), "true".to_string());
                            }
                            _ => {}
                        }
                    }
                }
                ancestor = parent;
            }
        }
    }

    // Cursor-context flags derived from the text before the selection start.
    let before = paragraph_text_up_to_position(doc, range.start);
    if crate::dom::is_whitespace_string(&before) {
        let mut first_in_paragraph = true;
        let mut p = range.start.node;
        while doc.is_inline(p) {
            if doc.prev_sibling(p).is_some() {
                first_in_paragraph = false;
            }
            match doc.parent(p) {
                Some(parent) => p = parent,
                None => break,
            }
        }
        if first_in_paragraph {
            common.insert(SHIFT_KEY.to_string(), "true".to_string());
        }
    }
    if ENDS_WITH_PERIOD.is_match(&before) {
        common.insert(SHIFT_KEY.to_string(), "true".to_string());
    }
    if UNCLOSED_BRACKET.is_match(&before) {
        common.insert(IN_BRACKETS_KEY.to_string(), "true".to_string());
    }
    if UNCLOSED_QUOTE.is_match(&before) {
        common.insert(IN_QUOTES_KEY.to_string(), "true".to_string());
    }

    common
}

fn collect_leaf_nodes(doc: &Document, node: NodeId, result: &mut Vec<NodeId>) {
    if doc.first_child(node).is_none() {
        result.push(node);
    } else {
        let mut child = doc.first_child(node);
        while let Some(c) = child {
            collect_leaf_nodes(doc, c, result);
            child = doc.next_sibling(c);
        }
    }
}

// ----------------------------------------------------------------------
// Property classification
// ----------------------------------------------------------------------

/// Paragraph-level properties attach to the paragraph node; everything else
/// is inline-level.
fn is_paragraph_property(name: &str) -> bool {
    matches!(
        name,
        "margin-left"
            | "margin-right"
            | "margin-top"
            | "margin-bottom"
            | "padding-left"
            | "padding-right"
            | "padding-top"
            | "padding-bottom"
            | "border-left-width"
            | "border-right-width"
            | "border-top-width"
            | "border-bottom-width"
            | "border-left-style"
            | "border-right-style"
            | "border-top-style"
            | "border-bottom-style"
            | "border-left-color"
            | "border-right-color"
            | "border-top-color"
            | "border-bottom-color"
            | "border-top-left-radius"
            | "border-top-right-radius"
            | "border-bottom-left-radius"
            | "border-bottom-right-radius"
            | "text-align"
            | "text-indent"
            | "line-height"
            | "display"
            | "width"
            | "height"
    )
}

fn is_inline_property(name: &str) -> bool {
    !is_paragraph_property(name)
}

// ----------------------------------------------------------------------
// Push-down, removal and application of inline properties
// ----------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct SpecialProps {
    bold: Option<bool>,
    italic: Option<bool>,
    underline: Option<bool>,
}

/// Pull the canonical bold/italic/underline requests out of a property map,
/// leaving everything else in place. A present-but-cleared entry records
/// `Some(false)` so the matching wrapper elements are stripped.
fn extract_special(properties: &mut PropertyChanges) -> SpecialProps {
    let mut special = SpecialProps::default();

    if let Some(value) = properties.get("font-weight") {
        special.bold = Some(false);
        if value.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("bold")) {
            special.bold = Some(true);
            properties.remove("font-weight");
        }
    }
    if let Some(value) = properties.get("font-style") {
        special.italic = Some(false);
        if value.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("italic")) {
            special.italic = Some(true);
            properties.remove("font-style");
        }
    }
    if let Some(value) = properties.get("text-decoration").cloned() {
        special.underline = Some(false);
        if let Some(value) = value {
            let mut kept: Vec<&str> = Vec::new();
            for token in value.split_whitespace() {
                if token.eq_ignore_ascii_case("underline") {
                    special.underline = Some(true);
                } else {
                    kept.push(token);
                }
            }
            if special.underline == Some(true) {
                if kept.is_empty() {
                    properties.remove("text-decoration");
                } else {
                    properties
                        .insert("text-decoration".to_string(), Some(kept.join(" ")));
                }
            }
        }
    }
    special
}

fn is_special_span(doc: &Document, node: NodeId) -> bool {
    if !doc.has_tag(node, &Tag::Span) {
        return false;
    }
    match doc.node(node).attribute("class") {
        Some("footnote") | Some("endnote") => true,
        Some(class) => class.starts_with("prose-"),
        None => false,
    }
}

fn wrap_inline(doc: &mut Document, node: NodeId, tag: Tag) -> NodeId {
    if !doc.is_inline(node) {
        let children = doc.children(node);
        for child in children {
            wrap_inline(doc, child, tag.clone());
        }
        node
    } else {
        doc.wrap_node(node, tag)
    }
}

/// Wrap `target` to express the given inline properties: dedicated
/// `<b>/<i>/<u>` for the canonical three, a `<span>` with style entries for
/// the rest. Style entries never overwrite an existing explicit value.
fn apply_inline_formatting(
    doc: &mut Document,
    target: NodeId,
    properties: &Properties,
    special: &SpecialProps,
    apply_to_whitespace: bool,
) -> NodeId {
    if !apply_to_whitespace && doc.is_whitespace_text_node(target) {
        return target;
    }

    let mut target = target;
    if special.underline == Some(true) {
        target = wrap_inline(doc, target, Tag::U);
    }
    if special.italic == Some(true) {
        target = wrap_inline(doc, target, Tag::I);
    }
    if special.bold == Some(true) {
        target = wrap_inline(doc, target, Tag::B);
    }

    let is_biu = matches!(
        doc.node(target).tag(),
        Some(Tag::B) | Some(Tag::I) | Some(Tag::U)
    );

    if !properties.is_empty()
        && (!doc.node(target).is_element() || is_biu || is_special_span(doc, target))
    {
        target = wrap_inline(doc, target, Tag::Span);
    }

    if doc.node(target).is_element() {
        let to_set: PropertyChanges = properties
            .iter()
            .filter(|(name, _)| {
                doc.node(target)
                    .style_property(name)
                    .is_none_or(|existing| existing.is_empty())
            })
            .map(|(name, value)| (name.clone(), Some(value.clone())))
            .collect();
        doc.set_style_properties(target, &to_set);
    }

    target
}

/// Re-home inherited inline properties from ancestors onto the target nodes
/// themselves, dissolving `<b>/<i>/<u>` wrappers into explicit properties on
/// their children. After this, removing any ancestor wrapper cannot lose
/// formatting.
pub fn push_down_inline_properties(doc: &mut Document, outermost: &mut [NodeId]) {
    for i in 0..outermost.len() {
        outermost[i] = push_down_single(doc, outermost[i]);
    }
}

fn push_down_single(doc: &mut Document, target: NodeId) -> NodeId {
    let mut chain = doc.ancestors(target);
    chain.reverse(); // root first, immediate parent last
    let mut target = target;
    for node in chain {
        push_down_process(doc, node, &mut target);
    }
    target
}

fn push_down_process(doc: &mut Document, node: NodeId, target: &mut NodeId) {
    if !doc.node(node).is_element() {
        return;
    }

    let mut inline_properties: PropertyChanges = doc
        .node(node)
        .style()
        .map(|style| {
            style
                .iter()
                .filter(|(name, _)| is_inline_property(name))
                .map(|(name, value)| (name.clone(), Some(value.clone())))
                .collect()
        })
        .unwrap_or_default();

    let remove: PropertyChanges = inline_properties
        .keys()
        .map(|name| (name.clone(), None))
        .collect();
    doc.set_style_properties(node, &remove);

    let tag = doc.node(node).tag().cloned();
    match tag {
        Some(Tag::B) => {
            inline_properties.insert("font-weight".to_string(), Some("bold".to_string()));
        }
        Some(Tag::I) => {
            inline_properties.insert("font-style".to_string(), Some("italic".to_string()));
        }
        Some(Tag::U) => {
            let appended = match inline_properties.get("text-decoration") {
                Some(Some(existing)) => format!("{existing} underline"),
                _ => "underline".to_string(),
            };
            inline_properties.insert("text-decoration".to_string(), Some(appended));
        }
        _ => {}
    }

    let special = extract_special(&mut inline_properties);
    let has_props = !inline_properties.is_empty();

    if has_props || special.bold == Some(true) || special.italic == Some(true)
        || special.underline == Some(true)
    {
        let concrete: Properties = inline_properties
            .iter()
            .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
            .collect();
        let children = doc.children(node);
        for child in children {
            if doc.is_whitespace_text_node(child) {
                continue;
            }
            let replacement = apply_inline_formatting(doc, child, &concrete, &special, false);
            if *target == child {
                *target = replacement;
            }
        }
    }

    if matches!(tag, Some(Tag::B) | Some(Tag::I) | Some(Tag::U)) {
        doc.remove_node_but_keep_children(node);
    }
}

/// Strip the given properties (style entries and matching b/i/u/span
/// wrappers) from each node's subtree. Returns the nodes now standing where
/// the input nodes stood, with dissolved wrappers replaced by their
/// children.
fn remove_properties(
    doc: &mut Document,
    nodes: &[NodeId],
    properties: &PropertyChanges,
) -> Vec<NodeId> {
    let mut props = properties.clone();
    let special = extract_special(&mut props);
    let mut remaining: Vec<NodeId> = Vec::new();
    for node in nodes {
        remove_properties_single(doc, *node, &props, &special, &mut remaining, true);
    }
    remaining
}

fn remove_properties_single(
    doc: &mut Document,
    node: NodeId,
    properties: &PropertyChanges,
    special: &SpecialProps,
    remaining: &mut Vec<NodeId>,
    collect: bool,
) {
    if doc.node(node).is_element() {
        let present: PropertyChanges = {
            let style = doc.node(node).style().expect("element");
            properties
                .keys()
                .filter(|name| style.contains_key(*name))
                .map(|name| (name.clone(), None))
                .collect()
        };
        doc.set_style_properties(node, &present);
    }

    let will_remove = match doc.node(node).tag() {
        Some(Tag::B) => special.bold.is_some(),
        Some(Tag::I) => special.italic.is_some(),
        Some(Tag::U) => special.underline.is_some(),
        Some(Tag::Span) => {
            doc.node(node).style().is_some_and(|s| s.is_empty()) && !is_special_span(doc, node)
        }
        _ => false,
    };

    let child_collect = will_remove && collect;
    let children = doc.children(node);
    for child in children {
        remove_properties_single(doc, child, properties, special, remaining, child_collect);
    }

    if will_remove {
        doc.remove_node_but_keep_children(node);
    } else if collect {
        remaining.push(node);
    }
}

// ----------------------------------------------------------------------
// Paragraph handling
// ----------------------------------------------------------------------

fn put_direct_inline_children_in_paragraphs(doc: &mut Document, parent: NodeId) {
    let inline_children: Vec<NodeId> = doc
        .children(parent)
        .into_iter()
        .filter(|c| doc.is_inline(*c))
        .collect();
    for child in inline_children {
        // May already have been moved by wrapping an earlier sibling.
        if doc.parent(child) == Some(parent) && !doc.is_whitespace_text_node(child) {
            crate::hierarchy::wrap_inline_nodes_in_paragraph(doc, child);
        }
    }
}

/// The paragraph nodes covering a node set, with list items' stray inline
/// content wrapped first and nested duplicates dropped.
fn get_paragraphs(doc: &mut Document, nodes: &[NodeId]) -> Vec<NodeId> {
    let mut array: Vec<NodeId> = Vec::new();
    let mut set: HashSet<NodeId> = HashSet::new();

    for node in nodes {
        for anc in doc.ancestors(*node) {
            if doc.has_tag(anc, &Tag::Li) {
                put_direct_inline_children_in_paragraphs(doc, anc);
            }
        }
        collect_paragraphs(doc, *node, &mut array, &mut set);
    }

    let mut remove: HashSet<NodeId> = HashSet::new();
    for node in &array {
        for anc in doc.ancestors(*node) {
            remove.insert(anc);
        }
    }
    array.into_iter().filter(|n| !remove.contains(n)).collect()
}

fn collect_paragraphs(
    doc: &mut Document,
    node: NodeId,
    array: &mut Vec<NodeId>,
    set: &mut HashSet<NodeId>,
) {
    if doc.has_tag(node, &Tag::Li) {
        put_direct_inline_children_in_paragraphs(doc, node);
    }
    if doc.first_child(node).is_none() {
        let mut anc = Some(node);
        while let Some(a) = anc {
            if doc.is_paragraph(a) && set.insert(a) {
                array.push(a);
            }
            anc = doc.parent(a);
        }
    } else {
        let children = doc.children(node);
        for child in children {
            collect_paragraphs(doc, child, array, set);
        }
    }
}

fn get_outermost_paragraphs(doc: &Document, paragraphs: &[NodeId]) -> Vec<NodeId> {
    let all: HashSet<NodeId> = paragraphs.iter().copied().collect();
    paragraphs
        .iter()
        .copied()
        .filter(|p| !doc.ancestors(*p).iter().any(|a| all.contains(a)))
        .collect()
}

static SELECTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9]+)?(\.(.+))?$").unwrap());

/// Apply a `tag.class` paragraph style selector to a paragraph, replacing
/// its element type if needed. An id is cleared when the node stops being a
/// heading, since it no longer anchors an outline entry.
fn set_paragraph_style(doc: &mut Document, paragraph: NodeId, selector: &str) {
    let was_heading = doc.is_heading(paragraph);
    doc.remove_attribute(paragraph, "class");
    let mut paragraph = paragraph;

    if selector.is_empty() {
        if !doc.has_tag(paragraph, &Tag::P) {
            paragraph = doc.replace_element(paragraph, Tag::P);
        }
    } else if let Some(captures) = SELECTOR_RE.captures(selector) {
        let element_name = captures.get(1).map(|m| m.as_str()).unwrap_or("p");
        let class_name = captures.get(3).map(|m| m.as_str());

        let tag = Tag::from_name(element_name);
        if tag.kind() != crate::dom::NodeKind::Paragraph {
            return; // refuse silently rather than corrupt the hierarchy
        }
        if !doc.has_tag(paragraph, &tag) {
            paragraph = doc.replace_element(paragraph, tag);
        }
        match class_name {
            Some(class) => doc.set_attribute(paragraph, "class", Some(class)),
            None => doc.remove_attribute(paragraph, "class"),
        }
    }

    let is_heading = doc.is_heading(paragraph);
    if was_heading && !is_heading {
        doc.remove_attribute(paragraph, "id");
    }
}

// ----------------------------------------------------------------------
// The central mutating operation
// ----------------------------------------------------------------------

fn contains_only_inline_children(doc: &Document, node: NodeId) -> bool {
    let mut child = doc.first_child(node);
    while let Some(c) = child {
        if !doc.is_inline(c) {
            return false;
        }
        child = doc.next_sibling(c);
    }
    true
}

/// Apply a paragraph style selector and/or a set of property changes to the
/// current selection. `None` values in `properties` clear the property.
///
/// The selection is left covering the same logical content, snapped to valid
/// cursor stops.
pub fn apply_formatting_changes(
    doc: &mut Document,
    style: Option<&str>,
    properties: &PropertyChanges,
) {
    debug!(?style, count = properties.len(), "applying formatting changes");
    doc.undo_new_group("Apply formatting changes");

    let style = match style {
        Some(NONE_STYLE) => None,
        other => other,
    };

    let mut paragraph_properties = PropertyChanges::new();
    let mut inline_properties = PropertyChanges::new();
    for (name, value) in properties {
        if is_paragraph_property(name) {
            paragraph_properties.insert(name.clone(), value.clone());
        } else {
            inline_properties.insert(name.clone(), value.clone());
        }
    }

    let Some(mut sel) = doc.selection() else {
        return;
    };

    // An empty selection on an element position has nothing to carry the
    // formatting; synthesize an empty text node for it.
    if sel.is_empty() && doc.node(sel.start.node).is_element() {
        let node = sel.start.node;
        let offset = sel.start.offset;
        let text = doc.create_text("");
        let before = doc.child_at(node, offset);
        doc.insert_before(node, text, before);
        sel = Range::collapsed(Position::new(text, 0));
        doc.set_selection(sel);
    }

    // A cursor directly in a container (not yet inside a paragraph) gets an
    // implicit paragraph when a paragraph style is being applied.
    if style.is_some() && sel.is_empty() {
        let mut node = sel.single_node(doc);
        while doc.is_inline(node) {
            node = doc.parent(node).expect("inline node has parent");
        }
        if doc.is_container(node) && contains_only_inline_children(doc, node) {
            let p = doc.create_element(Tag::P);
            doc.append_child(node, p);
            while doc.first_child(node) != Some(p) {
                let child = doc.first_child(node).expect("non-empty");
                doc.append_child(p, child);
            }
            cursor::update_br_at_end_of_paragraph(doc, p);
        }
    }

    let mut range = sel;
    let allow_direct_inline = style.is_none();
    let mut sel_ends = [sel.start, sel.end];

    doc.track_positions(&mut sel_ends, |doc| {
        split_around_selection(doc, &mut range, allow_direct_inline);
        range.expand(doc);
        if !allow_direct_inline {
            range::ensure_inline_nodes_in_paragraph(doc, &mut range);
        }
        range::ensure_valid_hierarchy(doc, &mut range);
        range.expand(doc);

        let mut outermost = range.outermost_nodes(doc);
        let paragraphs = if !outermost.is_empty() {
            get_paragraphs(doc, &outermost)
        } else {
            get_paragraphs(doc, &[range.single_node(doc)])
        };

        doc.track_range(&mut range, |doc| {
            push_down_inline_properties(doc, &mut outermost);
            let outermost = remove_properties(doc, &outermost, &inline_properties);

            for node in &outermost {
                let existing = get_all_node_properties(doc, *node);
                let mut to_set: PropertyChanges = inline_properties
                    .iter()
                    .filter_map(|(name, value)| match value {
                        Some(v) if existing.get(name) != Some(v) => {
                            Some((name.clone(), Some(v.clone())))
                        }
                        _ => None,
                    })
                    .collect();
                let special = extract_special(&mut to_set);
                let concrete: Properties = to_set
                    .into_iter()
                    .filter_map(|(k, v)| v.map(|v| (k, v)))
                    .collect();
                let apply_to_whitespace = outermost.len() == 1;
                apply_inline_formatting(doc, *node, &concrete, &special, apply_to_whitespace);
            }

            let paragraphs = remove_properties(doc, &paragraphs, &paragraph_properties);

            let paragraph_to_set: PropertyChanges = paragraph_properties
                .iter()
                .filter(|(_, v)| v.is_some())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for p in get_outermost_paragraphs(doc, &paragraphs) {
                doc.set_style_properties(p, &paragraph_to_set);
            }

            if let Some(style) = style {
                for p in &paragraphs {
                    set_paragraph_style(doc, *p, style);
                }
            }
        });

        merge_range(doc, &range, &MERGEABLE_INLINE);
    });

    // The tracked cursor may no longer sit at a valid stop (a wrapper may
    // have landed right next to it); snap it back and re-validate.
    let start = position::closest_match_forwards(doc, sel_ends[0], position::ok_for_insertion);
    let end = position::closest_match_backwards(doc, sel_ends[1], position::ok_for_insertion);
    let mut temp = Range::new(start, end).forwards(doc);
    range::ensure_valid_hierarchy(doc, &mut temp);
    doc.set_selection(temp);
}

/// Wrap a single inline node to carry the given properties. Convenience for
/// callers outside the selection pipeline (e.g. paste fix-ups).
pub fn format_inline_node(doc: &mut Document, node: NodeId, properties: &Properties) -> NodeId {
    let mut changes: PropertyChanges = properties
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect();
    let special = extract_special(&mut changes);
    let concrete: Properties = changes
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();
    apply_inline_formatting(doc, node, &concrete, &special, true)
}
