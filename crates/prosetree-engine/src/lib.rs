/*!
 * # prosetree-engine
 *
 * The editing core of a WYSIWYG rich-text editor, operating directly on a
 * live HTML-like document tree.
 *
 * ## Architecture
 *
 * ### 1. Single mutation choke point
 * - Every change to the tree goes through the primitives on
 *   [`dom::Document`] — insert/delete nodes, character edits, attribute and
 *   style changes.
 * - Each primitive records its structured inverse with the undo log and
 *   live-adjusts every tracked position, so higher layers never think about
 *   either concern.
 *
 * ### 2. Positions and ranges
 * - A [`position::Position`] is a `(node, offset)` point *between* content.
 * - Positions can be registered for live tracking across mutations; the
 *   `track_positions` scoped pattern guarantees balanced registration.
 * - [`range::Range`] supplies the span algebra: normalization, expansion to
 *   block boundaries, and the outermost-nodes computation everything else
 *   is built on.
 *
 * ### 3. Invariant repair
 * - The tree grammar is `container* paragraph? inline?` along every path
 *   from the root. [`hierarchy`] repairs violations after each edit by
 *   wrapping, promoting and splitting.
 *
 * ### 4. Formatting, tables, editing
 * - [`formatting`] computes effective property sets and applies property
 *   and paragraph-style changes over a range.
 * - [`tables`] derives the dense rowspan/colspan grid and implements the
 *   row/column/cell algebra on top of it.
 * - [`cursor`] and [`clipboard`] implement typing, deletion, Enter, and
 *   structural paste in terms of the layers below.
 *
 * ## Usage
 *
 * ```rust
 * use prosetree_engine::html::parse_document;
 * use prosetree_engine::position::Position;
 * use prosetree_engine::cursor;
 *
 * let mut doc = parse_document("<p>hello</p>").unwrap();
 * let text = doc.find_text("hello").unwrap();
 * doc.set_cursor(Position::new(text, 5));
 * cursor::insert_character(&mut doc, "!", false, false);
 * assert_eq!(doc.node_text(text), "hello!");
 *
 * // Every command is one undo step.
 * doc.undo();
 * assert_eq!(doc.node_text(text), "hello");
 * ```
 *
 * Layout geometry is consumed, never computed: hosts implement
 * [`geometry::Layout`] and the engine decides which node/offset to query
 * and how to fall back when nothing at the position has geometry.
 */

pub mod clipboard;
pub mod cursor;
pub mod dom;
pub mod formatting;
pub mod geometry;
pub mod hierarchy;
pub mod html;
pub mod position;
pub mod range;
pub mod tables;
pub mod text;

// Re-export key types for easier usage
pub use dom::{Document, MergeRules, Node, NodeData, NodeId, NodeKind, Tag, UndoGroup, UndoOp};
pub use geometry::{Layout, Rect};
pub use position::Position;
pub use range::Range;
pub use tables::{Cell, TableRegion, TableStructure};
pub use text::{ParagraphAnalysis, Run};
