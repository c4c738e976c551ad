//! The document tree: arena storage, node taxonomy, mutation primitives and
//! the structured undo log.
//!
//! Everything above this module mutates the tree exclusively through the
//! primitives defined here. That single choke point is what keeps the undo
//! log complete and tracked positions accurate: a mutation that bypassed it
//! would silently corrupt both.

pub mod document;
pub mod mutation;
pub mod node;
pub mod undo;

pub use document::{Document, PositionHandle};
pub use mutation::{MergeRules, MERGEABLE_BLOCK, MERGEABLE_BLOCK_AND_INLINE, MERGEABLE_INLINE};
pub use node::{is_whitespace_string, Node, NodeData, NodeId, NodeKind, Tag};
pub use undo::{UndoGroup, UndoManager, UndoOp};
