//! Structured undo/redo log.
//!
//! Every primitive mutation on [`Document`] records the inverse operation as a
//! plain data record before applying itself. Undo pops a group and replays its
//! records (newest first) through the same primitives, which makes the redo
//! records — and all tracked-position adjustments — fall out automatically
//! rather than being stored. Because the records are data, the log can be
//! serialized and inspected independently of the mutation call sites.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};

const UNDO_LIMIT: usize = 50;

/// The inverse of one primitive mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UndoOp {
    InsertBefore {
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    },
    DeleteNode {
        node: NodeId,
    },
    InsertCharacters {
        node: NodeId,
        offset: usize,
        text: String,
    },
    DeleteCharacters {
        node: NodeId,
        start: usize,
        end: usize,
    },
    MoveCharacters {
        src: NodeId,
        src_start: usize,
        src_end: usize,
        dest: NodeId,
        dest_offset: usize,
        exclude_start: bool,
        exclude_end: bool,
    },
    SetAttribute {
        node: NodeId,
        name: String,
        value: Option<String>,
    },
    SetStyleProperties {
        node: NodeId,
        properties: BTreeMap<String, Option<String>>,
    },
    SetNodeValue {
        node: NodeId,
        value: String,
    },
}

/// One user-visible operation: a labelled batch of inverse records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoGroup {
    pub label: String,
    pub ops: Vec<UndoOp>,
}

#[derive(Debug, Default)]
pub struct UndoManager {
    undo_stack: Vec<UndoGroup>,
    redo_stack: Vec<UndoGroup>,
    /// Open group receiving new records; pushed lazily on first record.
    current_open: bool,
    in_undo: bool,
    in_redo: bool,
}

impl UndoManager {
    pub fn new() -> UndoManager {
        UndoManager::default()
    }

    pub(crate) fn record(&mut self, op: UndoOp) {
        if self.in_undo {
            self.redo_stack
                .last_mut()
                .expect("undo in progress without a redo group")
                .ops
                .push(op);
        } else if self.in_redo {
            self.undo_stack
                .last_mut()
                .expect("redo in progress without an undo group")
                .ops
                .push(op);
        } else {
            self.redo_stack.clear();
            if !self.current_open {
                self.undo_stack.push(UndoGroup::default());
                self.current_open = true;
                if self.undo_stack.len() > UNDO_LIMIT {
                    self.undo_stack.remove(0);
                }
            }
            self.undo_stack
                .last_mut()
                .expect("open group missing")
                .ops
                .push(op);
        }
    }

    /// Close the current group and start a fresh one with the given label.
    /// The next recorded mutation opens the group. Calls made while an undo
    /// or redo replay is running are ignored, so nested command
    /// implementations coalesce into the outer group.
    pub fn new_group(&mut self, label: &str) {
        if self.in_undo || self.in_redo {
            return;
        }
        self.current_open = true;
        self.undo_stack.push(UndoGroup {
            label: label.to_string(),
            ops: Vec::new(),
        });
        if self.undo_stack.len() > UNDO_LIMIT {
            self.undo_stack.remove(0);
        }
    }

    /// Label of the group currently receiving records, if one is open.
    /// Callers use this to coalesce repeated commands ("Insert text") into
    /// one undo step.
    pub fn group_label(&self) -> Option<&str> {
        if self.current_open {
            self.undo_stack.last().map(|g| g.label.as_str())
        } else {
            None
        }
    }

    pub fn undo_length(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_length(&self) -> usize {
        self.redo_stack.len()
    }

    /// The recorded groups, oldest first. Exposed for inspection and tests.
    pub fn undo_groups(&self) -> &[UndoGroup] {
        &self.undo_stack
    }

}

impl Document {
    pub fn undo_new_group(&mut self, label: &str) {
        self.undo.new_group(label);
    }

    pub fn undo_group_label(&self) -> Option<&str> {
        self.undo.group_label()
    }

    /// Revert the most recent undo group. Records the replayed mutations'
    /// inverses as a redo group.
    pub fn undo(&mut self) {
        let Some(group) = self.undo.undo_stack.pop() else {
            return;
        };
        self.undo.current_open = false;
        self.undo.redo_stack.push(UndoGroup {
            label: group.label.clone(),
            ops: Vec::new(),
        });
        self.undo.in_undo = true;
        for op in group.ops.into_iter().rev() {
            self.apply_undo_op(op);
        }
        self.undo.in_undo = false;
    }

    /// Re-apply the most recently undone group.
    pub fn redo(&mut self) {
        let Some(group) = self.undo.redo_stack.pop() else {
            return;
        };
        self.undo.undo_stack.push(UndoGroup {
            label: group.label.clone(),
            ops: Vec::new(),
        });
        self.undo.in_redo = true;
        for op in group.ops.into_iter().rev() {
            self.apply_undo_op(op);
        }
        self.undo.in_redo = false;
        self.undo.current_open = false;
    }

    /// Replay one inverse record through the ordinary primitives, so that
    /// position tracking and inverse recording behave exactly as they do for
    /// forward mutations.
    fn apply_undo_op(&mut self, op: UndoOp) {
        match op {
            UndoOp::InsertBefore {
                parent,
                node,
                before,
            } => self.insert_before(parent, node, before),
            UndoOp::DeleteNode { node } => self.delete_node(node),
            UndoOp::InsertCharacters { node, offset, text } => {
                self.insert_characters(node, offset, &text)
            }
            UndoOp::DeleteCharacters { node, start, end } => {
                self.delete_characters(node, start, end)
            }
            UndoOp::MoveCharacters {
                src,
                src_start,
                src_end,
                dest,
                dest_offset,
                exclude_start,
                exclude_end,
            } => self.move_characters(
                src,
                src_start,
                src_end,
                dest,
                dest_offset,
                exclude_start,
                exclude_end,
            ),
            UndoOp::SetAttribute { node, name, value } => {
                self.set_attribute(node, &name, value.as_deref())
            }
            UndoOp::SetStyleProperties { node, properties } => {
                self.set_style_properties(node, &properties)
            }
            UndoOp::SetNodeValue { node, value } => self.set_node_value(node, &value),
        }
    }
}
