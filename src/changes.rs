// 📝 Change Buffer - pending edits collected from the grid and tree views
//
// Nothing here touches the store. Edits pile up in a ChangeBuffer until the
// user commits; the commit coordinator then validates and applies them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// NODE IDENTITY
// ============================================================================

/// Stable id of a tree node, assigned when the view creates the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// COALESCING
// ============================================================================

pub trait Coalesce {
    /// Fold `newer` into `self` when both address the same cell or node.
    /// Returns false (leaving `self` untouched) when they are unrelated.
    fn absorb(&mut self, newer: &Self) -> bool;

    /// Edits pushed after a barrier never fold into edits before it.
    /// Row deletes are barriers because they shift the rows below them.
    fn is_barrier(&self) -> bool {
        false
    }
}

/// Ordered log of pending edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeBuffer<C> {
    changes: Vec<C>,
}

impl<C> ChangeBuffer<C> {
    pub fn new() -> Self {
        ChangeBuffer {
            changes: Vec::new(),
        }
    }

    pub fn changes(&self) -> &[C] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

impl<C: Coalesce> ChangeBuffer<C> {
    /// Record an edit. An edit to a cell (or node) that already has a pending
    /// edit since the last barrier replaces that edit's value in place
    /// instead of being appended.
    pub fn push(&mut self, change: C) {
        for pending in self.changes.iter_mut().rev() {
            if pending.absorb(&change) {
                return;
            }
            if pending.is_barrier() {
                break;
            }
        }
        self.changes.push(change);
    }
}

impl<C> Default for ChangeBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, C> IntoIterator for &'a ChangeBuffer<C> {
    type Item = &'a C;
    type IntoIter = std::slice::Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

// ============================================================================
// GRID CHANGES
// ============================================================================

/// One edit in a table view. Rows are 1-based grid positions, which are also
/// the repository keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Change {
    /// Append a blank row, then set `column` to `value` if given
    Add {
        column: Option<String>,
        value: Option<String>,
    },
    Update {
        row: i64,
        column: String,
        new_value: String,
        old_value: String,
    },
    Delete { row: i64 },
}

impl Change {
    pub fn add(column: impl Into<String>, value: impl Into<String>) -> Self {
        Change::Add {
            column: Some(column.into()),
            value: Some(value.into()),
        }
    }

    pub fn add_blank() -> Self {
        Change::Add {
            column: None,
            value: None,
        }
    }

    pub fn update(row: i64, column: impl Into<String>, new_value: impl Into<String>) -> Self {
        Change::Update {
            row,
            column: column.into(),
            new_value: new_value.into(),
            old_value: String::new(),
        }
    }

    pub fn delete(row: i64) -> Self {
        Change::Delete { row }
    }

    pub fn with_old_value(self, old: impl Into<String>) -> Self {
        match self {
            Change::Update {
                row,
                column,
                new_value,
                ..
            } => Change::Update {
                row,
                column,
                new_value,
                old_value: old.into(),
            },
            other => other,
        }
    }
}

impl Coalesce for Change {
    fn absorb(&mut self, newer: &Self) -> bool {
        match (self, newer) {
            (
                Change::Update {
                    row,
                    column,
                    new_value,
                    ..
                },
                Change::Update {
                    row: newer_row,
                    column: newer_column,
                    new_value: latest,
                    ..
                },
            ) if *row == *newer_row && *column == *newer_column => {
                new_value.clone_from(latest);
                true
            }
            _ => false,
        }
    }

    fn is_barrier(&self) -> bool {
        matches!(self, Change::Delete { .. })
    }
}

// ============================================================================
// TREE CHANGES
// ============================================================================

/// One edit in the category tree view. Categories are addressed by name,
/// nodes by the id the view gave them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeChange {
    /// New category under `parent` (None = root)
    Add {
        node: NodeId,
        name: String,
        parent: Option<String>,
    },
    Rename {
        node: NodeId,
        new_name: String,
        old_name: String,
    },
    /// Re-parent `name` under `new_parent` (None = make it a root)
    Move {
        node: NodeId,
        name: String,
        new_parent: Option<String>,
    },
    /// Remove `name` and its whole subtree
    Delete { node: NodeId, name: String },
}

impl TreeChange {
    pub fn node(&self) -> NodeId {
        match self {
            TreeChange::Add { node, .. }
            | TreeChange::Rename { node, .. }
            | TreeChange::Move { node, .. }
            | TreeChange::Delete { node, .. } => *node,
        }
    }
}

impl Coalesce for TreeChange {
    // The first rename keeps its old name so the batch still finds the
    // category as it exists in the store.
    fn absorb(&mut self, newer: &Self) -> bool {
        match (self, newer) {
            (
                TreeChange::Rename { node, new_name, .. },
                TreeChange::Rename {
                    node: newer_node,
                    new_name: latest,
                    ..
                },
            ) if *node == *newer_node => {
                new_name.clone_from(latest);
                true
            }
            _ => false,
        }
    }
}
