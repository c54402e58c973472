//! Stack of reversible classification actions.
//!
//! Only single classifications are pushed; batch actions are not
//! undoable. Cleared on session rebuild, since the entries reference the
//! previous session's counters.

use crate::state::data::{PhotoId, UndoEntry};

/// LIFO stack of undoable actions.
#[derive(Debug, Default)]
pub struct UndoStack {
    entries: Vec<UndoEntry>,
}

impl UndoStack {
    /// Record a completed classification.
    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
    }

    /// Take the most recent entry.
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    /// Drop the newest entry for `id`. Used when a write fails and its
    /// optimistic effect is rolled back; the action never happened, so it
    /// must not be undoable.
    pub fn remove_latest_for(&mut self, id: PhotoId) {
        if let Some(pos) = self.entries.iter().rposition(|e| e.id == id) {
            self.entries.remove(pos);
        }
    }

    /// Whether there is anything to undo.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything. Called on session rebuild.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
