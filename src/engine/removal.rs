//! Optimistic removal tracking.
//!
//! The instant the user classifies a photo it is added here and vanishes
//! from the visible projection, even though the store write is still in
//! flight. Each entry carries the sequence number of the action that
//! inserted it, so a failed write can only roll back its own effect and
//! never clobbers a newer action on the same photo.

use std::collections::HashMap;

use crate::state::data::PhotoId;

/// Set of locally classified photo ids, tagged by action sequence.
#[derive(Debug, Default)]
pub struct RemovalTracker {
    entries: HashMap<PhotoId, u64>,
}

impl RemovalTracker {
    /// Hide `id` from the projection, overwriting any older action's tag.
    pub fn insert(&mut self, id: PhotoId, seq: u64) {
        self.entries.insert(id, seq);
    }

    /// Make `id` visible again. Returns whether it was hidden.
    pub fn remove(&mut self, id: PhotoId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Whether `id` is currently hidden.
    pub fn contains(&self, id: PhotoId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether the entry for `id` still belongs to action `seq`.
    /// False when a newer action superseded it or an undo removed it.
    pub fn owned_by(&self, id: PhotoId, seq: u64) -> bool {
        self.entries.get(&id) == Some(&seq)
    }

    /// Number of photos classified locally since the session started.
    /// Feeds the windowed session's offset compensation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is hidden.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything. Called on session rebuild.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut tracker = RemovalTracker::default();
        assert!(tracker.is_empty());

        tracker.insert(7, 1);
        assert!(tracker.contains(7));
        assert_eq!(tracker.len(), 1);

        assert!(tracker.remove(7));
        assert!(!tracker.contains(7));
        assert!(!tracker.remove(7));
    }

    #[test]
    fn test_newer_action_supersedes_ownership() {
        let mut tracker = RemovalTracker::default();
        tracker.insert(7, 1);
        assert!(tracker.owned_by(7, 1));

        tracker.insert(7, 2);
        assert!(!tracker.owned_by(7, 1));
        assert!(tracker.owned_by(7, 2));
        assert_eq!(tracker.len(), 1);
    }
}
