//! Saved messages side collection.
//!
//! Snapshots of assistant answers the user pinned. Lives next to the
//! transcript but never shares its lifecycle: clearing the conversation
//! keeps saved entries, and removing an entry leaves the conversation alone.

use super::transcript::Turn;

#[derive(Debug, Clone)]
pub struct SavedMessages {
    entries: Vec<Turn>,
    expanded: bool,
}

impl Default for SavedMessages {
    fn default() -> Self {
        Self::new()
    }
}

impl SavedMessages {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            expanded: true,
        }
    }

    /// Append a copy of `turn`. The same answer may be saved twice.
    pub fn add(&mut self, turn: &Turn) {
        self.entries.push(turn.clone());
    }

    /// Remove the entry at `index`, keeping the order of the rest.
    pub fn remove_at(&mut self, index: usize) -> Option<Turn> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Flip between the expanded and collapsed panel
    pub fn toggle_visibility(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn entries(&self) -> &[Turn] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
