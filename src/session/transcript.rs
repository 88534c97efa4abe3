//! Message store: the ordered conversation transcript.
//!
//! Turns are append-only. The single exception is the in-flight assistant
//! turn, which stays open while its answer streams in and is sealed once the
//! stream ends. Only [`Transcript::clear`] removes turns.

use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A source the backend cited for an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source_url: String,
    #[serde(default)]
    pub source_description: String,
}

/// Lifecycle of a turn's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Final content
    Complete,
    /// Assistant answer still arriving
    Streaming,
    /// Stream failed after part of the answer arrived
    Interrupted,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub citations: Vec<Citation>,
    pub status: TurnStatus,
    pub timestamp: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            citations: Vec::new(),
            status: TurnStatus::Complete,
            timestamp: chrono::Local::now().format("%H:%M").to_string(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Ordered sequence of turns, insertion order = conversation order
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    /// Whether the last turn is an assistant answer still being streamed
    open: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished turn.
    ///
    /// Returns `false` (and leaves the transcript untouched) when an answer
    /// is still streaming, or when an assistant turn would not directly
    /// follow an unanswered user turn.
    pub fn append(&mut self, turn: Turn) -> bool {
        if self.open {
            return false;
        }
        if turn.role == Role::Assistant && self.last_role() != Some(Role::User) {
            return false;
        }
        self.turns.push(turn);
        true
    }

    /// Empty the transcript, abandoning any open assistant turn.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.open = false;
    }

    /// Role of the final turn, `None` when empty
    pub fn last_role(&self) -> Option<Role> {
        self.turns.last().map(|turn| turn.role)
    }

    /// Start an empty assistant turn that answers the last user turn.
    pub fn open_assistant(&mut self) -> bool {
        if self.open || self.last_role() != Some(Role::User) {
            return false;
        }
        let mut turn = Turn::assistant(String::new());
        turn.status = TurnStatus::Streaming;
        self.turns.push(turn);
        self.open = true;
        true
    }

    /// Grow the open assistant turn's content.
    pub fn extend_open(&mut self, text: &str) -> bool {
        match self.open_turn_mut() {
            Some(turn) => {
                turn.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn attach_citations(&mut self, citations: Vec<Citation>) -> bool {
        match self.open_turn_mut() {
            Some(turn) => {
                turn.citations.extend(citations);
                true
            }
            None => false,
        }
    }

    /// Close the open assistant turn; it can no longer change afterwards.
    pub fn seal(&mut self, status: TurnStatus) -> bool {
        match self.open_turn_mut() {
            Some(turn) => {
                turn.status = status;
                self.open = false;
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Assistant turns paired with their position in the transcript
    pub fn assistant_turns(&self) -> impl Iterator<Item = (usize, &Turn)> {
        self.turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.is_assistant())
    }

    fn open_turn_mut(&mut self) -> Option<&mut Turn> {
        if !self.open {
            return None;
        }
        self.turns.last_mut()
    }
}
