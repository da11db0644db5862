//! Conversation turns and the ordered transcript that holds them.
//!
//! Only the last turn of a [`Transcript`] can be changed after it is pushed.
//! Everything before it is frozen, which keeps the prompt context stable while
//! an assistant reply is still streaming into the tail.

use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who sent this turn.
    pub role: Role,
    /// The text of the turn.
    pub content: String,
}

impl ChatTurn {
    /// Create a turn with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript seeded with an assistant greeting.
    ///
    /// An empty greeting seeds nothing.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut transcript = Self::new();
        if !greeting.is_empty() {
            transcript.push(ChatTurn::assistant(greeting));
        }
        transcript
    }

    /// Append a turn at the end.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    /// All turns in insertion order.
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The most recent turn, if any.
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append text to the tail turn. Returns `false` when the transcript is empty.
    pub fn append_to_last(&mut self, text: &str) -> bool {
        match self.turns.last_mut() {
            Some(turn) => {
                turn.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Replace the content of the tail turn. Returns `false` when the transcript is empty.
    pub fn replace_last(&mut self, content: impl Into<String>) -> bool {
        match self.turns.last_mut() {
            Some(turn) => {
                turn.content = content.into();
                true
            }
            None => false,
        }
    }
}
