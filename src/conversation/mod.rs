//! Conversation types and state

pub mod format;

use serde::{Deserialize, Serialize};

pub use format::{segments, SegmentKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Full mutable state of one session.
///
/// `history` is append-only; the only way to shrink it is [`ConversationState::reset`].
/// `draft` is never persisted.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub history: Vec<Message>,
    pub draft: String,
    pub is_pending: bool,
    pub last_error: Option<String>,
    /// Bumped each time a view of this state is published
    pub revision: u64,
}

impl ConversationState {
    pub fn with_history(history: Vec<Message>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn add_user(&mut self, content: &str) {
        self.history.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: &str) {
        self.history.push(Message::assistant(content));
    }

    /// The trimmed draft, if it is worth sending.
    pub fn submittable_input(&self) -> Option<&str> {
        let trimmed = self.draft.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn can_submit(&self) -> bool {
        !self.is_pending && self.submittable_input().is_some()
    }

    /// Drops the history and the last error. The draft and the pending flag are untouched.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_error = None;
    }
}
