//! Client-side conversation threads.

use chrono::{DateTime, Utc};

use super::message::{Message, GREETING_TEXT};

/// Title given to every new thread.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// A conversation as the client shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Server session id, or a `local-` id while pending
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Short text for the thread list
    pub preview: String,
    pub last_updated: DateTime<Utc>,
    /// True until the backend has confirmed a session for this thread
    pub pending: bool,
}

impl Thread {
    /// A thread holding only the greeting.
    pub fn greeting(id: impl Into<String>, pending: bool) -> Self {
        let id = id.into();
        let greeting = Message::greeting(&id);
        Self {
            messages: vec![greeting],
            id,
            title: DEFAULT_TITLE.to_string(),
            preview: GREETING_TEXT.to_string(),
            last_updated: Utc::now(),
            pending,
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Preview derived from the newest message, or the greeting.
    pub fn preview_from_last(&self) -> String {
        self.messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| GREETING_TEXT.to_string())
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
