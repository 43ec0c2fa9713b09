//! Chat messages, both local and as the backend reports them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Greeting shown in every freshly created thread.
pub const GREETING_TEXT: &str = "Hi there! What would you like to ask?";
/// Placeholder content while a query is outstanding.
pub const THINKING_TEXT: &str = "Thinking…";
/// Placeholder content after a failed query.
pub const FAILED_TEXT: &str = "Failed to fetch response.";
/// Notification raised when the backend answers with no text.
pub const NO_RESPONSE_TEXT: &str = "No response from AI";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a backend role string. Anything unrecognised is rendered as an
    /// assistant message.
    pub fn from_server(role: &str) -> Self {
        match role {
            "user" => Role::User,
            _ => Role::Assistant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in a thread. Only `content` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh unique id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), role, content)
    }

    pub fn with_id(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// The greeting that seeds a new thread.
    pub fn greeting(thread_id: &str) -> Self {
        Self::with_id(
            format!("greet-{}-{}", thread_id, uuid::Uuid::new_v4()),
            Role::Assistant,
            GREETING_TEXT,
        )
    }

    /// Build a message from a history record.
    pub fn from_record(record: &HistoryRecord) -> Self {
        Self::new(
            Role::from_server(&record.role),
            record.content.clone().unwrap_or_default(),
        )
    }
}

/// One entry of `GET /sessions/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
impl HistoryRecord {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}
