//! Query dispatch with optimistic thread updates.
//!
//! A query moves `Composing -> Sent -> Fulfilled | Failed`. While sent, the
//! thread shows an assistant placeholder whose id is fixed at creation.
//! Resolution rewrites that placeholder's content in place and never appends
//! or removes messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ApiError;
use crate::models::message::{FAILED_TEXT, NO_RESPONSE_TEXT, THINKING_TEXT};
use crate::models::{Message, Role};

use super::api_client::{ApiClient, QueryReply};
use super::thread_store::SharedThreads;

/// Transient message for the user, shown outside the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

/// Lifecycle of one dispatched query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Composing,
    Sent { placeholder_id: String },
    Fulfilled,
    Failed,
}

/// A query whose placeholder is visible and whose answer is outstanding.
#[derive(Debug, Clone)]
pub struct PendingQuery {
    pub thread_id: String,
    /// Server session the query continues; `None` for a local-only thread
    pub session_id: Option<String>,
    pub text: String,
    pub placeholder_id: String,
}

impl PendingQuery {
    pub fn state(&self) -> QueryState {
        QueryState::Sent {
            placeholder_id: self.placeholder_id.clone(),
        }
    }
}

/// What became of a `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing to send, or no such thread.
    Skipped,
    /// Sending is disabled until the user logs in again.
    Blocked,
    Fulfilled { thread_id: String, message_id: String },
    Failed { thread_id: String, message_id: String, error: String },
}

impl DispatchOutcome {
    pub fn state(&self) -> QueryState {
        match self {
            DispatchOutcome::Skipped | DispatchOutcome::Blocked => QueryState::Composing,
            DispatchOutcome::Fulfilled { .. } => QueryState::Fulfilled,
            DispatchOutcome::Failed { .. } => QueryState::Failed,
        }
    }
}

/// Sends user messages and reconciles the answers into their threads.
pub struct QueryDispatcher {
    api: Arc<ApiClient>,
    threads: SharedThreads,
    notices: UnboundedSender<Notice>,
    preview_chars: usize,
    blocked: AtomicBool,
}

impl QueryDispatcher {
    pub fn new(
        api: Arc<ApiClient>,
        threads: SharedThreads,
        notices: UnboundedSender<Notice>,
        preview_chars: usize,
    ) -> Self {
        Self {
            api,
            threads,
            notices,
            preview_chars,
            blocked: AtomicBool::new(false),
        }
    }

    /// Whether sends are refused pending re-authentication.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Re-enable sending after a successful login.
    pub fn enable_sending(&self) {
        self.blocked.store(false, Ordering::SeqCst);
    }

    /// Refuse sends until the next [`enable_sending`](Self::enable_sending).
    pub fn disable_sending(&self) {
        if !self.blocked.swap(true, Ordering::SeqCst) {
            tracing::info!("Sending disabled until next login");
        }
    }

    /// Disable sending if `result` says the session is gone. Any
    /// authorized call can discover that, not only queries.
    pub fn observe<T>(&self, result: &Result<T, ApiError>) {
        if matches!(result, Err(e) if e.is_unauthenticated()) {
            self.disable_sending();
        }
    }

    /// Send `draft` on `thread_id` and wait for the answer.
    pub async fn send(&self, draft: &str, thread_id: &str) -> DispatchOutcome {
        match self.start(draft, thread_id) {
            Ok(pending) => self.complete(pending).await,
            Err(outcome) => outcome,
        }
    }

    /// Check that sending is allowed, then [`begin`](Self::begin). The
    /// placeholder is in the thread once this returns `Ok`.
    pub fn start(&self, draft: &str, thread_id: &str) -> Result<PendingQuery, DispatchOutcome> {
        if self.is_blocked() {
            self.notify(Notice::Error("You need to log in again before sending".to_string()));
            return Err(DispatchOutcome::Blocked);
        }
        self.begin(draft, thread_id).ok_or(DispatchOutcome::Skipped)
    }

    /// Issue the query for `pending` and settle it.
    pub async fn complete(&self, pending: PendingQuery) -> DispatchOutcome {
        let result = self
            .api
            .send_query(&pending.text, pending.session_id.as_deref())
            .await;
        self.resolve(pending, result)
    }

    /// Append the user message and placeholder. Returns `None` for a blank
    /// draft or an unknown thread.
    pub fn begin(&self, draft: &str, thread_id: &str) -> Option<PendingQuery> {
        let text = draft.trim();
        if text.is_empty() {
            return None;
        }

        let mut threads = self.threads.lock();
        let Some(thread) = threads.get(thread_id) else {
            tracing::warn!("Send to unknown thread {}", thread_id);
            return None;
        };
        let thread_id = thread.id.clone();
        let session_id = (!thread.pending).then(|| thread.id.clone());

        let user = Message::new(Role::User, text);
        let placeholder = Message::new(Role::Assistant, THINKING_TEXT);
        let placeholder_id = placeholder.id.clone();
        threads.append_exchange(&thread_id, user, placeholder, self.preview_chars);

        let pending = PendingQuery {
            thread_id,
            session_id,
            text: text.to_string(),
            placeholder_id,
        };
        tracing::debug!(
            "Query on thread {} (session {:?}) is {:?}",
            pending.thread_id,
            pending.session_id,
            pending.state()
        );
        Some(pending)
    }

    /// Settle a pending query with the backend's result.
    pub fn resolve(&self, pending: PendingQuery, result: Result<QueryReply, ApiError>) -> DispatchOutcome {
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_unauthenticated() {
                    self.disable_sending();
                }
                return self.fail(pending, err.to_string());
            }
        };
        let Some(text) = reply.text() else {
            return self.fail(pending, NO_RESPONSE_TEXT.to_string());
        };

        let mut threads = self.threads.lock();
        if !threads.set_message_content(&pending.thread_id, &pending.placeholder_id, text) {
            tracing::debug!(
                "Placeholder {} no longer present, thread was rehydrated",
                pending.placeholder_id
            );
        }

        let thread_id = match reply.session_id.as_deref() {
            Some(session_id) if session_id != threads.resolve_id(&pending.thread_id) => {
                threads.migrate(&pending.thread_id, session_id);
                self.notify(Notice::Info(format!("Conversation saved as {}", session_id)));
                session_id.to_string()
            }
            _ => threads.resolve_id(&pending.thread_id).to_string(),
        };

        DispatchOutcome::Fulfilled {
            thread_id,
            message_id: pending.placeholder_id,
        }
    }

    fn fail(&self, pending: PendingQuery, error: String) -> DispatchOutcome {
        tracing::warn!("Query on thread {} failed: {}", pending.thread_id, error);
        let thread_id = {
            let mut threads = self.threads.lock();
            threads.set_message_content(&pending.thread_id, &pending.placeholder_id, FAILED_TEXT);
            threads.resolve_id(&pending.thread_id).to_string()
        };
        self.notify(Notice::Error(error.clone()));

        DispatchOutcome::Failed {
            thread_id,
            message_id: pending.placeholder_id,
            error,
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("Notice dropped, no listener");
        }
    }
}
