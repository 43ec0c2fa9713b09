//! Thread store - reconciles local threads with server sessions.
//!
//! Three inputs arrive in any order: local edits from the dispatcher, the
//! server's session list, and per-session history. History is authoritative:
//! hydrating a thread replaces whatever the client was showing for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::thread::truncate_preview;
use crate::models::{HistoryRecord, Message, Session, Thread};

/// Thread state shared between the dispatcher and the front end.
///
/// Locks are only held between suspension points, never across an await.
#[derive(Clone)]
pub struct SharedThreads(Arc<Mutex<ThreadStore>>);

impl SharedThreads {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ThreadStore::new())))
    }

    pub fn lock(&self) -> MutexGuard<'_, ThreadStore> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory map of thread id to thread. Newest threads come first.
#[derive(Debug, Default)]
pub struct ThreadStore {
    threads: Vec<Thread>,
    /// Last session list fetched from the server
    sessions: Vec<Session>,
    /// Local placeholder id -> session id it was migrated to
    aliases: HashMap<String, String>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Follow migrations to the id a thread is addressable under now.
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        // Alias chains are short; the bound guards against a cycle.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn get(&self, id: &str) -> Option<&Thread> {
        let id = self.resolve_id(id);
        self.threads.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Thread> {
        let id = self.resolve_id(id).to_string();
        self.threads.iter_mut().find(|t| t.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.threads.iter().position(|t| t.id == id)
    }

    /// Create a greeting-only thread for a server session id unless one
    /// exists already.
    pub fn ensure_thread(&mut self, id: &str) -> &Thread {
        let resolved = self.resolve_id(id).to_string();
        let index = match self.position(&resolved) {
            Some(index) => index,
            None => {
                tracing::debug!("Creating thread {}", resolved);
                self.threads.insert(0, Thread::greeting(resolved, false));
                0
            }
        };
        &self.threads[index]
    }

    /// Create a thread with no server session behind it yet.
    pub fn new_local_thread(&mut self) -> &Thread {
        let id = format!("local-{}", uuid::Uuid::new_v4());
        tracing::debug!("Creating local thread {}", id);
        self.threads.insert(0, Thread::greeting(id, true));
        &self.threads[0]
    }

    /// Replace a thread's messages with server history, creating the thread
    /// if needed.
    pub fn hydrate_from_history(&mut self, id: &str, records: &[HistoryRecord]) -> &Thread {
        let messages: Vec<Message> = records.iter().map(Message::from_record).collect();
        let resolved = self.resolve_id(id).to_string();

        let index = match self.position(&resolved) {
            Some(index) => {
                let thread = &mut self.threads[index];
                thread.messages = messages;
                index
            }
            None => {
                let mut thread = Thread::greeting(resolved, false);
                thread.messages = messages;
                self.threads.insert(0, thread);
                0
            }
        };

        let thread = &mut self.threads[index];
        thread.preview = thread.preview_from_last();
        thread.pending = false;
        thread.touch();
        tracing::debug!("Hydrated thread {} with {} messages", thread.id, thread.messages.len());
        thread
    }

    /// Remember the server's session list.
    pub fn record_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    /// Put a newly created session at the head of the list.
    pub fn record_created_session(&mut self, session: Session) {
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.insert(0, session);
    }

    /// Append a user message and an assistant placeholder. Returns `false` if
    /// the thread does not exist.
    pub fn append_exchange(
        &mut self,
        thread_id: &str,
        user: Message,
        placeholder: Message,
        preview_chars: usize,
    ) -> bool {
        let Some(thread) = self.get_mut(thread_id) else {
            return false;
        };
        thread.preview = truncate_preview(&user.content, preview_chars);
        thread.messages.push(user);
        thread.messages.push(placeholder);
        thread.touch();
        true
    }

    /// Overwrite one message's content in place. Returns `false` if either
    /// the thread or the message is gone (e.g. replaced by hydration).
    pub fn set_message_content(&mut self, thread_id: &str, message_id: &str, content: &str) -> bool {
        let Some(thread) = self.get_mut(thread_id) else {
            return false;
        };
        match thread.message_mut(message_id) {
            Some(message) => {
                message.content = content.to_string();
                thread.touch();
                true
            }
            None => false,
        }
    }

    /// Make the conversation under `old_id` addressable as `new_id`.
    ///
    /// If no thread has `new_id` the thread is re-keyed. Otherwise the
    /// visible messages move into the existing thread and the old one is
    /// dropped. A local-only `old_id` keeps resolving to `new_id`; a server
    /// session id is left free so that session can be opened again.
    pub fn migrate(&mut self, old_id: &str, new_id: &str) {
        let old_id = self.resolve_id(old_id).to_string();
        if old_id == new_id {
            return;
        }
        let Some(old_index) = self.position(&old_id) else {
            return;
        };
        let was_local = self.threads[old_index].pending;

        match self.position(new_id) {
            None => {
                let thread = &mut self.threads[old_index];
                thread.id = new_id.to_string();
                thread.pending = false;
            }
            Some(_) => {
                let source = self.threads.remove(old_index);
                if let Some(target) = self.threads.iter_mut().find(|t| t.id == new_id) {
                    target.messages = source.messages;
                    target.preview = source.preview;
                    target.pending = false;
                    target.touch();
                }
            }
        }

        tracing::debug!("Migrated thread {} -> {}", old_id, new_id);
        if was_local {
            self.aliases.insert(old_id, new_id.to_string());
        }
    }

    /// Drop all state, e.g. at logout.
    pub fn clear(&mut self) {
        self.threads.clear();
        self.sessions.clear();
        self.aliases.clear();
    }
}
