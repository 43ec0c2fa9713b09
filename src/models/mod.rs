//! Data models for threads, messages and server sessions.

pub mod message;
pub mod session;
pub mod thread;

pub use message::{HistoryRecord, Message, Role};
pub use session::{Session, User};
pub use thread::Thread;
