//! Session management for conversation history
//!
//! Sessions live in memory only; they are bounded in length and expire
//! after a configurable idle time.

pub mod model;
pub mod store;

pub use model::{Message, Role, Session, SessionId};
pub use store::{SessionGuard, SessionStore};
