//! Session data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque session identifier
pub type SessionId = String;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Speaker label used when a conversation is flattened into one prompt
    pub fn capitalized(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message. Never modified once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role (user, assistant, system)
    pub role: Role,
    /// Message content
    pub content: String,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Conversational state of one visitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: SessionId,
    /// Creation (or last reset) time
    pub created_at: DateTime<Utc>,
    /// Last access time, compared against the TTL by the sweeper
    pub last_touched_at: DateTime<Utc>,
    /// Most recent messages, oldest first
    pub history: Vec<Message>,
    /// Intent of the latest turn
    pub last_intent: Option<String>,
    /// Number of turns answered without the backend
    pub fallback_count: u32,
}

impl Session {
    /// Create an empty session
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_touched_at: now,
            history: Vec::new(),
            last_intent: None,
            fallback_count: 0,
        }
    }

    /// Append a message, keeping only the newest `max_history` entries
    pub fn push(&mut self, message: Message, max_history: usize) {
        self.history.push(message);
        if self.history.len() > max_history {
            let excess = self.history.len() - max_history;
            self.history.drain(..excess);
        }
        self.touch();
    }

    /// Drop history and metadata, keeping the id
    pub fn clear(&mut self) {
        let now = Utc::now();
        self.history.clear();
        self.last_intent = None;
        self.fallback_count = 0;
        self.created_at = now;
        self.last_touched_at = now;
    }

    pub fn touch(&mut self) {
        self.last_touched_at = Utc::now();
    }

    /// True when the session has been idle strictly longer than `ttl`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match now.signed_duration_since(self.last_touched_at).to_std() {
            Ok(idle) => idle > ttl,
            Err(_) => false,
        }
    }
}
