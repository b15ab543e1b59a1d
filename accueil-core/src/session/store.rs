//! In-memory session store with per-session locking and TTL sweeping

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Message, Role, Session, SessionId};
use crate::config::schema::{SessionPolicy, SessionsConfig};
use crate::{Error, Result};

type SessionSlot = Arc<Mutex<Session>>;

/// Keyed, TTL-bounded conversational state.
///
/// Each session sits behind its own async mutex inside a sharded map, so
/// turns on unrelated ids never wait on each other. Map shard locks are only
/// held for lookups and never across an `.await`.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionSlot>,
    max_history: usize,
    ttl: Duration,
    policy: SessionPolicy,
}

impl SessionStore {
    /// Create a store from the sessions configuration section
    pub fn new(config: &SessionsConfig) -> Self {
        Self::with_limits(
            config.max_history,
            Duration::from_secs(config.ttl_secs),
            config.policy,
        )
    }

    /// Create a store with explicit limits
    pub fn with_limits(max_history: usize, ttl: Duration, policy: SessionPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history: max_history.max(1),
            ttl,
            policy,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Allocate a fresh session and return its id
    pub fn create(&self) -> SessionId {
        loop {
            let id = Uuid::new_v4().to_string();
            if let dashmap::mapref::entry::Entry::Vacant(entry) = self.sessions.entry(id.clone())
            {
                entry.insert(Arc::new(Mutex::new(Session::new(id.clone()))));
                debug!("Created session {}", id);
                return id;
            }
        }
    }

    /// Acquire the exclusive lock of a session for the duration of a turn.
    ///
    /// Unknown ids are created (permissive) or rejected (strict). The session
    /// is touched on acquisition.
    pub async fn lock(&self, id: &str) -> Result<SessionGuard> {
        loop {
            let slot = self.slot(id)?;
            let mut guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(id, &slot) {
                guard.touch();
                return Ok(SessionGuard {
                    inner: guard,
                    max_history: self.max_history,
                });
            }
            // Swept while we were waiting; the slot we hold is orphaned.
            debug!("Session {} was swept before its lock was acquired, retrying", id);
        }
    }

    /// Snapshot of a session, subject to the unknown-id policy
    pub async fn get(&self, id: &str) -> Result<Session> {
        Ok(self.lock(id).await?.snapshot())
    }

    /// Append one message to a session, truncating to the history bound
    pub async fn append(&self, id: &str, role: Role, content: impl Into<String>) -> Result<()> {
        let mut guard = self.lock(id).await?;
        guard.append(role, content);
        Ok(())
    }

    /// Clear history and metadata of an existing session.
    ///
    /// Returns false, and creates nothing, for an unknown id.
    pub async fn reset(&self, id: &str) -> bool {
        match self.lock_existing(id).await {
            Some(mut guard) => {
                guard.inner.clear();
                info!("Reset session {}", id);
                true
            }
            None => false,
        }
    }

    /// Snapshot of an existing session without creating or touching it
    pub async fn peek(&self, id: &str) -> Option<Session> {
        self.lock_existing(id).await.map(|guard| guard.snapshot())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle for longer than the TTL at `now`.
    ///
    /// Works shard by shard and skips sessions whose lock is held by a turn
    /// in progress, so it never blocks the whole store or an active session.
    /// Returns the number of sessions removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0usize;
        let ttl = self.ttl;
        self.sessions.retain(|id, slot| match slot.try_lock() {
            Ok(session) => {
                if session.is_expired(now, ttl) {
                    debug!("Sweeping idle session {}", id);
                    removed += 1;
                    false
                } else {
                    true
                }
            }
            Err(_) => true,
        });
        if removed > 0 {
            info!("Swept {} idle session(s), {} remaining", removed, self.sessions.len());
        }
        removed
    }

    fn slot(&self, id: &str) -> Result<SessionSlot> {
        if let Some(existing) = self.sessions.get(id) {
            return Ok(Arc::clone(existing.value()));
        }
        match self.policy {
            SessionPolicy::Strict => Err(Error::UnknownSession(id.to_string())),
            SessionPolicy::Permissive => {
                let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
                    debug!("Auto-creating session {}", id);
                    Arc::new(Mutex::new(Session::new(id)))
                });
                Ok(Arc::clone(entry.value()))
            }
        }
    }

    async fn lock_existing(&self, id: &str) -> Option<SessionGuard> {
        loop {
            let slot = self.sessions.get(id).map(|s| Arc::clone(s.value()))?;
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(id, &slot) {
                return Some(SessionGuard {
                    inner: guard,
                    max_history: self.max_history,
                });
            }
        }
    }

    fn is_current(&self, id: &str, slot: &SessionSlot) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }
}

/// Exclusive access to one session; released on drop.
pub struct SessionGuard {
    inner: OwnedMutexGuard<Session>,
    max_history: usize,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Append a message, dropping the oldest entries past the bound
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.inner.push(Message::new(role, content), self.max_history);
    }

    /// Current bounded history, oldest first
    pub fn history(&self) -> Vec<Message> {
        self.inner.history.clone()
    }

    /// Record the outcome of a turn in the session metadata
    pub fn record_turn(&mut self, intent: &str, fell_back: bool) {
        self.inner.last_intent = Some(intent.to_string());
        if fell_back {
            self.inner.fallback_count += 1;
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_history: usize) -> SessionStore {
        SessionStore::with_limits(
            max_history,
            Duration::from_secs(60),
            SessionPolicy::Permissive,
        )
    }

    #[tokio::test]
    async fn test_create_allocates_unique_ids() {
        let store = store(20);
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert!(store.get(&a).await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_get_auto_creates_when_permissive() {
        let store = store(20);
        let session = store.get("robot-lobby").await.unwrap();
        assert_eq!(session.id, "robot-lobby");
        assert!(store.contains("robot-lobby"));
    }

    #[tokio::test]
    async fn test_get_rejects_unknown_when_strict() {
        let store =
            SessionStore::with_limits(20, Duration::from_secs(60), SessionPolicy::Strict);
        let err = store.get("nobody").await.unwrap_err();
        assert!(matches!(err, Error::UnknownSession(id) if id == "nobody"));
        assert!(store.is_empty());

        let id = store.create();
        store.append(&id, Role::User, "Bonjour").await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn test_append_is_bounded_and_chronological() {
        let store = store(4);
        let id = store.create();
        for i in 0..10 {
            store
                .append(&id, Role::User, format!("msg {}", i))
                .await
                .unwrap();
            let session = store.get(&id).await.unwrap();
            assert!(session.history.len() <= 4);
        }

        let history = store.get(&id).await.unwrap().history;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 6", "msg 7", "msg 8", "msg 9"]);
    }

    #[tokio::test]
    async fn test_reset_existing_and_unknown() {
        let store = store(20);
        let id = store.create();
        store.append(&id, Role::User, "Bonjour").await.unwrap();

        assert!(store.reset(&id).await);
        let session = store.get(&id).await.unwrap();
        assert!(session.history.is_empty());
        assert_eq!(session.id, id);

        assert!(!store.reset("ghost").await);
        assert!(!store.contains("ghost"));
    }

    #[tokio::test]
    async fn test_peek_never_creates() {
        let store = store(20);
        assert!(store.peek("ghost").await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_guard_record_turn() {
        let store = store(20);
        let id = store.create();
        {
            let mut guard = store.lock(&id).await.unwrap();
            guard.record_turn("greeting", false);
            guard.record_turn("ask_hours", true);
        }
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.last_intent.as_deref(), Some("ask_hours"));
        assert_eq!(session.fallback_count, 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_sessions() {
        let store = store(20);
        let stale = store.create();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let fresh = store.create();

        let fresh_touched = store.peek(&fresh).await.unwrap().last_touched_at;
        // `fresh` is idle exactly ttl here, `stale` a few ms longer.
        let now = fresh_touched + chrono::Duration::seconds(60);

        assert_eq!(store.sweep(now), 1);
        assert!(!store.contains(&stale));
        assert!(store.contains(&fresh));
    }

    #[tokio::test]
    async fn test_sweep_skips_active_sessions() {
        let store = store(20);
        let id = store.create();
        let far_future = Utc::now() + chrono::Duration::hours(5);

        let guard = store.lock(&id).await.unwrap();
        assert_eq!(store.sweep(far_future), 0);
        assert!(store.contains(&id));
        drop(guard);

        assert_eq!(store.sweep(far_future), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_session() {
        let store = Arc::new(store(1000));
        let id = store.create();

        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store
                        .append(&id, Role::User, format!("{}-{}", worker, i))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.get(&id).await.unwrap().history;
        assert_eq!(history.len(), 200);
        for worker in 0..8 {
            let own: Vec<_> = history
                .iter()
                .filter(|m| m.content.starts_with(&format!("{}-", worker)))
                .map(|m| m.content.clone())
                .collect();
            let expected: Vec<_> = (0..25).map(|i| format!("{}-{}", worker, i)).collect();
            assert_eq!(own, expected);
        }
    }
}
