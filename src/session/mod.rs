//! Per-visitor session storage.
//!
//! The gate only needs a key/value store scoped to one visitor. This module
//! provides the `SessionStore` trait, an in-memory implementation suitable for
//! a single node, and [`UserSession`], a handle binding a store to one
//! session id with typed access to the authentication state.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Entry under which the authentication state is stored.
pub const SESSION_KEY: &str = "_raven";

/// A fresh, unguessable session id.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Result type for session store operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Authentication progress for one visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    NoSession,
    /// Redirected to the authentication server, callback not yet seen.
    PendingVerification,
    Authenticated {
        principal: String,
        #[serde(default)]
        ptags: Vec<String>,
    },
}

impl SessionState {
    /// The principal, if authenticated with a non-empty one.
    pub fn principal(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { principal, .. } if !principal.is_empty() => {
                Some(principal)
            }
            _ => None,
        }
    }
}

/// Key/value storage partitioned by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a value for `key` in session `id`.
    async fn get(&self, id: &str, key: &str) -> SessionResult<Option<String>>;

    /// Set `key` in session `id`, creating the session if needed.
    async fn set(&self, id: &str, key: &str, value: String) -> SessionResult<()>;

    /// Whether session `id` exists and has not expired.
    async fn contains(&self, id: &str) -> SessionResult<bool>;

    /// Move the contents of session `from` to `to`, dropping `from`.
    async fn rename(&self, from: &str, to: &str) -> SessionResult<()>;

    /// Drop session `id` entirely.
    async fn remove(&self, id: &str) -> SessionResult<()>;

    /// Remove expired sessions, returning how many were dropped.
    async fn cleanup_expired(&self) -> SessionResult<usize>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

struct StoredSession {
    values: HashMap<String, String>,
    last_access: DateTime<Utc>,
}

/// In-memory session storage (single-node only).
///
/// Sessions expire after `idle_timeout` without access.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    idle_timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn is_expired(&self, session: &StoredSession, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.idle_timeout)
            .map(|timeout| now >= session.last_access + timeout)
            .unwrap_or(false)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str, key: &str) -> SessionResult<Option<String>> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };
        if self.is_expired(session, now) {
            sessions.remove(id);
            return Ok(None);
        }
        session.last_access = now;
        Ok(session.values.get(key).cloned())
    }

    async fn set(&self, id: &str, key: &str, value: String) -> SessionResult<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.to_string()).or_insert_with(|| StoredSession {
            values: HashMap::new(),
            last_access: now,
        });
        if self.is_expired(session, now) {
            session.values.clear();
        }
        session.last_access = now;
        session.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn contains(&self, id: &str) -> SessionResult<bool> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .is_some_and(|session| !self.is_expired(session, now)))
    }

    async fn rename(&self, from: &str, to: &str) -> SessionResult<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let values = sessions
            .remove(from)
            .filter(|session| !self.is_expired(session, now))
            .map(|session| session.values)
            .unwrap_or_default();
        sessions.insert(
            to.to_string(),
            StoredSession {
                values,
                last_access: now,
            },
        );
        Ok(())
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        Ok(before - sessions.len())
    }
}

/// A session store bound to one visitor's session id.
#[derive(Clone)]
pub struct UserSession {
    store: SharedSessionStore,
    id: String,
}

impl UserSession {
    pub fn new(store: SharedSessionStore, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current authentication state. A missing or unreadable entry reads as
    /// [`SessionState::NoSession`].
    pub async fn state(&self) -> SessionResult<SessionState> {
        let Some(raw) = self.store.get(&self.id, SESSION_KEY).await? else {
            return Ok(SessionState::NoSession);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session state");
                Ok(SessionState::NoSession)
            }
        }
    }

    /// Move this session to a new id, keeping its contents. The old id
    /// stops resolving.
    pub async fn regenerate(&mut self) -> SessionResult<()> {
        let id = new_session_id();
        self.store.rename(&self.id, &id).await?;
        self.id = id;
        Ok(())
    }

    pub async fn set_state(&self, state: &SessionState) -> SessionResult<()> {
        let raw = serde_json::to_string(state)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.store.set(&self.id, SESSION_KEY, raw).await
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession").field("id", &self.id).finish()
    }
}

/// Spawn a task that periodically drops expired sessions.
pub fn start_cleanup_task(
    store: SharedSessionStore,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Cleaned up expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}
