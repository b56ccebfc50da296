//! Session registry
//!
//! Maps session identifiers to the session bags that a
//! [`ContextManager`](crate::ContextManager) binds at the start of each
//! request. Concurrent requests of one session share the same bag.

use crate::bag::ScopeBag;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a random identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe session id to session bag map
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, ScopeBag>>,
}

impl SessionRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session
    pub fn create(&self) -> (SessionId, ScopeBag) {
        let id = SessionId::new();
        let bag = ScopeBag::new();
        self.sessions.insert(id, bag.clone());
        tracing::debug!(session_id = %id, "session created");
        (id, bag)
    }

    /// Bag of an existing session
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<ScopeBag> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Bag of `id`, opening the session when unknown
    pub fn get_or_create(&self, id: SessionId) -> ScopeBag {
        self.sessions.entry(id).or_default().value().clone()
    }

    /// Drop a session and empty its bag.
    ///
    /// Returns whether the session existed.
    pub fn invalidate(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, bag)) => {
                bag.clear();
                tracing::debug!(session_id = %id, "session invalidated");
                true
            }
            None => false,
        }
    }

    /// Number of open sessions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of open session ids
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}
