//! Sessions — ordered event history for one (application, user) pair.
//!
//! Sessions live in process memory and are owned by the `SessionStore`.
//! Durability across restarts comes from continuation and compaction
//! memory records, not from the session itself. The session does not
//! enforce wire-role alternation; the model adapter repairs ordering at
//! translation time.

use crate::event::{Event, Part};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An ordered sequence of events belonging to one (app, user) pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn append(&mut self, mut event: Event) -> u64 {
        let position = self.events.len() as u64;
        event.position = position;
        self.events.push(event);
        position
    }

    /// Token estimate: total characters across all parts divided by 4.
    /// Non-text parts are serialized to JSON for sizing.
    pub fn estimated_tokens(&self) -> usize {
        let chars: usize = self
            .events
            .iter()
            .flat_map(|e| e.parts.iter())
            .map(|p| match p {
                Part::Text { text } | Part::Thought { text } => text.len(),
                other => serde_json::to_string(other).map(|s| s.len()).unwrap_or(0),
            })
            .sum();
        chars / 4
    }
}

/// In-process session store keyed by session id.
///
/// One per process, shared via `Arc`. All mutation goes through the store so
/// positions stay monotonic.
pub struct SessionStore {
    inner: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new empty session and return its id.
    pub async fn create(&self, app_name: &str, user_id: &str) -> String {
        let session = Session::new(app_name, user_id);
        let id = session.id.clone();
        self.inner.write().await.insert(id.clone(), session);
        id
    }

    /// Fetch a snapshot of a session.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().await.get(id).cloned()
    }

    /// Find the session for an (app, user) pair, if one exists.
    pub async fn find(&self, app_name: &str, user_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .values()
            .find(|s| s.app_name == app_name && s.user_id == user_id)
            .map(|s| s.id.clone())
    }

    /// Find the session for an (app, user) pair, creating one on first contact.
    pub async fn find_or_create(&self, app_name: &str, user_id: &str) -> String {
        if let Some(id) = self.find(app_name, user_id).await {
            return id;
        }
        self.create(app_name, user_id).await
    }

    /// Append an event; returns its assigned position, or `None` if the
    /// session does not exist.
    pub async fn append(&self, id: &str, event: Event) -> Option<u64> {
        self.inner.write().await.get_mut(id).map(|s| s.append(event))
    }

    /// Delete a session. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
