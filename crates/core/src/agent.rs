//! Agent trait — the abstraction every loop role implements.
//!
//! An agent is "run → stream of events, may fail". Events are emitted
//! through the invocation context's channel; the consumer owning the
//! receiver sees them in production order. Wrappers (the resilient loop
//! engine) rebind the sender with [`InvocationContext::with_sender`] so
//! they can interpose on a child's output — this is how escalation events
//! get consumed instead of forwarded.

use crate::error::AgentError;
use crate::event::Event;
use crate::session::SessionStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared key/value state for one invocation.
///
/// Reviewer output keys live here; the control gate reads them.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().await.insert(key.into(), value.into());
    }
}

/// Everything an agent needs for one run: the session, shared state, the
/// cancellation token, and the channel its events flow out on.
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub session_id: String,
    pub sessions: Arc<SessionStore>,
    pub state: SharedState,
    pub cancel: CancellationToken,
    events: mpsc::Sender<Event>,
}

impl InvocationContext {
    pub fn new(
        session_id: impl Into<String>,
        sessions: Arc<SessionStore>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            invocation_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            sessions,
            state: SharedState::new(),
            cancel: CancellationToken::new(),
            events,
        }
    }

    /// Emit an event to the consumer. Returns `false` when the receiver is
    /// gone, which producers treat as a stop signal.
    pub async fn emit(&self, event: Event) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// A copy of this context whose events flow to a different receiver.
    /// Session, shared state, and cancellation are preserved.
    pub fn with_sender(&self, events: mpsc::Sender<Event>) -> Self {
        Self {
            events,
            ..self.clone()
        }
    }

    /// A copy of this context with its own cancellation token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }
}

/// The core Agent trait.
///
/// Variants: model-backed agent, resilient loop agent, control gate.
/// Composition is via `Arc<dyn Agent>`, not inheritance.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The role tag this agent writes into its events.
    fn name(&self) -> &str;

    /// Run to completion, emitting events through `ctx`.
    async fn run(&self, ctx: InvocationContext) -> Result<(), AgentError>;
}
