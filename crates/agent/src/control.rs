//! Control gate — the non-model member of every loop.
//!
//! Reads the reviewer's verdict from shared state and decides whether the
//! loop should stop. Detection is a case-insensitive substring check, so a
//! reviewer saying "LOOP_DONE — the manual is written" terminates cleanly.
//! `LOOP_PAUSE` wins over `LOOP_DONE` when both appear: a reviewer that is
//! blocked and also claims completion is still blocked.

use async_trait::async_trait;
use ironloop_core::agent::{Agent, InvocationContext};
use ironloop_core::error::AgentError;
use ironloop_core::event::Event;
use tracing::{debug, info};

pub const LOOP_DONE: &str = "LOOP_DONE";
pub const LOOP_PAUSE: &str = "LOOP_PAUSE";

/// Gate agent parameterized by the reviewer's output key.
pub struct ControlGate {
    name: String,
    state_key: String,
}

impl ControlGate {
    pub fn new(name: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state_key: state_key.into(),
        }
    }
}

#[async_trait]
impl Agent for ControlGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: InvocationContext) -> Result<(), AgentError> {
        let Some(verdict) = ctx.state.get(&self.state_key).await else {
            debug!(key = %self.state_key, "no reviewer verdict yet");
            return Ok(());
        };
        if verdict.trim().is_empty() {
            return Ok(());
        }

        let upper = verdict.to_uppercase();
        let note = if upper.contains(LOOP_PAUSE) {
            format!("Loop paused ({LOOP_PAUSE}).")
        } else if upper.contains(LOOP_DONE) {
            format!("Loop complete ({LOOP_DONE}).")
        } else {
            debug!(key = %self.state_key, "no sentinel; loop continues");
            return Ok(());
        };

        info!(key = %self.state_key, %note, "sentinel detected");
        ctx.emit(Event::escalation(&self.name, note)).await;
        Ok(())
    }
}
