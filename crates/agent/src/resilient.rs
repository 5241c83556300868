//! Resilient loop engine.
//!
//! Runs a fixed roster of sub-agents (executor, reviewer, control gate) in
//! order, over and over, until a sub-agent escalates or the iteration cap
//! runs out. Two fault rules:
//!
//! - A failing sub-agent is retried up to three times with growing backoff;
//!   if it still fails, the loop logs and moves on to the next sub-agent
//!   rather than dying. A broken reviewer must not kill a working executor.
//! - Escalation events are consumed here, never forwarded upward. The loop
//!   exits normally as soon as the escalating sub-agent completes.

use async_trait::async_trait;
use ironloop_core::agent::{Agent, InvocationContext};
use ironloop_core::error::AgentError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(2);

pub struct ResilientLoop {
    name: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    /// 0 = unbounded.
    max_iterations: u32,
}

impl ResilientLoop {
    pub fn new(
        name: impl Into<String>,
        sub_agents: Vec<Arc<dyn Agent>>,
        max_iterations: u32,
    ) -> Self {
        Self {
            name: name.into(),
            sub_agents,
            max_iterations,
        }
    }

    /// One sub-agent run: events are drained through a child channel so
    /// escalations can be consumed here. Returns whether it escalated.
    async fn run_once(
        agent: &Arc<dyn Agent>,
        ctx: &InvocationContext,
    ) -> (Result<(), AgentError>, bool) {
        let (tx, mut rx) = mpsc::channel(32);
        let child_ctx = ctx.with_sender(tx);
        let runner = agent.clone();
        let handle = tokio::spawn(async move { runner.run(child_ctx).await });

        let mut escalated = false;
        while let Some(event) = rx.recv().await {
            if event.escalate {
                escalated = true;
                continue; // consumed, never forwarded
            }
            ctx.emit(event).await;
        }

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(AgentError::Failed(format!("sub-agent panicked: {join_err}"))),
        };
        (result, escalated)
    }

    /// Retry wrapper. Exhaustion is logged and swallowed — the loop skips to
    /// the next sub-agent. Cancellation propagates immediately.
    async fn run_with_retry(
        &self,
        agent: &Arc<dyn Agent>,
        ctx: &InvocationContext,
    ) -> Result<bool, AgentError> {
        let mut escalated_any = false;

        for attempt in 1..=MAX_RETRIES {
            let (result, escalated) = Self::run_once(agent, ctx).await;
            escalated_any |= escalated;

            match result {
                Ok(()) => return Ok(escalated_any),
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(err) => {
                    warn!(
                        loop_name = %self.name,
                        sub_agent = %agent.name(),
                        attempt,
                        error = %err,
                        "sub-agent attempt failed"
                    );
                    if attempt < MAX_RETRIES {
                        let delay = RETRY_BASE * attempt;
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
                        }
                    }
                }
            }
        }

        error!(
            loop_name = %self.name,
            sub_agent = %agent.name(),
            "sub-agent failed {MAX_RETRIES} times, skipping"
        );
        Ok(escalated_any)
    }
}

#[async_trait]
impl Agent for ResilientLoop {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: InvocationContext) -> Result<(), AgentError> {
        let mut iteration: u32 = 0;

        loop {
            if self.max_iterations > 0 && iteration >= self.max_iterations {
                info!(loop_name = %self.name, iteration, "max iterations reached");
                return Ok(());
            }
            iteration += 1;

            for agent in &self.sub_agents {
                if ctx.cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let escalated = self.run_with_retry(agent, &ctx).await?;
                if escalated {
                    info!(
                        loop_name = %self.name,
                        sub_agent = %agent.name(),
                        iteration,
                        "escalation received, loop complete"
                    );
                    return Ok(());
                }
            }
        }
    }
}
