//! Model-backed agent — an instruction, a model client, and a tool set.
//!
//! One run is a tool-use conversation: send the session to the model, append
//! and emit the reply, execute any requested tools, feed the results back,
//! and repeat until the model finishes its turn without tool calls. Tool
//! failures become error-payload results for the model to read; they never
//! abort the run.

use async_trait::async_trait;
use ironloop_core::agent::{Agent, InvocationContext};
use ironloop_core::error::{AgentError, ModelError};
use ironloop_core::event::{Event, Part};
use ironloop_core::model::{ChatRequest, ModelClient, TurnStatus};
use ironloop_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 25;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

pub struct ModelAgent {
    name: String,
    instruction: String,
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    output_key: Option<String>,
    max_tool_iterations: u32,
    max_output_tokens: u32,
}

impl ModelAgent {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            model,
            tools,
            output_key: None,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Write this agent's final text into shared state under the given key.
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_max_tool_iterations(mut self, cap: u32) -> Self {
        self.max_tool_iterations = cap.max(1);
        self
    }

    /// Output token cap applied to every model request this agent makes.
    pub fn with_max_output_tokens(mut self, cap: u32) -> Self {
        self.max_output_tokens = cap.max(1);
        self
    }

    async fn execute_tool_calls(&self, reply_parts: &[Part]) -> Vec<Part> {
        let mut results = Vec::new();
        for part in reply_parts {
            let Part::ToolCall { id, name, args } = part else {
                continue;
            };
            debug!(agent = %self.name, tool = %name, "executing tool");
            let payload = match self.tools.execute(name, args.clone()).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(agent = %self.name, tool = %name, error = %err, "tool failed");
                    serde_json::json!({ "error": err.to_string() })
                }
            };
            results.push(Part::ToolResult { call_id: id.clone(), payload });
        }
        results
    }
}

#[async_trait]
impl Agent for ModelAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: InvocationContext) -> Result<(), AgentError> {
        let mut last_text = String::new();

        for _ in 0..self.max_tool_iterations {
            let session = ctx
                .sessions
                .get(&ctx.session_id)
                .await
                .ok_or_else(|| AgentError::SessionNotFound(ctx.session_id.clone()))?;

            let request = ChatRequest::new(session.events, &self.instruction)
                .with_tools(self.tools.definitions())
                .with_max_tokens(self.max_output_tokens);

            let reply = match self.model.send(request, &ctx.cancel).await {
                Ok(reply) => reply,
                Err(ModelError::Cancelled) => return Err(AgentError::Cancelled),
                Err(err) => return Err(err.into()),
            };

            let text = reply.joined_text();
            if !text.is_empty() {
                last_text = text;
            }

            let event = Event::with_parts(&self.name, reply.parts.clone());
            ctx.sessions.append(&ctx.session_id, event.clone()).await;
            if !ctx.emit(event).await {
                return Ok(()); // receiver gone, stop quietly
            }

            if reply.turn == TurnStatus::Complete && reply.tool_calls().is_empty() {
                break;
            }

            let results = self.execute_tool_calls(&reply.parts).await;
            if results.is_empty() {
                break;
            }
            let result_event = Event::with_parts(&self.name, results);
            ctx.sessions.append(&ctx.session_id, result_event.clone()).await;
            if !ctx.emit(result_event).await {
                return Ok(());
            }
        }

        if let Some(key) = &self.output_key {
            ctx.state.set(key.clone(), last_text).await;
        }
        Ok(())
    }
}
