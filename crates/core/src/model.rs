//! ModelClient trait — the abstraction over the chat-completion backend.
//!
//! A client turns an ordered conversation into one wire call and converts
//! the reply back into parts. It is stateless per call; retry/backoff and
//! message-ordering repair live in the implementation.

use crate::error::ModelError;
use crate::event::{Event, Part};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A tool definition sent to the backend so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input.
    pub input_schema: serde_json::Value,
}

/// One request to the backend.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The conversation, oldest first.
    pub events: Vec<Event>,

    /// System prompt, sent out-of-band from the message list.
    pub system: String,

    /// Tools available this turn.
    pub tools: Vec<ToolDefinition>,

    /// Output token cap.
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(events: Vec<Event>, system: impl Into<String>) -> Self {
        Self {
            events,
            system: system.into(),
            tools: Vec::new(),
            max_tokens: 8192,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Whether the model considers its turn finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// End of turn (or output-length cap). Nothing more expected.
    Complete,
    /// The model stopped to call tools; the caller should execute them and
    /// continue the exchange.
    AwaitingTools,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One reply from the backend.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub parts: Vec<Part>,
    pub turn: TurnStatus,
    pub usage: Usage,
}

impl ChatReply {
    /// Tool calls requested in this reply, in order.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall { id, name, args } => Some((id.as_str(), name.as_str(), args)),
                _ => None,
            })
            .collect()
    }

    /// All text parts joined with newlines.
    pub fn joined_text(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        texts.join("\n")
    }
}

/// The core ModelClient trait.
///
/// The agent layer calls `send` without knowing which backend is wired in;
/// tests substitute scripted implementations.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name (e.g. the model identifier).
    fn name(&self) -> &str;

    /// Send one request. Transient failures are retried internally;
    /// cancellation aborts immediately, including during backoff.
    async fn send(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ModelError>;
}
