//! Anthropic native Messages API client.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//!
//! Transient failures (transport errors, 429, 5xx, backend overload) are
//! retried up to three times with doubling backoff. Cancellation aborts
//! immediately, including mid-backoff.

use crate::convert::to_wire_messages;
use async_trait::async_trait;
use ironloop_core::error::ModelError;
use ironloop_core::event::Part;
use ironloop_core::model::{ChatReply, ChatRequest, ModelClient, TurnStatus, Usage};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Anthropic Messages API client.
pub struct AnthropicClient {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300)) // model calls can take minutes
            .build()
            .expect("Failed to create HTTP client");

        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Custom transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        self
    }

    /// Delay before retrying after the given failed attempt (1-based).
    fn backoff_delay(attempt: u32) -> Duration {
        let delay = INITIAL_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1));
        delay.min(MAX_BACKOFF)
    }

    /// The JSON body for one Messages API call.
    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_wire_messages(&request.events),
            "max_tokens": request.max_tokens,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools);
        }
        body
    }

    /// One wire call, no retry.
    async fn call(&self, request: &ChatRequest) -> Result<ChatReply, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(request);

        debug!(model = %self.model, events = request.events.len(), "sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "backend error");
            return Err(classify_error(status, &error_body));
        }

        let api_resp: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(reply_from(api_resp))
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn send(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ModelError> {
        for attempt in 1..=MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }

            let result = tokio::select! {
                result = self.call(&request) => result,
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            };

            let err = match result {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt == MAX_ATTEMPTS {
                return Err(ModelError::RetriesExhausted {
                    attempts: MAX_ATTEMPTS,
                    last: Box::new(err),
                });
            }

            let delay = Self::backoff_delay(attempt);
            warn!(attempt, delay_secs = delay.as_secs(), error = %err, "retrying model call");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            }
        }
        unreachable!("retry loop always returns")
    }
}

/// Map a non-200 response to an error. A well-formed backend error carries
/// a typed envelope; anything else is classified by HTTP status alone.
fn classify_error(status: u16, body: &str) -> ModelError {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return ModelError::Api {
            kind: envelope.error.kind,
            message: envelope.error.message,
        };
    }
    ModelError::Http { status, message: body.to_string() }
}

fn reply_from(resp: ApiResponse) -> ChatReply {
    let parts = resp
        .content
        .into_iter()
        .map(|block| match block {
            ResponseBlock::Text { text } => Part::Text { text },
            ResponseBlock::Thinking { thinking } => Part::Thought { text: thinking },
            ResponseBlock::ToolUse { id, name, input } => {
                Part::ToolCall { id, name, args: input }
            }
        })
        .collect();

    // tool_use means the turn isn't done; everything else (end_turn,
    // max_tokens, stop_sequence) closes it.
    let turn = match resp.stop_reason.as_deref() {
        Some("tool_use") => TurnStatus::AwaitingTools,
        _ => TurnStatus::Complete,
    };

    ChatReply {
        parts,
        turn,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

// --- API wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    usage: ApiUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Thinking { thinking: String },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
