//! Test doubles shared across this crate's test modules.

use async_trait::async_trait;
use ironloop_core::error::ModelError;
use ironloop_core::event::Part;
use ironloop_core::model::{ChatReply, ChatRequest, ModelClient, TurnStatus, Usage};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Scripted client replaying canned replies in order. Exhaustion is an
/// `InvalidResponse` error so a test that over-consumes fails loudly.
/// Requests are recorded for assertions on what was actually sent.
pub struct ScriptedModel {
    replies: Mutex<Vec<ChatReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(mut replies: Vec<ChatReply>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn text_reply(text: &str) -> ChatReply {
        ChatReply {
            parts: vec![Part::text(text)],
            turn: TurnStatus::Complete,
            usage: Usage::default(),
        }
    }

    pub fn tool_reply(id: &str, name: &str, args: serde_json::Value) -> ChatReply {
        ChatReply {
            parts: vec![Part::ToolCall { id: id.into(), name: name.into(), args }],
            turn: TurnStatus::AwaitingTools,
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        request: ChatRequest,
        _cancel: &CancellationToken,
    ) -> Result<ChatReply, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".into()))
    }
}
