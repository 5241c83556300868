//! Event-to-wire translation for the Messages API.
//!
//! The backend enforces two ordering rules: the first message must have the
//! requester role, and roles must strictly alternate. Sessions don't satisfy
//! either — several agents write consecutive responder events, and a freshly
//! compacted session may start with an assistant summary. This module renders
//! parts into content blocks and then repairs the sequence so it is always
//! accepted.

use ironloop_core::event::{Event, Part, USER_AUTHOR};
use serde::{Deserialize, Serialize};

/// Synthetic text used when a turn must be fabricated to satisfy ordering.
pub const FILLER_TEXT: &str = "Continue.";

/// Substitute content for a tool that produced no output. Sent as an error
/// result so the model knows the call yielded nothing.
pub const EMPTY_TOOL_RESULT: &str = "Tool returned no response";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireBlock>,
}

impl WireMessage {
    fn filler(role: &str) -> Self {
        Self {
            role: role.into(),
            content: vec![WireBlock::Text { text: FILLER_TEXT.into() }],
        }
    }

    fn has_tool_blocks(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, WireBlock::ToolUse { .. } | WireBlock::ToolResult { .. }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// Which wire role an event maps to. Tool results must travel in requester
/// messages regardless of who produced them.
fn wire_role(event: &Event) -> &'static str {
    let has_result = event
        .parts
        .iter()
        .any(|p| matches!(p, Part::ToolResult { .. }));
    if has_result || event.author == USER_AUTHOR {
        "user"
    } else {
        "assistant"
    }
}

/// Render a tool payload as (content, is_error).
fn render_tool_result(payload: &serde_json::Value) -> (String, bool) {
    match payload {
        serde_json::Value::Null => (EMPTY_TOOL_RESULT.into(), true),
        serde_json::Value::String(s) if s.is_empty() => (EMPTY_TOOL_RESULT.into(), true),
        serde_json::Value::String(s) => (s.clone(), false),
        serde_json::Value::Object(map) if map.is_empty() => (EMPTY_TOOL_RESULT.into(), true),
        serde_json::Value::Object(map) => {
            if let Some(err) = map.get("error") {
                let text = err
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| err.to_string());
                (text, true)
            } else {
                (payload.to_string(), false)
            }
        }
        other => (other.to_string(), false),
    }
}

fn render_blocks(event: &Event) -> Vec<WireBlock> {
    let mut blocks = Vec::new();
    for part in &event.parts {
        match part {
            Part::Text { text } => {
                if !text.is_empty() {
                    blocks.push(WireBlock::Text { text: text.clone() });
                }
            }
            // Thoughts never go back over the wire.
            Part::Thought { .. } => {}
            Part::ToolCall { id, name, args } => {
                blocks.push(WireBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: args.clone(),
                });
            }
            Part::ToolResult { call_id, payload } => {
                let (content, is_error) = render_tool_result(payload);
                blocks.push(WireBlock::ToolResult {
                    tool_use_id: call_id.clone(),
                    content,
                    is_error,
                });
            }
        }
    }
    blocks
}

/// Translate a conversation into a repaired wire message list.
pub fn to_wire_messages(events: &[Event]) -> Vec<WireMessage> {
    let rendered: Vec<WireMessage> = events
        .iter()
        .filter_map(|event| {
            let content = render_blocks(event);
            if content.is_empty() {
                return None;
            }
            Some(WireMessage { role: wire_role(event).into(), content })
        })
        .collect();

    repair(rendered)
}

/// Enforce requester-first and strict alternation.
///
/// Consecutive same-role messages merge when neither carries tool blocks;
/// merging messages with tool blocks would detach a tool_use from its
/// tool_result, so a filler turn of the opposite role is inserted instead.
fn repair(rendered: Vec<WireMessage>) -> Vec<WireMessage> {
    let mut out: Vec<WireMessage> = Vec::with_capacity(rendered.len() + 2);

    for msg in rendered {
        match out.last_mut() {
            None => {
                if msg.role != "user" {
                    out.push(WireMessage::filler("user"));
                }
                out.push(msg);
            }
            Some(prev) if prev.role == msg.role => {
                if !prev.has_tool_blocks() && !msg.has_tool_blocks() {
                    prev.content.extend(msg.content);
                } else {
                    let filler_role = if msg.role == "user" { "assistant" } else { "user" };
                    out.push(WireMessage::filler(filler_role));
                    out.push(msg);
                }
            }
            Some(_) => out.push(msg),
        }
    }

    if out.is_empty() {
        out.push(WireMessage::filler("user"));
    }
    out
}
