//! Events — the unit of agent output.
//!
//! Every agent run produces an ordered stream of events. An event carries
//! its author (which role produced it), a list of content parts, and an
//! optional escalation flag. Escalation is an internal "this sub-tree is
//! done" signal: the loop engine that wraps the producing agent consumes it
//! and returns normally instead of forwarding it upward.

use serde::{Deserialize, Serialize};

/// The author tag used for inbound user messages and synthetic
/// requester-role turns.
pub const USER_AUTHOR: &str = "user";

/// One piece of event content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text output.
    Text { text: String },

    /// Model reasoning. Never echoed back to the backend.
    Thought { text: String },

    /// A request to invoke a tool.
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },

    /// The result of a tool invocation.
    ToolResult {
        call_id: String,
        payload: serde_json::Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// True for tool calls and tool results.
    pub fn is_tool_part(&self) -> bool {
        matches!(self, Part::ToolCall { .. } | Part::ToolResult { .. })
    }
}

/// A single event in a session or an agent's output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Role tag of the producer (e.g. "user", "generator", "build_reviewer").
    pub author: String,

    /// Ordered content parts.
    pub parts: Vec<Part>,

    /// Internal completion signal. Must be consumed by the immediate loop
    /// wrapper, never forwarded to the top-level invocation.
    #[serde(default)]
    pub escalate: bool,

    /// Position within the owning session, assigned on append.
    #[serde(default)]
    pub position: u64,
}

impl Event {
    /// Create a plain text event.
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            parts: vec![Part::text(text)],
            escalate: false,
            position: 0,
        }
    }

    /// Create an inbound user message event.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(USER_AUTHOR, text)
    }

    /// Create an escalation event with a short human-readable note.
    pub fn escalation(author: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            parts: vec![Part::text(note)],
            escalate: true,
            position: 0,
        }
    }

    /// Create an event from arbitrary parts.
    pub fn with_parts(author: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            author: author.into(),
            parts,
            escalate: false,
            position: 0,
        }
    }

    /// All text parts joined with newlines. Thoughts and tool parts are skipped.
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

    /// Whether any part is a tool call or tool result.
    pub fn has_tool_parts(&self) -> bool {
        self.parts.iter().any(Part::is_tool_part)
    }
}
