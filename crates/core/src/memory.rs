//! Memory record types — the agent's append-only long-term store.
//!
//! Records are inserted and queried, never updated. Kinds distinguish
//! ordinary notes from the control plane's own bookkeeping (continuation
//! records, compaction summaries, build snapshots).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default importance for new records (1 = low, 5 = critical).
pub const DEFAULT_IMPORTANCE: i32 = 3;

/// What kind of record this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    General,
    /// "Where we are, what's next" record written after each invocation.
    Continuation,
    /// Summary produced when a session is compacted.
    Compaction,
    /// Short factual snapshot of what currently exists/works.
    BuildSnapshot,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::General => "general",
            MemoryKind::Continuation => "continuation",
            MemoryKind::Compaction => "compaction",
            MemoryKind::BuildSnapshot => "build_snapshot",
        }
    }

    /// Parse a stored kind tag. Unknown tags fold into `General`.
    pub fn parse(s: &str) -> Self {
        match s {
            "continuation" => MemoryKind::Continuation,
            "compaction" => MemoryKind::Compaction,
            "build_snapshot" => MemoryKind::BuildSnapshot,
            _ => MemoryKind::General,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    pub kind: MemoryKind,
    /// Comma-separated free labels.
    pub tags: String,
    pub importance: i32,
    pub created_at: DateTime<Utc>,
}

/// A record to insert.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub kind: MemoryKind,
    pub tags: String,
    pub importance: i32,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MemoryKind::General,
            tags: String::new(),
            importance: DEFAULT_IMPORTANCE,
        }
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn importance(mut self, importance: i32) -> Self {
        self.importance = importance.clamp(1, 5);
        self
    }
}
