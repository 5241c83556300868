//! Handoff documents — how the build and ops loops talk to each other.
//!
//! The build loop appends to MANUAL.md ("here is what I built and how to run
//! it"); the ops loop appends to FEEDBACK.md ("here is what broke in the
//! field"). The contract is existence: a loop may not declare itself done
//! until its document exists. Appending preserves earlier handoffs.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::Tool;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANUAL_DOC: &str = "MANUAL.md";
pub const FEEDBACK_DOC: &str = "FEEDBACK.md";

/// Whether the given handoff document exists and is non-empty.
pub fn handoff_exists(ops_dir: &Path, doc: &str) -> bool {
    std::fs::metadata(ops_dir.join(doc))
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

/// Read a handoff document, if present.
pub fn read_handoff(ops_dir: &Path, doc: &str) -> Option<String> {
    std::fs::read_to_string(ops_dir.join(doc)).ok()
}

/// A writer bound to one document.
pub struct HandoffTool {
    tool_name: String,
    description: String,
    path: PathBuf,
}

impl HandoffTool {
    pub fn manual(ops_dir: &Path) -> Self {
        Self {
            tool_name: "write_manual".into(),
            description: format!(
                "Append a section to {MANUAL_DOC}: what was built, how to run and \
                 verify it. Required before declaring the build done."
            ),
            path: ops_dir.join(MANUAL_DOC),
        }
    }

    pub fn feedback(ops_dir: &Path) -> Self {
        Self {
            tool_name: "write_feedback".into(),
            description: format!(
                "Append a section to {FEEDBACK_DOC}: operational findings and \
                 problems for the build loop. Required before declaring ops done."
            ),
            path: ops_dir.join(FEEDBACK_DOC),
        }
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Markdown section to append" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;
        if content.trim().is_empty() {
            return Err(ToolError::InvalidArguments("content must not be empty".into()));
        }

        let io_err = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: self.tool_name.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{content}\n").map_err(io_err)?;

        Ok(serde_json::json!({ "written": self.path.display().to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_preserves_earlier_handoffs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = HandoffTool::manual(dir.path());

        tool.execute(json!({"content": "## v1\nrun with ./start"})).await.unwrap();
        tool.execute(json!({"content": "## v2\nnow with config"})).await.unwrap();

        let content = read_handoff(dir.path(), MANUAL_DOC).unwrap();
        assert!(content.contains("## v1"));
        assert!(content.contains("## v2"));
    }

    #[tokio::test]
    async fn existence_gate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!handoff_exists(dir.path(), MANUAL_DOC));

        let tool = HandoffTool::manual(dir.path());
        tool.execute(json!({"content": "built it"})).await.unwrap();
        assert!(handoff_exists(dir.path(), MANUAL_DOC));
        // the other document is independent
        assert!(!handoff_exists(dir.path(), FEEDBACK_DOC));
    }

    #[tokio::test]
    async fn empty_content_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = HandoffTool::feedback(dir.path());
        assert!(matches!(
            tool.execute(json!({"content": "  "})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(!handoff_exists(dir.path(), FEEDBACK_DOC));
    }

    #[tokio::test]
    async fn creates_ops_dir_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data").join("ops");
        let tool = HandoffTool::manual(&nested);
        tool.execute(json!({"content": "first"})).await.unwrap();
        assert!(handoff_exists(&nested, MANUAL_DOC));
    }
}
