//! Shell tool — command execution for the executor roles.
//!
//! Runs through `sh -c` in the project root with a hard timeout. Output is
//! truncated; the exit code always comes back so the model can react to
//! failures instead of guessing.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::Tool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub struct ShellTool {
    workdir: PathBuf,
}

impl ShellTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }
}

fn clip(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        return text.into_owned();
    }
    let mut idx = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    format!("{}\n[output truncated]", &text[..idx])
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root. Returns stdout, stderr, and exit code."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout_secs": { "type": "integer", "description": "Default 120, max 600" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;
        let timeout_secs = args["timeout_secs"]
            .as_u64()
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        debug!(%command, "running shell command");

        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workdir)
                .output(),
        )
        .await
        .map_err(|_| ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: format!("timed out after {timeout_secs}s"),
        })?
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: e.to_string(),
        })?;

        Ok(serde_json::json!({
            "stdout": clip(&output.stdout),
            "stderr": clip(&output.stderr),
            "exit_code": output.status.code().unwrap_or(-1),
        }))
    }
}
