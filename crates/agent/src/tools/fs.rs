//! Read-only filesystem tools, confined to the project root.
//!
//! Path confinement is canonicalize-then-prefix-check; symlinks pointing
//! outside the root are rejected with the same error as a plain escape.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::Tool;
use std::path::{Path, PathBuf};

const MAX_READ_BYTES: usize = 64 * 1024;
const MAX_SEARCH_RESULTS: usize = 50;

/// Directories never worth searching.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", "data"];

fn resolve_confined(root: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    let joined = root.join(requested);
    let canonical = joined
        .canonicalize()
        .map_err(|e| ToolError::InvalidArguments(format!("{requested}: {e}")))?;
    let root_canonical = root
        .canonicalize()
        .map_err(|e| ToolError::InvalidArguments(format!("bad root: {e}")))?;
    if !canonical.starts_with(&root_canonical) {
        return Err(ToolError::InvalidArguments(format!(
            "{requested}: outside the project root"
        )));
    }
    Ok(canonical)
}

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file under the project root. Large files are truncated."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the project root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;
        let resolved = resolve_confined(&self.root, path)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("{path}: {e}"),
            })?;

        let truncated = content.len() > MAX_READ_BYTES;
        let mut cut = content;
        if truncated {
            let mut idx = MAX_READ_BYTES;
            while !cut.is_char_boundary(idx) {
                idx -= 1;
            }
            cut.truncate(idx);
        }

        Ok(serde_json::json!({
            "path": path,
            "content": cut,
            "truncated": truncated,
        }))
    }
}

pub struct SearchFilesTool {
    root: PathBuf,
}

impl SearchFilesTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn search(&self, pattern: &str, max_results: usize) -> Vec<serde_json::Value> {
        let needle = pattern.to_lowercase();
        let mut results = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                if results.len() >= max_results {
                    return results;
                }
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if path.is_dir() {
                    if !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_str()) {
                        stack.push(path);
                    }
                    continue;
                }
                // binary and huge files are skipped by the read failing
                let Ok(content) = std::fs::read_to_string(&path) else { continue };
                for (line_no, line) in content.lines().enumerate() {
                    if line.to_lowercase().contains(&needle) {
                        let rel = path
                            .strip_prefix(&self.root)
                            .unwrap_or(&path)
                            .display()
                            .to_string();
                        results.push(serde_json::json!({
                            "file": rel,
                            "line": line_no + 1,
                            "text": line.trim(),
                        }));
                        if results.len() >= max_results {
                            return results;
                        }
                    }
                }
            }
        }
        results
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Case-insensitive substring search across text files under the project root."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "max_results": { "type": "integer", "description": "Default 50" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("pattern is required".into()))?;
        if pattern.trim().is_empty() {
            return Err(ToolError::InvalidArguments("pattern must not be empty".into()));
        }
        let max_results = args["max_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(MAX_SEARCH_RESULTS)
            .min(200);

        let matches = self.search(pattern, max_results);
        Ok(serde_json::json!({ "matches": matches }))
    }
}
