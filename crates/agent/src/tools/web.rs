//! Web fetch tool for the research role.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::Tool;
use std::time::Duration;

const MAX_CONTENT_BYTES: usize = 100 * 1024;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over http/https and return its body as text. Large bodies are truncated."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("url is required".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments("only http/https urls".into()));
        }

        let fetch_err = |e: reqwest::Error| ToolError::ExecutionFailed {
            tool_name: "web_fetch".into(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        let status = response.status().as_u16();
        let mut body = response.text().await.map_err(fetch_err)?;

        let truncated = body.len() > MAX_CONTENT_BYTES;
        if truncated {
            let mut idx = MAX_CONTENT_BYTES;
            while !body.is_char_boundary(idx) {
                idx -= 1;
            }
            body.truncate(idx);
        }

        Ok(serde_json::json!({
            "url": url,
            "status": status,
            "content": body,
            "truncated": truncated,
        }))
    }
}
