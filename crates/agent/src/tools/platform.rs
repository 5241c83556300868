//! External platform tools — an opaque lookup-then-invoke pair.
//!
//! The platform is a service catalog the core does not interpret:
//! `platform_search(query)` returns candidate tool ids with parameter hints,
//! `platform_call(tool_id, params)` invokes one and returns its text output.
//! When no platform URL is configured the tools answer with a typed failure
//! so the model learns the capability is absent.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::tool::Tool;
use std::time::Duration;

#[derive(Clone)]
pub struct PlatformClient {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            client,
        }
    }

    fn base(&self, tool_name: &str) -> Result<&str, ToolError> {
        self.base_url.as_deref().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: "no platform configured".into(),
        })
    }

    /// Return the response body as JSON when possible, wrapped text otherwise.
    fn into_payload(text: String) -> serde_json::Value {
        serde_json::from_str(&text).unwrap_or(serde_json::json!({ "result": text }))
    }
}

pub struct PlatformSearchTool {
    platform: PlatformClient,
}

impl PlatformSearchTool {
    pub fn new(platform: PlatformClient) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Tool for PlatformSearchTool {
    fn name(&self) -> &str {
        "platform_search"
    }

    fn description(&self) -> &str {
        "Search the external platform's tool catalog. Returns tool ids and parameter hints."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("query is required".into()))?;
        let base = self.platform.base("platform_search")?;

        let text = self
            .platform
            .client
            .get(format!("{base}/tools/search"))
            .query(&[("q", query)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "platform_search".into(),
                reason: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "platform_search".into(),
                reason: e.to_string(),
            })?;

        Ok(PlatformClient::into_payload(text))
    }
}

pub struct PlatformCallTool {
    platform: PlatformClient,
}

impl PlatformCallTool {
    pub fn new(platform: PlatformClient) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Tool for PlatformCallTool {
    fn name(&self) -> &str {
        "platform_call"
    }

    fn description(&self) -> &str {
        "Invoke a platform tool by id with JSON parameters. Returns its output."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tool_id": { "type": "string" },
                "params": { "type": "object" }
            },
            "required": ["tool_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let tool_id = args["tool_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("tool_id is required".into()))?;
        if tool_id.contains('/') {
            return Err(ToolError::InvalidArguments("invalid tool_id".into()));
        }
        let params = args.get("params").cloned().unwrap_or(serde_json::json!({}));
        let base = self.platform.base("platform_call")?;

        let text = self
            .platform
            .client
            .post(format!("{base}/tools/{tool_id}/call"))
            .json(&params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "platform_call".into(),
                reason: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "platform_call".into(),
                reason: e.to_string(),
            })?;

        Ok(PlatformClient::into_payload(text))
    }
}
