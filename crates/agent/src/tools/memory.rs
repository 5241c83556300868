//! Memory tool — store, recall, and search long-term memory records.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::memory::{MemoryKind, NewMemory, DEFAULT_IMPORTANCE};
use ironloop_core::tool::Tool;
use ironloop_store::Store;

const DEFAULT_LIMIT: u32 = 10;

pub struct MemoryTool {
    store: Store,
}

impl MemoryTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

fn storage_err(e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed { tool_name: "memory".into(), reason: e.to_string() }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Long-term memory. Actions: store (content, optional tags/importance/kind), \
         recall (recent records), search (substring over content and tags)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["store", "recall", "search"] },
                "content": { "type": "string", "description": "Text to store" },
                "tags": { "type": "string", "description": "Comma-separated labels" },
                "importance": { "type": "integer", "minimum": 1, "maximum": 5 },
                "kind": { "type": "string", "description": "Record kind, default general" },
                "query": { "type": "string", "description": "Search term" },
                "limit": { "type": "integer", "description": "Max records, default 10" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("action is required".into()))?;
        let limit = args["limit"].as_u64().unwrap_or(DEFAULT_LIMIT as u64) as u32;

        match action {
            "store" => {
                let content = args["content"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;
                let memory = NewMemory::new(content)
                    .kind(MemoryKind::parse(args["kind"].as_str().unwrap_or("general")))
                    .tags(args["tags"].as_str().unwrap_or(""))
                    .importance(
                        args["importance"].as_i64().unwrap_or(DEFAULT_IMPORTANCE as i64) as i32,
                    );
                let id = self.store.store_memory(memory).await.map_err(storage_err)?;
                Ok(serde_json::json!({ "stored": id }))
            }
            "recall" => {
                let records = self.store.recall_memories(limit).await.map_err(storage_err)?;
                Ok(serde_json::json!({ "memories": records }))
            }
            "search" => {
                let query = args["query"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("query is required".into()))?;
                let records = self
                    .store
                    .search_memories(query, limit)
                    .await
                    .map_err(storage_err)?;
                Ok(serde_json::json!({ "memories": records }))
            }
            other => Err(ToolError::InvalidArguments(format!("unknown action: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn tool() -> MemoryTool {
        MemoryTool::new(Store::open("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn store_then_search() {
        let tool = tool().await;
        let out = tool
            .execute(json!({"action": "store", "content": "the deploy script lives in ops/", "tags": "deploy"}))
            .await
            .unwrap();
        assert!(out["stored"].as_i64().unwrap() > 0);

        let found = tool
            .execute(json!({"action": "search", "query": "deploy"}))
            .await
            .unwrap();
        assert_eq!(found["memories"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recall_returns_recent() {
        let tool = tool().await;
        tool.execute(json!({"action": "store", "content": "first"})).await.unwrap();
        tool.execute(json!({"action": "store", "content": "second"})).await.unwrap();

        let out = tool.execute(json!({"action": "recall", "limit": 1})).await.unwrap();
        let memories = out["memories"].as_array().unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0]["content"], "second");
    }

    #[tokio::test]
    async fn missing_arguments_are_typed_errors() {
        let tool = tool().await;
        assert!(matches!(
            tool.execute(json!({})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(json!({"action": "store"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(json!({"action": "explode"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
