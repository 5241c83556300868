//! Tasks tool — the work queue shared by every role.

use async_trait::async_trait;
use ironloop_core::error::ToolError;
use ironloop_core::task::TaskStatus;
use ironloop_core::tool::Tool;
use ironloop_store::Store;

pub struct TasksTool {
    store: Store,
}

impl TasksTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

fn storage_err(e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed { tool_name: "tasks".into(), reason: e.to_string() }
}

fn require_id(args: &serde_json::Value) -> Result<i64, ToolError> {
    args["id"]
        .as_i64()
        .ok_or_else(|| ToolError::InvalidArguments("id is required".into()))
}

#[async_trait]
impl Tool for TasksTool {
    fn name(&self) -> &str {
        "tasks"
    }

    fn description(&self) -> &str {
        "Task queue. Actions: add (title, optional description/priority 1-5), \
         list (optional status filter), start (id), complete (id), remove (id)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "start", "complete", "remove"]
                },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "integer", "minimum": 1, "maximum": 5 },
                "id": { "type": "integer" },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed"]
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("action is required".into()))?;

        match action {
            "add" => {
                let title = args["title"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("title is required".into()))?;
                let description = args["description"].as_str().unwrap_or("");
                let priority = args["priority"].as_i64().unwrap_or(3) as i32;
                let task = self
                    .store
                    .add_task(title, description, priority)
                    .await
                    .map_err(storage_err)?;
                Ok(serde_json::json!({ "task": task }))
            }
            "list" => {
                let filter = match args["status"].as_str() {
                    Some(s) => Some(TaskStatus::parse(s).ok_or_else(|| {
                        ToolError::InvalidArguments(format!("unknown status: {s}"))
                    })?),
                    None => None,
                };
                let tasks = self.store.list_tasks(filter).await.map_err(storage_err)?;
                Ok(serde_json::json!({ "tasks": tasks }))
            }
            "start" => {
                let task = self
                    .store
                    .start_task(require_id(&args)?)
                    .await
                    .map_err(storage_err)?;
                Ok(serde_json::json!({ "task": task }))
            }
            "complete" => {
                let task = self
                    .store
                    .complete_task(require_id(&args)?)
                    .await
                    .map_err(storage_err)?;
                Ok(serde_json::json!({ "task": task }))
            }
            "remove" => {
                let id = require_id(&args)?;
                self.store.remove_task(id).await.map_err(storage_err)?;
                Ok(serde_json::json!({ "removed": id }))
            }
            other => Err(ToolError::InvalidArguments(format!("unknown action: {other}"))),
        }
    }
}
