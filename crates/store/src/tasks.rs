//! Task table operations.
//!
//! Status transitions are one-directional: pending → in_progress → completed.
//! `start` requires pending; `complete` accepts pending or in_progress (small
//! tasks are often done in one sitting without being started explicitly).
//! Anything else is an `InvalidTransition`.

use crate::Store;
use chrono::{DateTime, Utc};
use ironloop_core::error::StoreError;
use ironloop_core::task::{Task, TaskStatus};
use sqlx::Row;
use tracing::debug;

/// How many completed tasks the rendered list shows.
const RECENT_COMPLETED: u32 = 5;

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StoreError> {
    let parse_ts = |s: String| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };

    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::Storage(format!("status column: {e}")))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| StoreError::Storage(format!("created_at column: {e}")))?;
    let started_at: Option<String> = row
        .try_get("started_at")
        .map_err(|e| StoreError::Storage(format!("started_at column: {e}")))?;
    let completed_at: Option<String> = row
        .try_get("completed_at")
        .map_err(|e| StoreError::Storage(format!("completed_at column: {e}")))?;

    Ok(Task {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::Storage(format!("id column: {e}")))?,
        title: row
            .try_get("title")
            .map_err(|e| StoreError::Storage(format!("title column: {e}")))?,
        description: row
            .try_get("description")
            .map_err(|e| StoreError::Storage(format!("description column: {e}")))?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Pending),
        priority: row
            .try_get("priority")
            .map_err(|e| StoreError::Storage(format!("priority column: {e}")))?,
        created_at: parse_ts(created_at),
        started_at: started_at.map(parse_ts),
        completed_at: completed_at.map(parse_ts),
    })
}

/// Rough relative age, for the rendered list.
fn ago(when: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(when);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "just now".into()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if minutes < 24 * 60 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (24 * 60))
    }
}

impl Store {
    /// Create a task. Priority outside 1–5 falls back to the default 3.
    pub async fn add_task(
        &self,
        title: &str,
        description: &str,
        priority: i32,
    ) -> Result<Task, StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::InvalidArgument("task title is required".into()));
        }
        let priority = if (1..=5).contains(&priority) { priority } else { 3 };

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, description, priority, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(priority)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT task: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, title, priority, "added task");
        self.get_task(id).await?.ok_or(StoreError::TaskNotFound(id))
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("get task: {e}")))?;
        match row {
            Some(ref r) => Ok(Some(row_to_task(r)?)),
            None => Ok(None),
        }
    }

    /// Tasks with the given status, urgent first, oldest first within a
    /// priority. `None` lists everything.
    pub async fn list_tasks(&self, filter: Option<TaskStatus>) -> Result<Vec<Task>, StoreError> {
        let rows = match filter {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM tasks WHERE status = ?1 ORDER BY priority ASC, id ASC",
                )
                .bind(status.as_str())
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query("SELECT * FROM tasks ORDER BY priority ASC, id ASC")
                    .fetch_all(self.pool())
                    .await
            }
        }
        .map_err(|e| StoreError::Storage(format!("list tasks: {e}")))?;

        rows.iter().map(row_to_task).collect()
    }

    /// Pending and in-progress tasks, urgent first.
    pub async fn active_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE status IN ('pending', 'in_progress')
            ORDER BY priority ASC, id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("active tasks: {e}")))?;

        rows.iter().map(row_to_task).collect()
    }

    /// Move a pending task to in_progress.
    pub async fn start_task(&self, id: i64) -> Result<Task, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'in_progress', started_at = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("start task: {e}")))?;

        if result.rows_affected() == 0 {
            return match self.get_task(id).await? {
                Some(_) => Err(StoreError::InvalidTransition { id, operation: "start".into() }),
                None => Err(StoreError::TaskNotFound(id)),
            };
        }
        debug!(id, "started task");
        self.get_task(id).await?.ok_or(StoreError::TaskNotFound(id))
    }

    /// Move a pending or in-progress task to completed.
    pub async fn complete_task(&self, id: i64) -> Result<Task, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'completed', completed_at = ?2
            WHERE id = ?1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(id)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("complete task: {e}")))?;

        if result.rows_affected() == 0 {
            return match self.get_task(id).await? {
                Some(_) => {
                    Err(StoreError::InvalidTransition { id, operation: "complete".into() })
                }
                None => Err(StoreError::TaskNotFound(id)),
            };
        }
        debug!(id, "completed task");
        self.get_task(id).await?.ok_or(StoreError::TaskNotFound(id))
    }

    /// Hard delete.
    pub async fn remove_task(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("remove task: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        debug!(id, "removed task");
        Ok(())
    }

    pub async fn task_count(&self, status: TaskStatus) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM tasks WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("task count: {e}")))?;
        row.try_get("cnt")
            .map_err(|e| StoreError::Storage(format!("cnt column: {e}")))
    }

    /// Render the task list for heartbeat prompt injection: in-progress and
    /// pending tasks with relative ages, the last few completed ones, and a
    /// standing directive when there is nothing to do.
    pub async fn format_active(&self) -> Result<String, StoreError> {
        let active = self.active_tasks().await?;

        let completed_rows = sqlx::query(
            r#"
            SELECT * FROM tasks WHERE status = 'completed'
            ORDER BY completed_at DESC LIMIT ?1
            "#,
        )
        .bind(RECENT_COMPLETED as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("recent completed: {e}")))?;
        let completed: Vec<Task> = completed_rows
            .iter()
            .map(row_to_task)
            .collect::<Result<_, _>>()?;

        let mut out = String::from("=== TASK LIST ===\n");

        let in_progress: Vec<&Task> = active
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .collect();
        let pending: Vec<&Task> = active
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();

        if !in_progress.is_empty() {
            out.push_str("\nIN PROGRESS:\n");
            for task in &in_progress {
                let started = task.started_at.map(ago).unwrap_or_else(|| "?".into());
                out.push_str(&format!(
                    "  #{} [P{}] {} (started {})\n",
                    task.id, task.priority, task.title, started
                ));
            }
        }

        if !pending.is_empty() {
            out.push_str("\nPENDING:\n");
            for task in &pending {
                out.push_str(&format!(
                    "  #{} [P{}] {} (added {})\n",
                    task.id,
                    task.priority,
                    task.title,
                    ago(task.created_at)
                ));
            }
        }

        if !completed.is_empty() {
            out.push_str("\nRECENTLY COMPLETED:\n");
            for task in &completed {
                let when = task.completed_at.map(ago).unwrap_or_else(|| "?".into());
                out.push_str(&format!("  #{} {} ({})\n", task.id, task.title, when));
            }
        }

        if in_progress.is_empty() && pending.is_empty() {
            out.push_str(
                "\nNo tasks in progress or pending. Review recent memories for \
                 unfinished work, and queue anything worth doing with the tasks tool.\n",
            );
        }

        Ok(out)
    }
}
