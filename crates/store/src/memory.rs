//! Memory table operations.
//!
//! Append-only: records are inserted and read, never updated. Search is a
//! case-insensitive substring match over content and tags, recent first.

use crate::Store;
use chrono::{DateTime, Utc};
use ironloop_core::error::StoreError;
use ironloop_core::memory::{MemoryKind, MemoryRecord, NewMemory};
use sqlx::Row;
use tracing::debug;

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, StoreError> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| StoreError::Storage(format!("id column: {e}")))?;
    let content: String = row
        .try_get("content")
        .map_err(|e| StoreError::Storage(format!("content column: {e}")))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| StoreError::Storage(format!("kind column: {e}")))?;
    let tags: String = row
        .try_get("tags")
        .map_err(|e| StoreError::Storage(format!("tags column: {e}")))?;
    let importance: i32 = row
        .try_get("importance")
        .map_err(|e| StoreError::Storage(format!("importance column: {e}")))?;
    let created_at_str: String = row
        .try_get("created_at")
        .map_err(|e| StoreError::Storage(format!("created_at column: {e}")))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(MemoryRecord {
        id,
        content,
        kind: MemoryKind::parse(&kind),
        tags,
        importance,
        created_at,
    })
}

/// Escape SQL LIKE wildcards in user text.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl Store {
    /// Insert a new memory record, returning its id.
    pub async fn store_memory(&self, memory: NewMemory) -> Result<i64, StoreError> {
        if memory.content.trim().is_empty() {
            return Err(StoreError::InvalidArgument("memory content is required".into()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO memories (content, kind, tags, importance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&memory.content)
        .bind(memory.kind.as_str())
        .bind(&memory.tags)
        .bind(memory.importance)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT memory: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, kind = memory.kind.as_str(), "stored memory");
        Ok(id)
    }

    /// Most recent records, newest first.
    pub async fn recall_memories(&self, limit: u32) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM memories ORDER BY id DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("recall: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    /// Most recent records of one kind, newest first.
    pub async fn recall_by_kind(
        &self,
        kind: MemoryKind,
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM memories WHERE kind = ?1 ORDER BY id DESC LIMIT ?2")
            .bind(kind.as_str())
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("recall by kind: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    /// Case-insensitive substring search over content and tags, newest first.
    pub async fn search_memories(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        if term.trim().is_empty() {
            return self.recall_memories(limit).await;
        }

        let pattern = format!("%{}%", escape_like(term));
        let rows = sqlx::query(
            r#"
            SELECT * FROM memories
            WHERE content LIKE ?1 ESCAPE '\' OR tags LIKE ?1 ESCAPE '\'
            ORDER BY id DESC LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("search: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn memory_count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM memories")
            .fetch_one(self.pool())
            .await
            .map_err(|e| StoreError::Storage(format!("count: {e}")))?;
        row.try_get("cnt")
            .map_err(|e| StoreError::Storage(format!("cnt column: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_store;
    use ironloop_core::memory::{MemoryKind, NewMemory};

    #[tokio::test]
    async fn store_and_recall_newest_first() {
        let store = test_store().await;
        store.store_memory(NewMemory::new("first note")).await.unwrap();
        store.store_memory(NewMemory::new("second note")).await.unwrap();

        let records = store.recall_memories(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "second note");
        assert_eq!(records[1].content, "first note");
    }

    #[tokio::test]
    async fn empty_content_rejected() {
        let store = test_store().await;
        assert!(store.store_memory(NewMemory::new("   ")).await.is_err());
    }

    #[tokio::test]
    async fn search_matches_content_and_tags() {
        let store = test_store().await;
        store
            .store_memory(NewMemory::new("deploy went fine").tags("ops,deploy"))
            .await
            .unwrap();
        store
            .store_memory(NewMemory::new("reviewed the parser"))
            .await
            .unwrap();

        let by_content = store.search_memories("DEPLOY", 10).await.unwrap();
        assert_eq!(by_content.len(), 1);

        let by_tag = store.search_memories("ops", 10).await.unwrap();
        assert_eq!(by_tag.len(), 1);

        let none = store.search_memories("kubernetes", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_escapes_like_wildcards() {
        let store = test_store().await;
        store
            .store_memory(NewMemory::new("literal 100% done"))
            .await
            .unwrap();
        store.store_memory(NewMemory::new("unrelated")).await.unwrap();

        // a bare % must not match everything
        let results = store.search_memories("100%", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn recall_by_kind_filters() {
        let store = test_store().await;
        store
            .store_memory(NewMemory::new("where we are").kind(MemoryKind::Continuation))
            .await
            .unwrap();
        store.store_memory(NewMemory::new("ordinary note")).await.unwrap();

        let records = store
            .recall_by_kind(MemoryKind::Continuation, 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, MemoryKind::Continuation);
    }

    #[tokio::test]
    async fn importance_and_kind_round_trip() {
        let store = test_store().await;
        store
            .store_memory(
                NewMemory::new("session summary")
                    .kind(MemoryKind::Compaction)
                    .importance(5),
            )
            .await
            .unwrap();

        let records = store.recall_memories(1).await.unwrap();
        assert_eq!(records[0].kind, MemoryKind::Compaction);
        assert_eq!(records[0].importance, 5);
    }

    #[tokio::test]
    async fn count_tracks_inserts() {
        let store = test_store().await;
        assert_eq!(store.memory_count().await.unwrap(), 0);
        store.store_memory(NewMemory::new("one")).await.unwrap();
        assert_eq!(store.memory_count().await.unwrap(), 1);
    }
}
