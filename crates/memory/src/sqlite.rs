//! SQLite memory backend.
//!
//! One database file holds four tables:
//! - `conversations` — lifecycle records (active / completed / archived)
//! - `turns` — ordered messages with tool metadata, sequence per conversation
//! - `project_facts` — per-project context keyed by (project, kind)
//! - `learned_patterns` — reinforced patterns with confidence and usage
//!
//! Sequence numbers are assigned as max+1 within the owning conversation;
//! a single writer per database is assumed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use codecrafter_core::error::MemoryError;
use codecrafter_core::memory::{
    ConversationSnippet, ConversationStore, LearnedPattern, NewConversation, PatternStore,
    ProjectFact, ProjectStore,
};
use codecrafter_core::turn::{normalize_tool_framing, Turn, TurnRole};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const SNIPPET_LEN: usize = 200;

/// Production SQLite-backed memory: conversations, project facts, and
/// learned patterns behind the narrow repository traits.
pub struct SqliteMemory {
    pool: SqlitePool,
    session_id: String,
    active: Mutex<Option<i64>>,
}

impl SqliteMemory {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            session_id: Uuid::new_v4().to_string(),
            active: Mutex::new(None),
        };
        store.run_migrations().await?;
        info!("SQLite memory backend initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL,
                title       TEXT NOT NULL,
                summary     TEXT,
                status      TEXT NOT NULL DEFAULT 'active',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id),
                sequence        INTEGER NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                tool_name       TEXT,
                tool_parameters TEXT,
                tool_result     TEXT,
                created_at      TEXT NOT NULL,
                UNIQUE(conversation_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS project_facts (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                project       TEXT NOT NULL,
                kind          TEXT NOT NULL,
                data          TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                UNIQUE(project, kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("project_facts table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learned_patterns (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                category         TEXT NOT NULL,
                key_pattern      TEXT NOT NULL,
                payload          TEXT NOT NULL,
                confidence_score REAL NOT NULL DEFAULT 1.0,
                usage_count      INTEGER NOT NULL DEFAULT 1,
                last_used        TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                UNIQUE(category, key_pattern)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("learned_patterns table: {e}")))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, sequence)",
            "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_patterns_category ON learned_patterns(category)",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("index: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Create and activate a conversation row.
    async fn insert_conversation(&self, title: &str) -> Result<i64, MemoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO conversations (session_id, title, status, created_at, updated_at)
             VALUES (?, ?, 'active', ?, ?)",
        )
        .bind(&self.session_id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("insert conversation: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// The active conversation id, creating one lazily on first use.
    async fn ensure_active(&self) -> Result<i64, MemoryError> {
        let mut active = self.active.lock().await;
        if let Some(id) = *active {
            return Ok(id);
        }
        let title = format!("Conversation {}", Utc::now().format("%Y-%m-%d %H:%M"));
        let id = self.insert_conversation(&title).await?;
        *active = Some(id);
        Ok(id)
    }

    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn truncate_snippet(content: &str) -> String {
        if content.chars().count() <= SNIPPET_LEN {
            return content.to_string();
        }
        let cut: String = content.chars().take(SNIPPET_LEN).collect();
        format!("{cut}...")
    }
}

#[async_trait]
impl ConversationStore for SqliteMemory {
    async fn begin(&self, title: &str) -> Result<NewConversation, MemoryError> {
        let id = self.insert_conversation(title).await?;
        *self.active.lock().await = Some(id);
        Ok(NewConversation {
            id,
            message: format!("Started conversation '{title}'"),
        })
    }

    async fn save_turn(
        &self,
        role: TurnRole,
        content: &str,
        tool_name: Option<&str>,
        tool_parameters: Option<&BTreeMap<String, String>>,
        tool_result: Option<&str>,
    ) -> Result<i64, MemoryError> {
        let conversation_id = self.ensure_active().await?;

        let sequence: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM turns WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("next sequence: {e}")))?
        .try_get("next")
        .map_err(|e| MemoryError::QueryFailed(format!("next column: {e}")))?;

        let params_json = tool_parameters
            .map(|p| serde_json::to_string(p))
            .transpose()
            .map_err(|e| MemoryError::Storage(format!("parameter serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO turns (conversation_id, sequence, role, content, tool_name,
                                tool_parameters, tool_result, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(sequence)
        .bind(role.as_str())
        .bind(content)
        .bind(tool_name)
        .bind(params_json)
        .bind(tool_result)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("insert turn: {e}")))?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("touch conversation: {e}")))?;

        Ok(sequence)
    }

    async fn history(&self, limit: usize) -> Result<Vec<Turn>, MemoryError> {
        let Some(conversation_id) = *self.active.lock().await else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT sequence, role, content, tool_name, tool_parameters, tool_result, created_at
             FROM turns WHERE conversation_id = ? ORDER BY sequence LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("history: {e}")))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let role_raw: String = row
                .try_get("role")
                .map_err(|e| MemoryError::QueryFailed(format!("role column: {e}")))?;
            let content: String = row
                .try_get("content")
                .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
            let params_json: Option<String> = row
                .try_get("tool_parameters")
                .map_err(|e| MemoryError::QueryFailed(format!("tool_parameters column: {e}")))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

            turns.push(Turn {
                sequence: row
                    .try_get("sequence")
                    .map_err(|e| MemoryError::QueryFailed(format!("sequence column: {e}")))?,
                role: TurnRole::parse(&role_raw)
                    .ok_or_else(|| MemoryError::QueryFailed(format!("unknown role '{role_raw}'")))?,
                content: normalize_tool_framing(&content),
                tool_name: row
                    .try_get("tool_name")
                    .map_err(|e| MemoryError::QueryFailed(format!("tool_name column: {e}")))?,
                tool_parameters: params_json
                    .map(|json| serde_json::from_str(&json))
                    .transpose()
                    .map_err(|e| MemoryError::QueryFailed(format!("parameter json: {e}")))?,
                tool_result: row
                    .try_get("tool_result")
                    .map_err(|e| MemoryError::QueryFailed(format!("tool_result column: {e}")))?,
                timestamp: Self::parse_timestamp(&created_at),
            });
        }

        Ok(turns)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSnippet>, MemoryError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT DISTINCT c.id, c.title, c.updated_at
             FROM conversations c JOIN turns t ON t.conversation_id = c.id
             WHERE t.content LIKE ?
             ORDER BY c.updated_at DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("conversation search: {e}")))?;

        let mut snippets = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
            let title: String = row
                .try_get("title")
                .map_err(|e| MemoryError::QueryFailed(format!("title column: {e}")))?;
            let updated_at: String = row
                .try_get("updated_at")
                .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))?;

            let content: Option<String> = sqlx::query(
                "SELECT content FROM turns
                 WHERE conversation_id = ? AND content LIKE ?
                 ORDER BY sequence LIMIT 1",
            )
            .bind(id)
            .bind(&pattern)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("snippet fetch: {e}")))?
            .map(|r| r.try_get("content"))
            .transpose()
            .map_err(|e| MemoryError::QueryFailed(format!("snippet column: {e}")))?;

            snippets.push(ConversationSnippet {
                conversation_id: id,
                title,
                updated_at: Self::parse_timestamp(&updated_at),
                snippet: Self::truncate_snippet(&normalize_tool_framing(
                    content.as_deref().unwrap_or(""),
                )),
            });
        }

        Ok(snippets)
    }

    async fn complete(&self, summary: &str) -> Result<(), MemoryError> {
        let mut active = self.active.lock().await;
        let Some(conversation_id) = *active else {
            return Err(MemoryError::NoConversation);
        };

        sqlx::query(
            "UPDATE conversations SET status = 'completed', summary = ?, updated_at = ? WHERE id = ?",
        )
        .bind(summary)
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("complete conversation: {e}")))?;

        // The next saved turn starts a fresh conversation.
        *active = None;
        Ok(())
    }

    async fn archive_older_than(&self, days: i64) -> Result<u64, MemoryError> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let result = sqlx::query(
            "UPDATE conversations SET status = 'archived'
             WHERE status != 'archived' AND updated_at < ?",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("archive: {e}")))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProjectStore for SqliteMemory {
    async fn save_fact(
        &self,
        project: &str,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let data_json = serde_json::to_string(data)
            .map_err(|e| MemoryError::Storage(format!("fact serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO project_facts (project, kind, data, last_accessed, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(project, kind) DO UPDATE SET data = excluded.data,
                 last_accessed = excluded.last_accessed",
        )
        .bind(project)
        .bind(kind)
        .bind(&data_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("save fact: {e}")))?;

        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProjectFact>, MemoryError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT project, kind, data, last_accessed FROM project_facts
             WHERE project LIKE ? OR kind LIKE ? OR data LIKE ?
             ORDER BY last_accessed DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("fact search: {e}")))?;

        let mut facts = Vec::with_capacity(rows.len());
        for row in rows {
            let data_json: String = row
                .try_get("data")
                .map_err(|e| MemoryError::QueryFailed(format!("data column: {e}")))?;
            let last_accessed: String = row
                .try_get("last_accessed")
                .map_err(|e| MemoryError::QueryFailed(format!("last_accessed column: {e}")))?;

            facts.push(ProjectFact {
                project: row
                    .try_get("project")
                    .map_err(|e| MemoryError::QueryFailed(format!("project column: {e}")))?,
                kind: row
                    .try_get("kind")
                    .map_err(|e| MemoryError::QueryFailed(format!("kind column: {e}")))?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| MemoryError::QueryFailed(format!("fact json: {e}")))?,
                last_accessed: Self::parse_timestamp(&last_accessed),
            });
        }

        Ok(facts)
    }
}

#[async_trait]
impl PatternStore for SqliteMemory {
    async fn learn(
        &self,
        category: &str,
        pattern: &str,
        payload: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| MemoryError::Storage(format!("payload serialization: {e}")))?;
        let now = Utc::now().to_rfc3339();

        // Insert new at confidence 1.0, or reinforce: usage +1, confidence
        // +0.1 capped at 1.0, payload refreshed.
        sqlx::query(
            "INSERT INTO learned_patterns
                 (category, key_pattern, payload, confidence_score, usage_count, last_used, created_at)
             VALUES (?, ?, ?, 1.0, 1, ?, ?)
             ON CONFLICT(category, key_pattern) DO UPDATE SET
                 usage_count = usage_count + 1,
                 confidence_score = MIN(1.0, confidence_score + 0.1),
                 payload = excluded.payload,
                 last_used = excluded.last_used",
        )
        .bind(category)
        .bind(pattern)
        .bind(&payload_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("learn pattern: {e}")))?;

        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LearnedPattern>, MemoryError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT category, key_pattern, payload, confidence_score, usage_count, last_used
             FROM learned_patterns WHERE key_pattern LIKE ?
             ORDER BY confidence_score DESC, usage_count DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("pattern search: {e}")))?;

        let mut patterns = Vec::with_capacity(rows.len());
        for row in rows {
            let payload_json: String = row
                .try_get("payload")
                .map_err(|e| MemoryError::QueryFailed(format!("payload column: {e}")))?;
            let last_used: String = row
                .try_get("last_used")
                .map_err(|e| MemoryError::QueryFailed(format!("last_used column: {e}")))?;

            patterns.push(LearnedPattern {
                category: row
                    .try_get("category")
                    .map_err(|e| MemoryError::QueryFailed(format!("category column: {e}")))?,
                key_pattern: row
                    .try_get("key_pattern")
                    .map_err(|e| MemoryError::QueryFailed(format!("key_pattern column: {e}")))?,
                payload: serde_json::from_str(&payload_json)
                    .map_err(|e| MemoryError::QueryFailed(format!("payload json: {e}")))?,
                confidence_score: row
                    .try_get("confidence_score")
                    .map_err(|e| MemoryError::QueryFailed(format!("confidence column: {e}")))?,
                usage_count: row
                    .try_get("usage_count")
                    .map_err(|e| MemoryError::QueryFailed(format!("usage_count column: {e}")))?,
                last_used: Self::parse_timestamp(&last_used),
            });
        }

        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecrafter_core::turn::{frame_tool_error, frame_tool_success};

    async fn open_store(dir: &tempfile::TempDir) -> SqliteMemory {
        let path = dir.path().join("memory.db");
        SqliteMemory::new(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn save_and_retrieve_turns_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .save_turn(TurnRole::User, "first", None, None, None)
            .await
            .unwrap();
        store
            .save_turn(TurnRole::Model, "second", None, None, None)
            .await
            .unwrap();
        store
            .save_turn(TurnRole::User, "third", None, None, None)
            .await
            .unwrap();

        let history = store.history(50).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Model);
        assert_eq!(history[2].content, "third");
        assert_eq!(
            history.iter().map(|t| t.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn history_normalizes_tool_framing_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let mut params = BTreeMap::new();
        params.insert("path".to_string(), ".".to_string());
        let framed = frame_tool_success("list_files", "src/\nCargo.toml");
        store
            .save_turn(
                TurnRole::User,
                &framed,
                Some("list_files"),
                Some(&params),
                Some("src/\nCargo.toml"),
            )
            .await
            .unwrap();

        let first = store.history(50).await.unwrap();
        assert_eq!(first[0].content, "Tool: list_files\nResult: src/\nCargo.toml");
        assert_eq!(first[0].tool_name.as_deref(), Some("list_files"));
        assert_eq!(
            first[0].tool_parameters.as_ref().unwrap().get("path"),
            Some(&".".to_string())
        );

        // Retrieval must normalize identically every time.
        let second = store.history(50).await.unwrap();
        assert_eq!(first[0].content, second[0].content);
    }

    #[tokio::test]
    async fn error_framing_normalizes_too() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let framed = frame_tool_error("read_file", "No such file");
        store
            .save_turn(TurnRole::User, &framed, Some("read_file"), None, None)
            .await
            .unwrap();

        let history = store.history(50).await.unwrap();
        assert_eq!(history[0].content, "Tool: read_file\nError: No such file");
    }

    #[tokio::test]
    async fn begin_returns_structured_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let created = store.begin("fix the parser").await.unwrap();
        assert!(created.id > 0);
        assert!(created.message.contains("fix the parser"));

        // Turns land in the explicitly begun conversation.
        store
            .save_turn(TurnRole::User, "hello", None, None, None)
            .await
            .unwrap();
        let history = store.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn complete_starts_a_fresh_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .save_turn(TurnRole::User, "task one", None, None, None)
            .await
            .unwrap();
        store.complete("did task one").await.unwrap();

        // New turn goes to a new active conversation.
        store
            .save_turn(TurnRole::User, "task two", None, None, None)
            .await
            .unwrap();
        let history = store.history(50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "task two");
    }

    #[tokio::test]
    async fn complete_without_conversation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let err = store.complete("nothing").await.unwrap_err();
        assert!(matches!(err, MemoryError::NoConversation));
    }

    #[tokio::test]
    async fn search_finds_prior_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .save_turn(TurnRole::User, "set up the postgres schema", None, None, None)
            .await
            .unwrap();
        store.complete("schema done").await.unwrap();
        store
            .save_turn(TurnRole::User, "write a parser", None, None, None)
            .await
            .unwrap();

        let hits = ConversationStore::search(&store, "postgres", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("postgres"));

        let none = ConversationStore::search(&store, "kubernetes", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn archive_by_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .save_turn(TurnRole::User, "old stuff", None, None, None)
            .await
            .unwrap();

        // Fresh conversations are not archived.
        assert_eq!(store.archive_older_than(30).await.unwrap(), 0);

        // Backdate and retry.
        sqlx::query("UPDATE conversations SET updated_at = ?")
            .bind((Utc::now() - Duration::days(120)).to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();
        assert_eq!(store.archive_older_than(30).await.unwrap(), 1);

        // Archiving is idempotent for already-archived rows.
        assert_eq!(store.archive_older_than(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn project_facts_upsert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .save_fact("webapp", "file_structure", &serde_json::json!({"files": 12}))
            .await
            .unwrap();
        store
            .save_fact("webapp", "file_structure", &serde_json::json!({"files": 14}))
            .await
            .unwrap();

        let facts = ProjectStore::search(&store, "webapp", 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].data["files"], 14);
    }

    #[tokio::test]
    async fn patterns_reinforce_on_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let payload = serde_json::json!({"success": true});
        store.learn("tool_usage", "read_file", &payload).await.unwrap();
        store.learn("tool_usage", "read_file", &payload).await.unwrap();
        store.learn("tool_usage", "read_file", &payload).await.unwrap();

        let patterns = PatternStore::search(&store, "read_file", 10).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].usage_count, 3);
        assert!(patterns[0].confidence_score <= 1.0);
    }

    #[tokio::test]
    async fn pattern_search_ranks_by_confidence_then_usage() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let payload = serde_json::json!({});
        // "file_hot" reinforced twice, "file_cold" once.
        store.learn("tool_usage", "file_hot", &payload).await.unwrap();
        store.learn("tool_usage", "file_hot", &payload).await.unwrap();
        store.learn("tool_usage", "file_cold", &payload).await.unwrap();

        let patterns = PatternStore::search(&store, "file", 10).await.unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].key_pattern, "file_hot");
    }
}
