//! Conversation persistence
//!
//! The history is kept as one JSON-serialized entry under a fixed key in a
//! small SQLite key-value table. Every operation fails soft: read problems
//! yield an empty history, write problems are logged and dropped.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::conversation::Message;

/// Default name of the persisted entry
pub const DEFAULT_KEY: &str = "conversationHistory";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable home of the conversation history.
///
/// Implementations never surface errors to the session.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The stored history, or empty when absent or unreadable.
    async fn load(&self) -> Vec<Message>;

    /// Overwrite the stored history.
    async fn save(&self, history: &[Message]);

    /// Remove the stored entry entirely.
    async fn clear(&self);
}

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
    key: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`
    pub async fn open(db_path: &Path, key: impl Into<String>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, key).await
    }

    /// In-memory database, gone when the store is dropped
    #[cfg(test)]
    pub async fn in_memory(key: impl Into<String>) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool, key).await
    }

    async fn with_pool(pool: SqlitePool, key: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            key: key.into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_raw(&self) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn try_load(&self) -> Result<Vec<Message>, StoreError> {
        match self.read_raw().await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn try_save(&self, history: &[Message]) -> Result<(), StoreError> {
        let value = serde_json::to_string(history)?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(&self.key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(&self.key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn load(&self) -> Vec<Message> {
        match self.try_load().await {
            Ok(history) => {
                tracing::debug!(key = %self.key, messages = history.len(), "Loaded history");
                history
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding unreadable history");
                Vec::new()
            }
        }
    }

    async fn save(&self, history: &[Message]) {
        if let Err(e) = self.try_save(history).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist history");
        }
    }

    async fn clear(&self) {
        if let Err(e) = self.try_clear().await {
            tracing::warn!(key = %self.key, error = %e, "Failed to clear stored history");
        }
    }
}

/// Process-local store for ephemeral sessions
#[derive(Default)]
pub struct InMemoryStore {
    entry: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn load(&self) -> Vec<Message> {
        let raw = self.entry().clone();
        raw.and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    async fn save(&self, history: &[Message]) {
        match serde_json::to_string(history) {
            Ok(value) => *self.entry() = Some(value),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize history"),
        }
    }

    async fn clear(&self) {
        *self.entry() = None;
    }
}

/// Pick the store for this run.
///
/// A database that cannot be opened is a persistence failure like any other:
/// it is logged and the session carries on with an in-memory store.
pub async fn open_store(
    db_path: &Path,
    key: &str,
    ephemeral: bool,
) -> Arc<dyn ConversationStore> {
    if ephemeral {
        tracing::info!("Ephemeral session, history will not be saved");
        return Arc::new(InMemoryStore::new());
    }

    match SqliteStore::open(db_path, key).await {
        Ok(store) => {
            tracing::info!(path = %db_path.display(), key = %key, "Opened history store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                path = %db_path.display(),
                error = %e,
                "History store unavailable, keeping this session in memory"
            );
            Arc::new(InMemoryStore::new())
        }
    }
}
