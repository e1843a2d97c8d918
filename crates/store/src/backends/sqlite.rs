use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;

use crate::backends::{SessionBackend, StoreError, SESSION_TTL_SECS};
use crate::session::SessionSnapshot;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// One JSON blob per session id with a unix-seconds expiry, refreshed on
/// every write and enforced on read.
pub struct SqliteSessionBackend {
    pool: DbPool,
}

impl SqliteSessionBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversation_sessions (
                session_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversation_sessions_expires_at
             ON conversation_sessions (expires_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT payload FROM conversation_sessions
             WHERE session_id = ?1 AND expires_at > ?2",
        )
        .bind(session_id)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_string(snapshot)?;
        let expires_at = Utc::now().timestamp() + SESSION_TTL_SECS as i64;
        sqlx::query(
            "INSERT INTO conversation_sessions (session_id, payload, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (session_id) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at",
        )
        .bind(session_id)
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM conversation_sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
