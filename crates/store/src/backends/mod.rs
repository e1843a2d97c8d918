pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::SessionSnapshot;

/// Sessions expire a day after their last write.
pub const SESSION_TTL_SECS: u64 = 60 * 60 * 24;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session persistence failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session payload could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed snapshot persistence with a TTL. `store` refreshes the expiry;
/// `load` must never return an expired snapshot.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, StoreError>;
    async fn store(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<(), StoreError>;
    async fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}
