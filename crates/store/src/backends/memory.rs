use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backends::{SessionBackend, StoreError, SESSION_TTL_SECS};
use crate::session::SessionSnapshot;

/// Process-local backend used in tests and single-node setups.
pub struct InMemorySessionBackend {
    sessions: RwLock<HashMap<String, (Instant, SessionSnapshot)>>,
    ttl: Duration,
}

impl Default for InMemorySessionBackend {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(SESSION_TTL_SECS))
    }
}

impl InMemorySessionBackend {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|(expires_at, _)| *expires_at > Instant::now())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    async fn store(&self, session_id: &str, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), (Instant::now() + self.ttl, snapshot.clone()));
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}
