pub mod backends;
pub mod session;

pub use backends::memory::InMemorySessionBackend;
pub use backends::sqlite::{connect_with_settings, DbPool, SqliteSessionBackend};
pub use backends::{SessionBackend, StoreError, SESSION_TTL_SECS};
pub use session::{SessionSnapshot, SessionStore};
