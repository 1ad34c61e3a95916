//! Session store factory.
//!
//! Builds the configured [`SessionStore`] backend behind a
//! [`BoxSessionStore`], returning the Redis handle separately so the
//! process can shut it down explicitly.

use std::sync::Arc;

use tracing::info;

use parley_core::session::box_store::BoxSessionStore;
use parley_core::session::memory::InMemorySessionStore;
use parley_types::config::{StoreBackend, StoreConfig};
use parley_types::error::RepositoryError;

use crate::redis_store::connection::RedisHandle;
use crate::redis_store::session::RedisSessionStore;

/// The selected store plus, for Redis, the handle that owns its connection.
pub struct SessionBackend {
    pub store: BoxSessionStore,
    pub redis: Option<Arc<RedisHandle>>,
}

/// Create the store named by `config.backend`. Does not connect.
pub fn create_session_store(config: &StoreConfig) -> Result<SessionBackend, RepositoryError> {
    let settings = config.settings();
    match config.backend {
        StoreBackend::Redis => {
            let handle = Arc::new(RedisHandle::new(&config.redis_url)?);
            info!(max_messages = settings.max_messages, "Using Redis session store");
            Ok(SessionBackend {
                store: BoxSessionStore::new(RedisSessionStore::new(Arc::clone(&handle), settings)),
                redis: Some(handle),
            })
        }
        StoreBackend::Memory => {
            info!(max_messages = settings.max_messages, "Using in-memory session store");
            Ok(SessionBackend {
                store: BoxSessionStore::new(InMemorySessionStore::new(settings)),
                redis: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::store::SessionStore;
    use parley_types::chat::{MessageRole, SessionScope};

    #[tokio::test]
    async fn test_memory_backend_has_no_redis_handle() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let backend = create_session_store(&config).unwrap();
        assert!(backend.redis.is_none());

        let scope = SessionScope::for_user("u1");
        backend.store.append_message(&scope, MessageRole::User, "hi").await.unwrap();
        assert_eq!(backend.store.get_history(&scope).await.unwrap().len(), 1);
    }

    #[test]
    fn test_redis_backend_is_lazy() {
        let backend = create_session_store(&StoreConfig::default()).unwrap();
        let handle = backend.redis.unwrap();
        assert_eq!(handle.connects(), 0);
    }

    #[test]
    fn test_redis_backend_rejects_bad_url() {
        let config = StoreConfig {
            redis_url: "definitely not a url".to_string(),
            ..StoreConfig::default()
        };
        assert!(create_session_store(&config).is_err());
    }
}
