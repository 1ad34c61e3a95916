//! Application state shared by every HTTP handler.
//!
//! Holds the turn orchestrator (pinned to the boxed session store), the
//! SHA-256 digest of the client API key, and the Redis handle when the
//! Redis backend is active so it can be closed on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use parley_core::chat::orchestrator::TurnOrchestrator;
use parley_core::session::box_store::BoxSessionStore;
use parley_infra::redis_store::connection::RedisHandle;

use crate::http::extractors::auth::hash_api_key;

pub type ConcreteOrchestrator = TurnOrchestrator<BoxSessionStore>;

/// How long shutdown waits for background writes before closing the store.
pub const BACKGROUND_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    /// Lowercase hex SHA-256 of the expected `X-API-KEY` value.
    pub api_key_hash: Arc<str>,
    pub redis: Option<Arc<RedisHandle>>,
}

impl AppState {
    pub fn new(
        orchestrator: ConcreteOrchestrator,
        api_key: &str,
        redis: Option<Arc<RedisHandle>>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            api_key_hash: hash_api_key(api_key).into(),
            redis,
        }
    }

    /// Drain background writes, then close the shared store connection.
    pub async fn shutdown(&self) {
        self.shutdown_within(BACKGROUND_DRAIN_TIMEOUT).await;
    }

    /// [`Self::shutdown`] with an explicit drain deadline. Returns whether
    /// every background write finished in time.
    pub async fn shutdown_within(&self, timeout: Duration) -> bool {
        let writes = self.orchestrator.background();
        let drained = writes.drain(timeout).await;
        info!(
            spawned = writes.spawned(),
            failed = writes.failed(),
            drained,
            "Background writes at shutdown"
        );
        if let Some(redis) = &self.redis {
            redis.shutdown().await;
        }
        drained
    }
}
