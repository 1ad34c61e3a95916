//! Shared Redis connection handle.
//!
//! One [`RedisHandle`] is created at startup and shared by every request.
//! The first [`RedisHandle::acquire`] connects; callers that arrive while
//! that connect is in flight wait on the same lock and reuse its result, so
//! concurrent first use opens exactly one connection. The resulting
//! `ConnectionManager` reconnects on its own after transient failures and is
//! cheap to clone per command.

use std::sync::atomic::{AtomicU64, Ordering};

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_types::error::RepositoryError;

enum HandleState {
    Idle,
    Ready(ConnectionManager),
    Closed,
}

/// Process-wide Redis handle with memoized connect and explicit shutdown.
pub struct RedisHandle {
    client: redis::Client,
    state: Mutex<HandleState>,
    connects: AtomicU64,
}

impl RedisHandle {
    /// Validate `url` without connecting.
    pub fn new(url: &str) -> Result<Self, RepositoryError> {
        let client =
            redis::Client::open(url).map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            state: Mutex::new(HandleState::Idle),
            connects: AtomicU64::new(0),
        })
    }

    /// Return the shared connection, establishing it on first use.
    pub async fn acquire(&self) -> Result<ConnectionManager, RepositoryError> {
        let mut state = self.state.lock().await;
        match &*state {
            HandleState::Ready(conn) => return Ok(conn.clone()),
            HandleState::Closed => {
                return Err(RepositoryError::Connection(
                    "redis handle has been shut down".to_string(),
                ));
            }
            HandleState::Idle => {}
        }

        let conn = self.client.get_connection_manager().await.map_err(|e| {
            warn!(error = %e, "Failed to connect to Redis");
            RepositoryError::Connection(e.to_string())
        })?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        info!("Connected to Redis");

        *state = HandleState::Ready(conn.clone());
        Ok(conn)
    }

    /// Round-trip a `PING`.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        let mut conn = self.acquire().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(super::map_redis_error)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(RepositoryError::Query(format!("unexpected PING reply: {reply}")))
        }
    }

    /// Number of connections established over the handle's lifetime.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Drop the connection and refuse further use. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, HandleState::Closed);
        if matches!(previous, HandleState::Ready(_)) {
            info!("Redis connection closed");
        } else {
            debug!("Redis handle shut down without an open connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            RedisHandle::new("not a url"),
            Err(RepositoryError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_after_shutdown_fails_without_connecting() {
        let handle = RedisHandle::new("redis://127.0.0.1:1").unwrap();
        handle.shutdown().await;
        handle.shutdown().await;

        let Err(err) = handle.acquire().await else {
            panic!("expected shutdown error");
        };
        assert_eq!(
            err.to_string(),
            "store connection error: redis handle has been shut down"
        );
        assert_eq!(handle.connects(), 0);
    }
}
