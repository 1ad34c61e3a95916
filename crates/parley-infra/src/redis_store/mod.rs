//! Redis session storage.
//!
//! [`connection::RedisHandle`] owns the shared connection;
//! [`session::RedisSessionStore`] implements `SessionStore` on top of it.

pub mod connection;
pub mod session;

use redis::RedisError;

use parley_types::error::RepositoryError;

/// Classify a Redis error as a connectivity failure or a command failure.
pub(crate) fn map_redis_error(err: RedisError) -> RepositoryError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        RepositoryError::Connection(err.to_string())
    } else {
        RepositoryError::Query(err.to_string())
    }
}
