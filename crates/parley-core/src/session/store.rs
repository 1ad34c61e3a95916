//! Session store trait.
//!
//! Defines the interface for scoped, bounded, expiring chat history.
//! Implementations: [`super::memory::InMemorySessionStore`] here, and the
//! Redis-backed store in parley-infra.

use parley_types::chat::{Message, MessageRole, SessionScope};
use parley_types::error::RepositoryError;

/// Trait for per-scope conversation history storage.
///
/// Every append is a single atomic unit on the backing store: push the
/// entry, trim to the newest `max_messages` (when positive), and reset the
/// session TTL. Concurrent appends to the same scope may interleave in either
/// order but none is lost and the cap always holds afterwards.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SessionStore: Send + Sync {
    /// Append one message to the scope's history.
    fn append_message(
        &self,
        scope: &SessionScope,
        role: MessageRole,
        content: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Full retained history for the scope, oldest first. A scope that was
    /// never written, or has expired, yields an empty list.
    fn get_history(
        &self,
        scope: &SessionScope,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Delete stored history and return the number of sessions removed.
    ///
    /// Omitted (or blank) `domain` / `category` act as wildcards rather than
    /// defaults; see [`super::key::clear_target`].
    fn clear_history(
        &self,
        user_id: &str,
        domain: Option<&str>,
        category: Option<&str>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
