//! BoxSessionStore -- object-safe dynamic dispatch wrapper for SessionStore.
//!
//! Same blanket-impl pattern as `BoxLlmProvider`: an object-safe
//! `SessionStoreDyn` with boxed futures, implemented for every
//! `T: SessionStore`, wrapped by `BoxSessionStore`.

use std::future::Future;
use std::pin::Pin;

use parley_types::chat::{Message, MessageRole, SessionScope};
use parley_types::error::RepositoryError;

use super::store::SessionStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`SessionStore`].
pub trait SessionStoreDyn: Send + Sync {
    fn append_message_boxed<'a>(
        &'a self,
        scope: &'a SessionScope,
        role: MessageRole,
        content: &'a str,
    ) -> BoxFuture<'a, ()>;

    fn get_history_boxed<'a>(&'a self, scope: &'a SessionScope) -> BoxFuture<'a, Vec<Message>>;

    fn clear_history_boxed<'a>(
        &'a self,
        user_id: &'a str,
        domain: Option<&'a str>,
        category: Option<&'a str>,
    ) -> BoxFuture<'a, u64>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn append_message_boxed<'a>(
        &'a self,
        scope: &'a SessionScope,
        role: MessageRole,
        content: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.append_message(scope, role, content))
    }

    fn get_history_boxed<'a>(&'a self, scope: &'a SessionScope) -> BoxFuture<'a, Vec<Message>> {
        Box::pin(self.get_history(scope))
    }

    fn clear_history_boxed<'a>(
        &'a self,
        user_id: &'a str,
        domain: Option<&'a str>,
        category: Option<&'a str>,
    ) -> BoxFuture<'a, u64> {
        Box::pin(self.clear_history(user_id, domain, category))
    }
}

/// Type-erased session store, selected at startup from configuration
/// (Redis or in-memory).
pub struct BoxSessionStore {
    inner: Box<dyn SessionStoreDyn>,
}

impl BoxSessionStore {
    pub fn new<T: SessionStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }
}

impl SessionStore for BoxSessionStore {
    async fn append_message(
        &self,
        scope: &SessionScope,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepositoryError> {
        self.inner.append_message_boxed(scope, role, content).await
    }

    async fn get_history(&self, scope: &SessionScope) -> Result<Vec<Message>, RepositoryError> {
        self.inner.get_history_boxed(scope).await
    }

    async fn clear_history(
        &self,
        user_id: &str,
        domain: Option<&str>,
        category: Option<&str>,
    ) -> Result<u64, RepositoryError> {
        self.inner.clear_history_boxed(user_id, domain, category).await
    }
}
