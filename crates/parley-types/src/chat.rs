//! Session scope and stored message types for Parley.
//!
//! A session is identified by `(user_id, domain, category)` and owns an
//! append-only list of [`Message`] entries.

use serde::{Deserialize, Serialize};

use std::fmt;

// Re-export the message types from the llm module (stored entries and model
// input share the same `{role, content}` shape).
pub use crate::llm::{Message, MessageRole};

/// Domain used when the caller does not supply one.
pub const DEFAULT_DOMAIN: &str = "universal";

/// Category used when the caller does not supply one.
pub const DEFAULT_CATEGORY: &str = "general";

/// The composite scope identifying one session's stored history.
///
/// `user_id` alone is not a lookup key; two scopes for the same user with a
/// different domain or category are fully independent sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionScope {
    pub user_id: String,
    pub domain: String,
    pub category: String,
}

impl SessionScope {
    /// Build a scope, substituting the defaults for absent or blank components.
    pub fn new(user_id: impl Into<String>, domain: Option<&str>, category: Option<&str>) -> Self {
        Self {
            user_id: user_id.into(),
            domain: non_blank(domain).unwrap_or(DEFAULT_DOMAIN).to_string(),
            category: non_blank(category).unwrap_or(DEFAULT_CATEGORY).to_string(),
        }
    }

    /// Scope with both defaults applied.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, None, None)
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.domain, self.category)
    }
}

/// Treat `None`, `""` and whitespace-only input as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
