//! Scoped storage keys.
//!
//! Key format: `chat:<userId>::<domain>:<category>`. The `"::"` and `":"`
//! separators are load-bearing: pattern-based clearing substitutes `*` for
//! the components the caller did not supply.

use parley_types::chat::{DEFAULT_CATEGORY, DEFAULT_DOMAIN, SessionScope, non_blank};

const KEY_PREFIX: &str = "chat:";

/// What `clear_history` has to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    /// Both scope components known: a single point delete.
    Exact(String),
    /// At least one component omitted: enumerate keys matching this glob.
    Pattern(String),
}

/// Build the canonical key for `(user_id, domain, category)`, applying the
/// defaults to absent or blank components.
pub fn build_key(user_id: &str, domain: Option<&str>, category: Option<&str>) -> String {
    format!(
        "{KEY_PREFIX}{user_id}::{}:{}",
        non_blank(domain).unwrap_or(DEFAULT_DOMAIN),
        non_blank(category).unwrap_or(DEFAULT_CATEGORY)
    )
}

/// Canonical key for an already-resolved scope.
pub fn scope_key(scope: &SessionScope) -> String {
    build_key(&scope.user_id, Some(&scope.domain), Some(&scope.category))
}

/// Decide between a point delete and a wildcard enumeration.
///
/// Unlike [`build_key`], omitted components here mean "any", not the default.
/// Supplied components are glob-escaped so they only ever match literally.
pub fn clear_target(user_id: &str, domain: Option<&str>, category: Option<&str>) -> ClearTarget {
    let user = escape_glob(user_id);
    match (non_blank(domain), non_blank(category)) {
        (Some(domain), Some(category)) => {
            ClearTarget::Exact(build_key(user_id, Some(domain), Some(category)))
        }
        (Some(domain), None) => {
            ClearTarget::Pattern(format!("{KEY_PREFIX}{user}::{}:*", escape_glob(domain)))
        }
        (None, Some(category)) => {
            ClearTarget::Pattern(format!("{KEY_PREFIX}{user}::*:{}", escape_glob(category)))
        }
        (None, None) => ClearTarget::Pattern(format!("{KEY_PREFIX}{user}::*")),
    }
}

/// Backslash-escape glob syntax: Redis metacharacters plus the `{...}`
/// alternation the in-memory matcher understands.
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
