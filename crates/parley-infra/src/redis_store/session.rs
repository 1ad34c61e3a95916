//! Redis-backed [`SessionStore`].
//!
//! Each session is a Redis list at `chat:<userId>::<domain>:<category>`.
//! Appends run as one Lua script so push, trim and expire are applied
//! atomically. Wildcard clears walk the keyspace with a cursor `SCAN` and
//! delete each page as it arrives.

use std::sync::Arc;

use redis::Script;
use tracing::debug;

use parley_core::session::codec::{decode_entries, encode_entry};
use parley_core::session::key::{ClearTarget, clear_target, scope_key};
use parley_core::session::store::SessionStore;
use parley_types::chat::{Message, MessageRole, SessionScope};
use parley_types::config::StoreSettings;
use parley_types::error::RepositoryError;

use super::connection::RedisHandle;
use super::map_redis_error;

/// Keys requested per `SCAN` page.
const SCAN_BATCH: usize = 100;

/// KEYS[1] = list key; ARGV = entry, cap, ttl seconds. A cap `<= 0` skips the trim.
const APPEND_SCRIPT: &str = r"
redis.call('RPUSH', KEYS[1], ARGV[1])
local cap = tonumber(ARGV[2])
if cap > 0 then
  redis.call('LTRIM', KEYS[1], -cap, -1)
end
redis.call('EXPIRE', KEYS[1], ARGV[3])
return redis.call('LLEN', KEYS[1])
";

pub struct RedisSessionStore {
    handle: Arc<RedisHandle>,
    settings: StoreSettings,
    append: Script,
}

impl RedisSessionStore {
    pub fn new(handle: Arc<RedisHandle>, settings: StoreSettings) -> Self {
        Self {
            handle,
            settings,
            append: Script::new(APPEND_SCRIPT),
        }
    }

    pub fn handle(&self) -> &Arc<RedisHandle> {
        &self.handle
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

impl SessionStore for RedisSessionStore {
    async fn append_message(
        &self,
        scope: &SessionScope,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepositoryError> {
        let key = scope_key(scope);
        let entry = encode_entry(role, content)?;
        let mut conn = self.handle.acquire().await?;

        let len: i64 = self
            .append
            .key(&key)
            .arg(entry)
            .arg(self.settings.max_messages)
            .arg(self.settings.session_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        debug!(key = %key, role = %role, len, "Appended message");
        Ok(())
    }

    async fn get_history(&self, scope: &SessionScope) -> Result<Vec<Message>, RepositoryError> {
        let key = scope_key(scope);
        let mut conn = self.handle.acquire().await?;

        let raw: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(decode_entries(&key, raw))
    }

    async fn clear_history(
        &self,
        user_id: &str,
        domain: Option<&str>,
        category: Option<&str>,
    ) -> Result<u64, RepositoryError> {
        let removed = match clear_target(user_id, domain, category) {
            ClearTarget::Exact(key) => {
                let mut conn = self.handle.acquire().await?;
                let deleted: u64 = redis::cmd("DEL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                deleted
            }
            ClearTarget::Pattern(pattern) => self.delete_matching(&pattern).await?,
        };

        debug!(user_id, removed, "Cleared sessions");
        Ok(removed)
    }
}
