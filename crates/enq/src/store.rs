//! Due store abstraction and the Redis implementation.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::EnqError;
use crate::script::{ready_cache_key, ScriptRegistrar, POP_DUE_JOB};

/// A store holding time-ordered due sets.
///
/// `pop_due` is the ownership boundary: a returned payload has been removed
/// from the set atomically and belongs to this caller alone.
#[async_trait]
pub trait DueStore: Send {
    /// Claim the next payload due at or before `cutoff` (epoch seconds,
    /// inclusive), or `None` when the set holds nothing due.
    async fn pop_due(&mut self, set_key: &str, cutoff: f64) -> Result<Option<String>, EnqError>;
}

/// Redis-backed due store. Each extraction is a single server-side script
/// call, so nothing interleaves with the read-check-remove sequence even
/// with many pollers on the same set.
#[derive(Clone)]
pub struct RedisDueStore {
    conn: ConnectionManager,
    script: ScriptRegistrar,
    batch_size: u32,
    cache_ttl_secs: u64,
}

impl RedisDueStore {
    pub fn new(conn: ConnectionManager, batch_size: u32, cache_ttl_secs: u64) -> Self {
        Self {
            conn,
            script: ScriptRegistrar::new(POP_DUE_JOB),
            batch_size,
            cache_ttl_secs,
        }
    }

    /// Connect to `redis_url` and build a store over a managed connection.
    pub async fn connect(
        redis_url: &str,
        batch_size: u32,
        cache_ttl_secs: u64,
    ) -> Result<Self, EnqError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, batch_size, cache_ttl_secs))
    }

    /// Handle to the underlying managed connection (cheap to clone).
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl DueStore for RedisDueStore {
    async fn pop_due(&mut self, set_key: &str, cutoff: f64) -> Result<Option<String>, EnqError> {
        let cache_key = ready_cache_key(set_key);
        let args = [
            cutoff.to_string(),
            self.batch_size.to_string(),
            self.cache_ttl_secs.to_string(),
        ];
        let payload = self
            .script
            .invoke(&mut self.conn, &[set_key, &cache_key], &args)
            .await?;
        Ok(payload)
    }
}
