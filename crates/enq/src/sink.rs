//! Downstream work-queue sinks.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::debug;

use punctual_core::JobPayload;

use crate::error::EnqError;

/// Destination for promoted jobs. One job per call; the driver never
/// batches pushes, so at most one extracted-but-undelivered payload is in
/// flight per due set.
#[async_trait]
pub trait JobSink: Send {
    async fn push(&mut self, job: JobPayload) -> Result<(), EnqError>;
}

/// Pushes jobs onto Redis work queues: the payload lands at the head of
/// `queue:<name>` and the queue name is added to the `queues` registry set,
/// the shape workers expect to consume from.
#[derive(Clone)]
pub struct RedisQueueSink {
    conn: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisQueueSink {
    pub fn new(conn: ConnectionManager, key_prefix: Option<String>) -> Self {
        Self { conn, key_prefix }
    }

    fn key(&self, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => name.to_string(),
        }
    }
}

#[async_trait]
impl JobSink for RedisQueueSink {
    async fn push(&mut self, mut job: JobPayload) -> Result<(), EnqError> {
        job.enqueued_at = Some(Utc::now().timestamp_micros() as f64 / 1_000_000.0);
        let encoded = job.to_json()?;
        let queue_key = self.key(&format!("queue:{}", job.queue));
        let registry_key = self.key("queues");

        let mut pipe = redis::pipe();
        pipe.sadd(&registry_key, &job.queue).ignore();
        pipe.lpush(&queue_key, &encoded).ignore();
        let _: () = pipe.query_async(&mut self.conn).await?;

        debug!(queue = %job.queue, jid = job.jid.as_deref().unwrap_or("-"), "pushed job");
        Ok(())
    }
}
