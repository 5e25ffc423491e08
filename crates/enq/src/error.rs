//! Promotion error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnqError {
    /// A store-reported failure. NOSCRIPT replies are recovered inside the
    /// script registrar and never surface here unless the re-registration
    /// retry itself failed.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The extracted payload was not a valid job description. The payload
    /// has already been removed from its due set at this point, so the job
    /// is lost.
    #[error("invalid job payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The downstream work queue rejected the push. Same loss window as
    /// [`EnqError::Decode`]: the payload is no longer in the due set.
    #[error("work queue push failed: {0}")]
    Push(String),
}
