use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Per-call prefetch size used when the extraction script reads a due set.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// Seconds before the store discards an unconsumed ready cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Seconds between promotion passes when running as a daemon.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub redis_url: String,
    /// Upper bound on entries read from a due set per extraction call.
    pub batch_size: u32,
    /// TTL applied to a populated ready cache.
    pub cache_ttl_secs: u64,
    /// Due set names to poll, in order, each pass.
    pub due_sets: Vec<String>,
    /// Optional namespace applied to every key this tool touches.
    pub key_prefix: Option<String>,
    pub poll_interval_secs: u64,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        let mut batch_size = env_u32("PUNCTUAL_BATCH_SIZE", DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            batch_size = DEFAULT_BATCH_SIZE;
        }
        Self {
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            batch_size,
            cache_ttl_secs: env_u64("PUNCTUAL_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            due_sets: parse_due_sets(&env_or("PUNCTUAL_DUE_SETS", "schedule,retry")),
            key_prefix: env_opt("PUNCTUAL_KEY_PREFIX"),
            poll_interval_secs: env_u64("PUNCTUAL_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    /// Store key for a due set name with the configured namespace applied.
    pub fn prefixed_key(&self, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  redis:     url={}", self.redis_url);
        tracing::info!(
            "  extract:   batch_size={}, cache_ttl_secs={}",
            self.batch_size,
            self.cache_ttl_secs
        );
        tracing::info!(
            "  due sets:  [{}] prefix={}",
            self.due_sets.join(", "),
            self.key_prefix.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  poller:    interval_secs={}", self.poll_interval_secs);
    }
}

/// Parse a comma-separated due set list, dropping empty segments.
fn parse_due_sets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
