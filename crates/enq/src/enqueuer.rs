//! The promotion driver.
//!
//! Polls each configured due set through the atomic extractor and hands
//! every claimed payload to the downstream sink, one at a time. Real
//! concurrency lives *across* processes running this same loop against the
//! same store; within one driver everything is sequential.

use std::time::Instant;

use tracing::{debug, info};

use punctual_core::JobPayload;

use crate::error::EnqError;
use crate::sink::JobSink;
use crate::stats::{EnqueueStats, SetStats};
use crate::store::DueStore;

pub struct Enqueuer<S, K> {
    store: S,
    sink: K,
    key_prefix: Option<String>,
}

impl<S: DueStore, K: JobSink> Enqueuer<S, K> {
    pub fn new(store: S, sink: K, key_prefix: Option<String>) -> Self {
        Self {
            store,
            sink,
            key_prefix,
        }
    }

    /// Store key for a due set name, honoring the configured namespace.
    fn set_key(&self, name: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Promote every payload due at or before `now` (epoch seconds).
    ///
    /// Sets are polled in the order given. Each extracted payload is
    /// decoded and pushed before the next extraction, keeping the
    /// removed-but-undelivered window to a single in-flight job. Any error
    /// aborts the invocation; due sets after the failing one are left
    /// untouched for a later call. A payload that was already extracted
    /// when the error hit is lost (see [`EnqError::Push`]).
    pub async fn promote_due_jobs(
        &mut self,
        now: f64,
        due_sets: &[String],
    ) -> Result<EnqueueStats, EnqError> {
        let mut stats = EnqueueStats::default();

        for name in due_sets {
            let set_key = self.set_key(name);
            let mut set_stats = SetStats {
                set: name.clone(),
                ..Default::default()
            };
            let started = Instant::now();

            loop {
                let t = Instant::now();
                let payload = self.store.pop_due(&set_key, now).await?;
                set_stats.pop_time += t.elapsed();

                let Some(payload) = payload else { break };

                let job = JobPayload::from_json(&payload)?;
                let t = Instant::now();
                self.sink.push(job).await?;
                set_stats.push_time += t.elapsed();

                set_stats.jobs_promoted += 1;
                debug!(set = %name, payload = %payload, "promoted job");
            }

            set_stats.elapsed = started.elapsed();
            if set_stats.jobs_promoted > 0 {
                info!(
                    set = %name,
                    jobs = set_stats.jobs_promoted,
                    elapsed_ms = set_stats.elapsed.as_millis() as u64,
                    pop_ms = set_stats.pop_time.as_millis() as u64,
                    push_ms = set_stats.push_time.as_millis() as u64,
                    "promoted due jobs"
                );
            }
            stats.per_set.push(set_stats);
        }

        Ok(stats)
    }
}
