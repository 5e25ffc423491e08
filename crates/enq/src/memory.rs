//! In-memory due store for development and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::EnqError;
use crate::store::DueStore;

#[derive(Debug, Default)]
struct SetState {
    /// payload → due time (epoch seconds). Mirrors sorted set membership.
    scores: HashMap<String, f64>,
    /// Prefetched payloads, due-time order, head first.
    cache: VecDeque<String>,
    /// When the cache self-destructs, if populated.
    cache_expires: Option<Instant>,
}

/// In-process implementation of the same extraction semantics the server
/// script provides: ordered range read, bounded prefetch into a TTL'd ready
/// cache, and conditional removal as the ownership check.
///
/// `Clone` hands out another handle to the same underlying state, so racing
/// extractors can be exercised inside one test process. The per-call lock
/// stands in for the server's script atomicity.
#[derive(Debug, Clone)]
pub struct MemoryDueStore {
    inner: Arc<Mutex<HashMap<String, SetState>>>,
    batch_size: usize,
    cache_ttl: Duration,
}

impl Default for MemoryDueStore {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(60))
    }
}

impl MemoryDueStore {
    pub fn new(batch_size: usize, cache_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            batch_size: batch_size.max(1),
            cache_ttl,
        }
    }

    /// Insert (or re-score) a payload in a due set.
    pub fn add(&self, set_key: &str, payload: &str, due_at: f64) {
        let mut sets = self.inner.lock().unwrap();
        sets.entry(set_key.to_string())
            .or_default()
            .scores
            .insert(payload.to_string(), due_at);
    }

    /// Remove a payload directly, bypassing extraction. Stands in for a
    /// rival poller claiming the entry through another code path.
    pub fn remove(&self, set_key: &str, payload: &str) -> bool {
        let mut sets = self.inner.lock().unwrap();
        sets.get_mut(set_key)
            .map(|state| state.scores.remove(payload).is_some())
            .unwrap_or(false)
    }

    /// Number of members in a due set.
    pub fn len(&self, set_key: &str) -> usize {
        let sets = self.inner.lock().unwrap();
        sets.get(set_key).map(|s| s.scores.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, set_key: &str) -> bool {
        self.len(set_key) == 0
    }

    pub fn contains(&self, set_key: &str, payload: &str) -> bool {
        let sets = self.inner.lock().unwrap();
        sets.get(set_key)
            .map(|s| s.scores.contains_key(payload))
            .unwrap_or(false)
    }

    /// Number of payloads currently parked in a set's ready cache.
    pub fn cached_len(&self, set_key: &str) -> usize {
        let sets = self.inner.lock().unwrap();
        sets.get(set_key).map(|s| s.cache.len()).unwrap_or(0)
    }
}

/// Entries due at or before `cutoff`, ascending by (score, payload), the
/// same order a sorted set range read yields.
fn due_batch(state: &SetState, cutoff: f64, limit: usize) -> Vec<String> {
    let mut due: Vec<(&String, f64)> = state
        .scores
        .iter()
        .filter(|(_, score)| **score <= cutoff)
        .map(|(payload, score)| (payload, *score))
        .collect();
    due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    due.into_iter()
        .take(limit)
        .map(|(payload, _)| payload.clone())
        .collect()
}

#[async_trait]
impl DueStore for MemoryDueStore {
    async fn pop_due(&mut self, set_key: &str, cutoff: f64) -> Result<Option<String>, EnqError> {
        let mut sets = self.inner.lock().unwrap();
        let state = sets.entry(set_key.to_string()).or_default();

        // Expire the cache up front, as the server would have.
        if let Some(deadline) = state.cache_expires {
            if Instant::now() >= deadline {
                state.cache.clear();
                state.cache_expires = None;
            }
        }

        loop {
            let candidate = match state.cache.pop_front() {
                Some(payload) => Some(payload),
                None => {
                    let due = due_batch(state, cutoff, self.batch_size);
                    if due.len() > 1 {
                        state.cache.extend(due);
                        state.cache_expires = Some(Instant::now() + self.cache_ttl);
                        state.cache.pop_front()
                    } else {
                        due.into_iter().next()
                    }
                }
            };

            match candidate {
                Some(payload) => {
                    // Conditional removal: only the caller that deletes the
                    // member owns it. A stale cache entry fails this check
                    // and the loop starts over.
                    if state.scores.remove(&payload).is_some() {
                        return Ok(Some(payload));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}
