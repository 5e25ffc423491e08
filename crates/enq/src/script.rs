//! Server-side extraction script and its registrar.
//!
//! Extraction has to be indivisible: many uncoordinated pollers race against
//! the same due set, and the read-check-remove sequence must not interleave
//! with anyone else's. The whole sequence therefore runs as one Lua script
//! on the server; the client only ever sees "one payload" or "none".

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// Atomically claim the next due payload from a sorted set.
///
/// - `KEYS[1]` — due set (sorted set, score = due time in epoch seconds)
/// - `KEYS[2]` — ready cache (list paired with the due set)
/// - `ARGV[1]` — cutoff time; a score equal to the cutoff is due
/// - `ARGV[2]` — batch size for the prefetch read
/// - `ARGV[3]` — ready cache TTL in seconds
///
/// Returns the claimed payload, or nil when nothing is due. Tunables travel
/// as ARGV so a single registered script serves every configuration.
pub const POP_DUE_JOB: &str = r#"
local sorted_set = KEYS[1]
local ready_cache = KEYS[2]
local cutoff = tonumber(ARGV[1])
local batch_size = tonumber(ARGV[2])
local cache_ttl = tonumber(ARGV[3])

while true do
  -- The cache holds payloads that were due when a previous call read the
  -- sorted set. Drain it head-first before touching the set again.
  local job = redis.call('lpop', ready_cache)
  if not job then
    local due = redis.call('zrangebyscore', sorted_set, '-inf', cutoff, 'LIMIT', 0, batch_size)
    if #due == 1 then
      job = due[1]
    elseif #due > 1 then
      -- Park the batch in the cache and bound its staleness. The sorted
      -- set stays canonical; an expired cache just means those entries
      -- wait for a later poll.
      redis.call('rpush', ready_cache, unpack(due))
      redis.call('expire', ready_cache, cache_ttl)
      job = redis.call('lpop', ready_cache)
    end
  end

  if job then
    -- A concurrent poller may have claimed this member since it was read.
    -- Only the caller whose zrem removes it owns the job.
    if redis.call('zrem', sorted_set, job) > 0 then
      return job
    end
  else
    return nil
  end
end
"#;

/// Ready cache key paired with a due set key. Derived from the already
/// prefixed set key so a configured namespace covers both.
pub fn ready_cache_key(set_key: &str) -> String {
    format!("{}.cache", set_key)
}

/// The two commands the registrar needs from a connection. Kept as a trait
/// so script-cache recovery is testable without a server.
#[async_trait]
pub trait ScriptConn: Send {
    async fn script_load(&mut self, body: &str) -> redis::RedisResult<String>;

    async fn evalsha(
        &mut self,
        sha: &str,
        keys: &[&str],
        args: &[String],
    ) -> redis::RedisResult<Option<String>>;
}

#[async_trait]
impl ScriptConn for ConnectionManager {
    async fn script_load(&mut self, body: &str) -> redis::RedisResult<String> {
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(body)
            .query_async(self)
            .await?;
        Ok(sha)
    }

    async fn evalsha(
        &mut self,
        sha: &str,
        keys: &[&str],
        args: &[String],
    ) -> redis::RedisResult<Option<String>> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(keys.len());
        for key in keys {
            cmd.arg(*key);
        }
        for arg in args {
            cmd.arg(arg.as_str());
        }
        let reply: Option<String> = cmd.query_async(self).await?;
        Ok(reply)
    }
}

/// Tracks the server-side identity of one registered script.
///
/// The server can forget registered scripts at any time (SCRIPT FLUSH,
/// restart without persistence), so the cached identity is a hint, not a
/// fact. One registrar instance belongs to one store handle; it is never
/// shared process-wide.
#[derive(Debug, Clone)]
pub struct ScriptRegistrar {
    body: &'static str,
    sha: Option<String>,
}

impl ScriptRegistrar {
    pub fn new(body: &'static str) -> Self {
        Self { body, sha: None }
    }

    /// Register the script if its identity is not yet known.
    pub async fn ensure_loaded<C: ScriptConn>(
        &mut self,
        conn: &mut C,
    ) -> redis::RedisResult<String> {
        if let Some(sha) = &self.sha {
            return Ok(sha.clone());
        }
        let sha = conn.script_load(self.body).await?;
        info!(sha = %sha, "registered extraction script");
        self.sha = Some(sha.clone());
        Ok(sha)
    }

    /// Run the script by identity.
    ///
    /// A NOSCRIPT reply means the server dropped its script cache: the
    /// script is re-registered and the call retried exactly once. Every
    /// other error, including one from the retry, propagates unmodified.
    pub async fn invoke<C: ScriptConn>(
        &mut self,
        conn: &mut C,
        keys: &[&str],
        args: &[String],
    ) -> redis::RedisResult<Option<String>> {
        let sha = self.ensure_loaded(conn).await?;
        match conn.evalsha(&sha, keys, args).await {
            Err(e) if e.kind() == redis::ErrorKind::NoScriptError => {
                debug!("script cache flushed, re-registering");
                self.sha = None;
                let sha = self.ensure_loaded(conn).await?;
                conn.evalsha(&sha, keys, args).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted connection: answers a fixed number of EVALSHAs with
    /// NOSCRIPT before serving queued replies.
    struct MockConn {
        loads: usize,
        evals: usize,
        noscript_replies: usize,
        fail_eval_with: Option<&'static str>,
        replies: VecDeque<Option<String>>,
    }

    impl MockConn {
        fn new(replies: Vec<Option<&str>>) -> Self {
            Self {
                loads: 0,
                evals: 0,
                noscript_replies: 0,
                fail_eval_with: None,
                replies: replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ScriptConn for MockConn {
        async fn script_load(&mut self, _body: &str) -> redis::RedisResult<String> {
            self.loads += 1;
            Ok(format!("sha-{}", self.loads))
        }

        async fn evalsha(
            &mut self,
            _sha: &str,
            _keys: &[&str],
            _args: &[String],
        ) -> redis::RedisResult<Option<String>> {
            self.evals += 1;
            if let Some(message) = self.fail_eval_with {
                return Err(redis::RedisError::from((
                    redis::ErrorKind::ResponseError,
                    message,
                )));
            }
            if self.noscript_replies > 0 {
                self.noscript_replies -= 1;
                return Err(redis::RedisError::from((
                    redis::ErrorKind::NoScriptError,
                    "NOSCRIPT No matching script",
                )));
            }
            Ok(self.replies.pop_front().flatten())
        }
    }

    #[tokio::test]
    async fn registers_once_and_caches_identity() {
        let mut conn = MockConn::new(vec![Some("job-1"), Some("job-2")]);
        let mut registrar = ScriptRegistrar::new(POP_DUE_JOB);

        let first = registrar.invoke(&mut conn, &["schedule"], &[]).await.unwrap();
        let second = registrar.invoke(&mut conn, &["schedule"], &[]).await.unwrap();

        assert_eq!(first.as_deref(), Some("job-1"));
        assert_eq!(second.as_deref(), Some("job-2"));
        assert_eq!(conn.loads, 1, "identity should be cached after first use");
        assert_eq!(conn.evals, 2);
    }

    #[tokio::test]
    async fn recovers_from_flushed_script_cache() {
        let mut conn = MockConn::new(vec![Some("job-1")]);
        conn.noscript_replies = 1;
        let mut registrar = ScriptRegistrar::new(POP_DUE_JOB);

        let result = registrar.invoke(&mut conn, &["schedule"], &[]).await.unwrap();

        assert_eq!(result.as_deref(), Some("job-1"));
        assert_eq!(conn.loads, 2, "expected initial load plus re-registration");
        assert_eq!(conn.evals, 2, "expected exactly one retry");
    }

    #[tokio::test]
    async fn second_noscript_propagates() {
        let mut conn = MockConn::new(vec![Some("job-1")]);
        conn.noscript_replies = 2;
        let mut registrar = ScriptRegistrar::new(POP_DUE_JOB);

        let err = registrar
            .invoke(&mut conn, &["schedule"], &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), redis::ErrorKind::NoScriptError);
        assert_eq!(conn.evals, 2, "only one retry is allowed");
    }

    #[tokio::test]
    async fn other_errors_propagate_without_retry() {
        let mut conn = MockConn::new(vec![]);
        conn.fail_eval_with = Some("ERR wrong number of arguments");
        let mut registrar = ScriptRegistrar::new(POP_DUE_JOB);

        let err = registrar
            .invoke(&mut conn, &["schedule"], &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), redis::ErrorKind::ResponseError);
        assert_eq!(conn.evals, 1, "non-NOSCRIPT errors must not be retried");
        assert_eq!(conn.loads, 1);
    }

    #[test]
    fn ready_cache_key_is_derived_from_set_key() {
        assert_eq!(ready_cache_key("schedule"), "schedule.cache");
        assert_eq!(ready_cache_key("myapp:retry"), "myapp:retry.cache");
    }
}
