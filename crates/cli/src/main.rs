use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use punctual_core::config::{load_dotenv, Config};
use punctual_enq::{Enqueuer, RedisDueStore, RedisQueueSink};

/// Promote due scheduled jobs from Redis sorted sets into work queues.
#[derive(Debug, Parser)]
#[command(name = "punctual", version)]
struct CliArgs {
    /// Run a single promotion pass and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between promotion passes (overrides PUNCTUAL_POLL_INTERVAL_SECS).
    #[arg(long)]
    interval: Option<u64>,

    /// Due set names to poll, comma-separated (overrides PUNCTUAL_DUE_SETS).
    #[arg(long, value_delimiter = ',')]
    sets: Vec<String>,
}

/// Give up after this many failing passes in a row; a persistent store or
/// downstream outage is better handled by the supervisor restarting us.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(interval) = args.interval {
        config.poll_interval_secs = interval;
    }
    if !args.sets.is_empty() {
        config.due_sets = args.sets.clone();
    }
    config.log_summary();

    let store = RedisDueStore::connect(&config.redis_url, config.batch_size, config.cache_ttl_secs)
        .await
        .context("failed to connect to redis")?;
    let sink = RedisQueueSink::new(store.connection(), config.key_prefix.clone());
    let mut enqueuer = Enqueuer::new(store, sink, config.key_prefix.clone());

    if args.once {
        let stats = enqueuer
            .promote_due_jobs(epoch_now(), &config.due_sets)
            .await
            .context("promotion pass failed")?;
        info!(jobs = stats.total_promoted(), "promotion pass complete");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs = config.poll_interval_secs, "poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        match enqueuer.promote_due_jobs(epoch_now(), &config.due_sets).await {
            Ok(stats) => {
                consecutive_failures = 0;
                if stats.total_promoted() > 0 {
                    info!(jobs = stats.total_promoted(), "promotion pass complete");
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    error = %e,
                    consecutive_failures,
                    "promotion pass failed"
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    error!(
                        "stopping after {} consecutive failed passes",
                        MAX_CONSECUTIVE_FAILURES
                    );
                    anyhow::bail!(
                        "poller stopped: {} consecutive failed passes",
                        MAX_CONSECUTIVE_FAILURES
                    );
                }
            }
        }
    }

    Ok(())
}

/// Current wall clock as fractional epoch seconds, the same scale due
/// times are scored in.
fn epoch_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
