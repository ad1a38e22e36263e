//! Periodic range reloads

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::feed::{FeedSource, FileFeed, HttpFeed};
use super::ingest::{FeedJob, IngestError, RangeIngester};
use crate::config::IngestConfig;
use crate::geo::AddressFamily;
use crate::resolver::SignalResolver;

/// Build one job per configured feed location.
pub fn feed_jobs(config: &IngestConfig) -> Result<Vec<FeedJob>, IngestError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut jobs = Vec::new();

    for (family, location) in [
        (AddressFamily::V4, &config.v4_url),
        (AddressFamily::V6, &config.v6_url),
    ] {
        let Some(location) = location else {
            continue;
        };
        let companion = config
            .checksum_suffix
            .as_ref()
            .map(|suffix| format!("{location}{suffix}"));

        let source: Arc<dyn FeedSource> =
            if location.starts_with("http://") || location.starts_with("https://") {
                let feed = HttpFeed::new(location.as_str(), timeout)?;
                match companion {
                    Some(url) => Arc::new(feed.with_companion(url, config.checksum_kind)),
                    None => Arc::new(feed),
                }
            } else {
                let feed = FileFeed::new(location.as_str());
                match companion {
                    Some(path) => Arc::new(feed.with_companion(path, config.checksum_kind)),
                    None => Arc::new(feed),
                }
            };

        jobs.push(FeedJob { family, source });
    }

    Ok(jobs)
}

/// Longest wait the scheduler will sleep in one go.
const MAX_WAIT: Duration = Duration::from_secs(u32::MAX as u64);

/// `base` shifted by a uniform random offset in `[-jitter, +jitter]`, kept
/// between one second and [`MAX_WAIT`].
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    let offset = (rand::random::<f64>() * 2.0 - 1.0) * jitter.as_secs_f64();
    let secs = (base.as_secs_f64() + offset).clamp(1.0, MAX_WAIT.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Reload every job on a jittered interval until `shutdown` fires.
///
/// The first pass runs immediately when any job's table is still empty.
/// Successful passes clear the resolver cache; a quota rejection postpones
/// the next pass by `quota_backoff_secs`.
pub fn spawn_autoupdate(
    ingester: Arc<RangeIngester>,
    jobs: Vec<FeedJob>,
    resolver: Arc<SignalResolver>,
    config: IngestConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.interval_secs);
        let jitter = Duration::from_secs(config.jitter_secs);
        let quota_backoff = Duration::from_secs(config.quota_backoff_secs);

        let needs_seed = jobs
            .iter()
            .any(|job| ingester.tables().snapshot(job.family).is_empty());
        let mut wait = if needs_seed {
            Duration::ZERO
        } else {
            jittered(interval, jitter)
        };

        info!(jobs = jobs.len(), first_run_in = ?wait, "Range autoupdate started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("Range autoupdate stopping");
                    break;
                }
            }

            wait = jittered(interval, jitter);
            let mut reloaded = false;

            for (family, result) in ingester.reload_all(&jobs).await {
                match result {
                    Ok(_) => reloaded = true,
                    Err(e) => {
                        if let Some(backoff) = e.backoff(quota_backoff) {
                            wait = backoff.min(MAX_WAIT);
                        }
                        if e.is_retryable() {
                            warn!(family = %family, error = %e, "Range reload failed, will retry");
                        } else {
                            error!(family = %family, error = %e, "Range reload failed");
                        }
                    }
                }
            }

            if reloaded {
                resolver.invalidate_cache();
            }
        }
    })
}

/// Poll storage every `interval` for generations written elsewhere.
///
/// Runs on every node: followers and servers whose tables are reloaded by
/// `geoloc-admin` pick up the new generation without a restart. The resolver
/// cache is cleared whenever a family changes.
pub fn spawn_refresh(
    ingester: Arc<RangeIngester>,
    resolver: Arc<SignalResolver>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = interval.clamp(Duration::from_millis(1), MAX_WAIT);
        // Bootstrap has just loaded storage; skip the immediate tick
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval = ?interval, "Range refresh started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    debug!("Range refresh stopping");
                    break;
                }
            }

            match ingester.refresh().await {
                Ok(changed) if !changed.is_empty() => {
                    for status in &changed {
                        info!(
                            family = %status.family,
                            records = status.records,
                            version = status.version,
                            "Picked up newer range table from storage"
                        );
                    }
                    resolver.invalidate_cache();
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Range refresh failed, will retry"),
            }
        }
    })
}
