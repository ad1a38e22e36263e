//! Deferred daily hit counters
//!
//! `record` only touches an in-memory buffer. A background task drains the
//! buffer into storage with increment-or-insert writes, and each flush that
//! wrote rows purges history older than the retention window once per day.

use chrono::{Days, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use super::models::{HitEvent, StatKey, StatRow, StatsQuery};
use crate::config::{StatsConfig, MIN_RETENTION_DAYS};
use crate::storage::{Storage, StorageResult};

/// Source of "today" for counter keys and retention cutoffs.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Manually advanced clock.
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(|e| e.into_inner()) = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    /// Counter rows written.
    pub rows: usize,
    pub hits: i64,
    /// Hits lost to write failures.
    pub dropped: i64,
    pub purged: u64,
}

pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    retention_days: u32,
    pending: DashMap<StatKey, i64>,
    // Cutoff of the last purge pass; also serializes flushes
    last_purge: tokio::sync::Mutex<Option<NaiveDate>>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: &StatsConfig) -> Self {
        Self {
            storage,
            clock,
            enabled: config.analytics_enabled,
            retention_days: config.history_retention_days.max(MIN_RETENTION_DAYS),
            pending: DashMap::new(),
            last_purge: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count one hit for today. Never blocks on storage.
    pub fn record(&self, hit: HitEvent) {
        if !self.enabled {
            return;
        }
        let key = StatKey::from_hit(self.clock.today(), &hit);
        *self.pending.entry(key).or_insert(0) += 1;
    }

    /// Hits buffered but not yet written.
    pub fn pending_hits(&self) -> i64 {
        self.pending.iter().map(|entry| *entry.value()).sum()
    }

    /// Oldest date that survives retention.
    pub fn cutoff(&self) -> NaiveDate {
        let today = self.clock.today();
        today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Write buffered hits to storage, then purge if the cutoff moved.
    pub async fn flush(&self) -> FlushSummary {
        let mut last_purge = self.last_purge.lock().await;

        // Remove entries one at a time so hits recorded mid-flush land in a
        // fresh entry for the next pass
        let keys: Vec<StatKey> = self.pending.iter().map(|e| e.key().clone()).collect();
        let batch: Vec<(StatKey, i64)> = keys
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .filter(|(_, n)| *n > 0)
            .collect();

        let mut summary = FlushSummary::default();
        for (key, amount) in batch {
            match self.storage.increment_stat(&key, amount).await {
                Ok(()) => {
                    summary.rows += 1;
                    summary.hits += amount;
                }
                Err(e) => {
                    tracing::error!(date = %key.date, site_id = key.site_id, hits = amount, error = %e, "Failed to write stat counter");
                    summary.dropped += amount;
                }
            }
        }

        if summary.rows > 0 {
            let cutoff = self.cutoff();
            if *last_purge != Some(cutoff) {
                match self.storage.purge_stats_before(cutoff).await {
                    Ok(purged) => {
                        if purged > 0 {
                            tracing::info!(cutoff = %cutoff, purged, "Purged expired stat counters");
                        }
                        summary.purged = purged;
                        *last_purge = Some(cutoff);
                    }
                    Err(e) => tracing::error!(cutoff = %cutoff, error = %e, "Failed to purge stat counters"),
                }
            }
        }

        if summary.rows > 0 || summary.dropped > 0 {
            tracing::debug!(rows = summary.rows, hits = summary.hits, dropped = summary.dropped, "Flushed stat counters");
        }
        summary
    }

    /// Delete counters older than the retention window now.
    pub async fn purge(&self) -> StorageResult<u64> {
        let mut last_purge = self.last_purge.lock().await;
        let cutoff = self.cutoff();
        let purged = self.storage.purge_stats_before(cutoff).await?;
        *last_purge = Some(cutoff);
        Ok(purged)
    }

    pub async fn query(&self, query: &StatsQuery) -> StorageResult<Vec<StatRow>> {
        self.storage.query_stats(query).await
    }

    /// Flush every `interval` until `shutdown` turns true, then flush once more.
    pub fn start_flush_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        aggregator.flush().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Shutdown signal received, flushing stat counters...");
                            let summary = aggregator.flush().await;
                            tracing::info!(rows = summary.rows, hits = summary.hits, "Stat counters flushed on shutdown");
                            break;
                        }
                    }
                }
            }
        })
    }
}
