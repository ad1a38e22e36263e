//! Range reloads
//!
//! A reload runs download, verify, parse, coalesce, persistent replace and
//! in-memory swap, in that order. Any failure before the swap leaves both the
//! stored and the in-memory generation untouched.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::feed::FeedSource;
use super::parser::parse_feed;
use super::table::{disjoint, RangeRecord, RangeTable, RangeTables};
use crate::geo::{AddressFamily, CountryCode, NormalizedAddress};
use crate::storage::{Storage, StorageError, StorageResult, StoredRanges};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed download failed: {0}")]
    DownloadFailed(String),
    #[error("feed checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("feed download quota exceeded")]
    QuotaExceeded,
    #[error("feed parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },
    #[error("range storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Whether the next scheduled attempt may simply try again.
    ///
    /// Checksum mismatches need an operator; quota errors need a longer wait.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::DownloadFailed(_) | IngestError::ParseError { .. } | IngestError::Storage(_)
        )
    }

    /// Extra delay before the next attempt, if any.
    pub fn backoff(&self, quota_backoff: Duration) -> Option<Duration> {
        match self {
            IngestError::QuotaExceeded => Some(quota_backoff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Shared key for HMAC-signed feeds.
    pub signing_key: Option<Vec<u8>>,
    /// Load feeds whose digest does not verify, logging a warning instead.
    pub accept_checksum_mismatch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    pub family: AddressFamily,
    pub records: usize,
    pub removed: u64,
    pub skipped: usize,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyStatus {
    pub family: AddressFamily,
    pub records: usize,
    pub version: i64,
}

/// A feed to load into one family's table.
#[derive(Clone)]
pub struct FeedJob {
    pub family: AddressFamily,
    pub source: Arc<dyn FeedSource>,
}

pub struct RangeIngester {
    storage: Arc<dyn Storage>,
    tables: Arc<RangeTables>,
    options: IngestOptions,
    // Serializes writers; readers never touch it
    reload_lock: Mutex<()>,
}

impl RangeIngester {
    pub fn new(storage: Arc<dyn Storage>, tables: Arc<RangeTables>, options: IngestOptions) -> Self {
        Self {
            storage,
            tables,
            options,
            reload_lock: Mutex::new(()),
        }
    }

    pub fn tables(&self) -> &Arc<RangeTables> {
        &self.tables
    }

    /// Load both families from storage into memory.
    pub async fn bootstrap(&self) -> StorageResult<Vec<FamilyStatus>> {
        let mut loaded = Vec::with_capacity(AddressFamily::ALL.len());
        for family in AddressFamily::ALL {
            let stored = self.storage.load_ranges(family).await?;
            loaded.push(self.install_stored(family, stored));
        }
        Ok(loaded)
    }

    /// Pick up generations written to storage by another process.
    ///
    /// Compares each family's stored version with the live table and reloads
    /// from storage only when they differ. Returns the families that changed.
    pub async fn refresh(&self) -> StorageResult<Vec<FamilyStatus>> {
        let _guard = self.reload_lock.lock().await;
        let mut refreshed = Vec::new();
        for family in AddressFamily::ALL {
            let live = self.tables.snapshot(family).version();
            if self.storage.range_version(family).await? == live {
                continue;
            }
            let stored = self.storage.load_ranges(family).await?;
            if stored.version == live {
                continue;
            }
            refreshed.push(self.install_stored(family, stored));
        }
        Ok(refreshed)
    }

    fn install_stored(&self, family: AddressFamily, stored: StoredRanges) -> FamilyStatus {
        let table = RangeTable::new(family, stored.version, stored.records);
        info!(
            family = %family,
            records = table.len(),
            version = table.version(),
            "Loaded range table from storage"
        );
        let status = FamilyStatus {
            family,
            records: table.len(),
            version: table.version(),
        };
        self.tables.install(table);
        status
    }

    pub fn status(&self) -> Vec<FamilyStatus> {
        AddressFamily::ALL
            .into_iter()
            .map(|family| {
                let table = self.tables.snapshot(family);
                FamilyStatus {
                    family,
                    records: table.len(),
                    version: table.version(),
                }
            })
            .collect()
    }

    pub fn lookup(&self, addr: &NormalizedAddress) -> CountryCode {
        self.tables.lookup(addr)
    }

    /// Replace `family`'s table with the contents of `source`.
    pub async fn reload(
        &self,
        source: &dyn FeedSource,
        family: AddressFamily,
    ) -> Result<ReloadSummary, IngestError> {
        let _guard = self.reload_lock.lock().await;
        let origin = source.describe();
        info!(family = %family, source = %origin, "Reloading range table");

        let payload = source.fetch().await?;

        if let Some(digest) = &payload.digest {
            if let Err(e) = digest.verify(&payload.body, self.options.signing_key.as_deref()) {
                if !self.options.accept_checksum_mismatch {
                    return Err(e);
                }
                warn!(family = %family, source = %origin, error = %e, "Loading feed despite digest mismatch");
            }
        }

        let body = std::str::from_utf8(&payload.body).map_err(|e| IngestError::ParseError {
            line: 0,
            reason: format!("feed is not valid UTF-8: {e}"),
        })?;
        let parsed = parse_feed(body, family)?;
        let records = coalesce(parsed.records);

        // Another process may have written a newer generation
        let previous = self
            .tables
            .snapshot(family)
            .version()
            .max(self.storage.range_version(family).await?);
        let version = next_version(previous);

        let outcome = self.storage.replace_ranges(family, &records, version).await?;

        let summary = ReloadSummary {
            family,
            records: records.len(),
            removed: outcome.removed,
            skipped: parsed.skipped,
            version,
        };
        self.tables.install(RangeTable::new(family, version, records));

        info!(
            family = %family,
            records = summary.records,
            removed = summary.removed,
            skipped = summary.skipped,
            version,
            "Range table reloaded"
        );
        Ok(summary)
    }

    /// Run every job, continuing past failures.
    pub async fn reload_all(
        &self,
        jobs: &[FeedJob],
    ) -> Vec<(AddressFamily, Result<ReloadSummary, IngestError>)> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push((job.family, self.reload(job.source.as_ref(), job.family).await));
        }
        results
    }
}

/// Versions are unix seconds but must strictly increase per family, even for
/// two reloads within the same second.
fn next_version(previous: i64) -> i64 {
    chrono::Utc::now().timestamp().max(previous + 1)
}

/// Normalize parsed feed records into a lookup-ready list.
///
/// Exact `(low, high)` duplicates keep the last country seen, overlaps are
/// resolved as in [`disjoint`], and touching ranges with the same country
/// are merged.
pub fn coalesce(records: Vec<RangeRecord>) -> Vec<RangeRecord> {
    let mut unique: BTreeMap<(u128, u128), CountryCode> = BTreeMap::new();
    for record in records {
        unique.insert((record.low, record.high), record.country);
    }

    let sorted = unique
        .into_iter()
        .map(|((low, high), country)| RangeRecord::new(low, high, country))
        .collect();

    let mut merged: Vec<RangeRecord> = Vec::new();
    for record in disjoint(sorted) {
        match merged.last_mut() {
            Some(prev)
                if prev.country == record.country
                    && prev.high != u128::MAX
                    && prev.high + 1 == record.low =>
            {
                prev.high = record.high;
            }
            _ => merged.push(record),
        }
    }
    merged
}
