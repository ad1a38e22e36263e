use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::geo::AddressFamily;
use crate::ranges::RangeRecord;
use crate::stats::{StatKey, StatRow, StatsQuery};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid stats query: {0}")]
    InvalidQuery(String),
    #[error("corrupt range row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted generation of one family's range table.
#[derive(Debug, Clone, Default)]
pub struct StoredRanges {
    /// Zero when the family has never been loaded.
    pub version: i64,
    pub records: Vec<RangeRecord>,
}

/// Row counts from a two-phase range replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub upserted: u64,
    pub removed: u64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Live range rows and current version for a family
    async fn load_ranges(&self, family: AddressFamily) -> StorageResult<StoredRanges>;

    /// Current stored version of a family, zero when never loaded
    async fn range_version(&self, family: AddressFamily) -> StorageResult<i64>;

    /// Replace a family's ranges in a single transaction.
    ///
    /// Live rows are marked pending-delete, `records` are upserted as live,
    /// rows still pending are deleted and `version` is recorded. A failure
    /// rolls back and leaves the previous generation in place.
    async fn replace_ranges(
        &self,
        family: AddressFamily,
        records: &[RangeRecord],
        version: i64,
    ) -> StorageResult<ReplaceOutcome>;

    /// Add `amount` to the counter for `key`, creating it at `amount` if absent
    async fn increment_stat(&self, key: &StatKey, amount: i64) -> StorageResult<()>;

    /// Delete counters dated strictly before `cutoff`
    async fn purge_stats_before(&self, cutoff: NaiveDate) -> StorageResult<u64>;

    /// Run a report query
    async fn query_stats(&self, query: &StatsQuery) -> StorageResult<Vec<StatRow>>;
}
