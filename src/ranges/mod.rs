//! IP range tables and their ingestion

pub mod feed;
pub mod ingest;
pub mod parser;
pub mod schedule;
pub mod table;

pub use feed::{DigestKind, FeedDigest, FeedPayload, FeedSource, FileFeed, HttpFeed, StaticFeed};
pub use ingest::{
    coalesce, FamilyStatus, FeedJob, IngestError, IngestOptions, RangeIngester, ReloadSummary,
};
pub use parser::{parse_feed, ParsedFeed};
pub use schedule::{feed_jobs, spawn_autoupdate, spawn_refresh};
pub use table::{RangeRecord, RangeTable, RangeTables};
