//! Rolling usage statistics

pub mod aggregator;
pub mod classify;
pub mod models;

pub use aggregator::{Clock, FixedClock, FlushSummary, StatsAggregator, SystemClock};
pub use classify::ClientClassifier;
pub use models::{
    format_date, Channel, ClientClass, Comparison, HitEvent, OrderKey, Ordering, Predicate,
    StatColumn, StatKey, StatRow, StatValue, StatsQuery,
};
