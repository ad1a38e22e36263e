pub mod postgres;
mod sql;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{ReplaceOutcome, Storage, StorageError, StorageResult, StoredRanges};
