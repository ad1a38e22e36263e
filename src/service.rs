//! Wiring shared by the server and the admin CLI

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::config::{Config, DatabaseBackend, DatabaseConfig};
use crate::ranges::{IngestOptions, RangeIngester, RangeTables};
use crate::resolver::SignalResolver;
use crate::stats::{ClientClassifier, Clock, StatsAggregator};
use crate::storage::{PostgresStorage, SqliteStorage, Storage};

/// Open and initialize the configured storage backend.
pub async fn connect_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(
                SqliteStorage::new(&config.url, config.max_connections)
                    .await
                    .context("failed to open SQLite database")?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            Arc::new(
                PostgresStorage::new(&config.url, config.max_connections)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            )
        }
    };

    storage.init().await.context("failed to initialize database")?;
    Ok(storage)
}

/// The long-lived components, sharing one set of range tables.
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub tables: Arc<RangeTables>,
    pub ingester: Arc<RangeIngester>,
    pub resolver: Arc<SignalResolver>,
    pub stats: Arc<StatsAggregator>,
}

impl Services {
    pub fn new(storage: Arc<dyn Storage>, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let tables = Arc::new(RangeTables::new());
        let options = IngestOptions {
            signing_key: config.ingest.signing_key.clone().map(String::into_bytes),
            accept_checksum_mismatch: config.ingest.accept_checksum_mismatch,
        };

        Self {
            ingester: Arc::new(RangeIngester::new(
                Arc::clone(&storage),
                Arc::clone(&tables),
                options,
            )),
            resolver: Arc::new(SignalResolver::new(Arc::clone(&tables), &config.resolver)),
            stats: Arc::new(StatsAggregator::new(
                Arc::clone(&storage),
                clock,
                &config.stats,
            )),
            storage,
            tables,
        }
    }

    pub fn app_state(&self, config: &Config) -> Arc<AppState> {
        Arc::new(AppState {
            resolver: Arc::clone(&self.resolver),
            ingester: Arc::clone(&self.ingester),
            stats: Arc::clone(&self.stats),
            classifier: ClientClassifier::new(&config.stats),
            resolver_config: config.resolver.clone(),
            default_site_id: config.stats.default_site_id,
            channel_header: config.stats.channel_header.clone(),
        })
    }
}
