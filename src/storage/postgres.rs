use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::Arc;

use super::sql::{self, Dialect};
use crate::geo::{AddressFamily, CountryCode};
use crate::ranges::RangeRecord;
use crate::stats::{format_date, StatKey, StatRow, StatValue, StatsQuery};
use crate::storage::{ReplaceOutcome, Storage, StorageError, StorageResult, StoredRanges};

/// Rows per multi-row INSERT; Postgres caps a statement at 65535 binds.
const BATCH_ROWS: usize = 1000;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn decode_range(row: &PgRow) -> StorageResult<RangeRecord> {
    let low: Vec<u8> = row.try_get("low")?;
    let high: Vec<u8> = row.try_get("high")?;
    let country: String = row.try_get("country")?;
    Ok(RangeRecord::new(
        sql::decode_bound(&low)?,
        sql::decode_bound(&high)?,
        CountryCode::coerce(&country),
    ))
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        for family in AddressFamily::ALL {
            let table = sql::range_table(family);
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    low BYTEA NOT NULL,
                    high BYTEA NOT NULL,
                    country TEXT NOT NULL,
                    flag INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (low, high)
                )
                "#
            );
            sqlx::query(&ddl).execute(self.pool.as_ref()).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS range_versions (
                family TEXT PRIMARY KEY,
                version BIGINT NOT NULL,
                records BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stats (
                date TEXT NOT NULL,
                site_id BIGINT NOT NULL,
                channel TEXT NOT NULL,
                client TEXT NOT NULL,
                country TEXT NOT NULL,
                language TEXT NOT NULL,
                hits BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (date, site_id, channel, client, country, language)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stats_date ON stats(date)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn load_ranges(&self, family: AddressFamily) -> StorageResult<StoredRanges> {
        let select = format!(
            "SELECT low, high, country FROM {} WHERE flag = 0 ORDER BY low, high",
            sql::range_table(family)
        );
        // Rows and version come from one snapshot
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&select).fetch_all(&mut *tx).await?;
        let records = rows.iter().map(decode_range).collect::<StorageResult<Vec<_>>>()?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM range_versions WHERE family = $1")
                .bind(family.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;

        Ok(StoredRanges {
            version: version.unwrap_or(0),
            records,
        })
    }

    async fn range_version(&self, family: AddressFamily) -> StorageResult<i64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM range_versions WHERE family = $1")
                .bind(family.as_str())
                .fetch_optional(self.pool.as_ref())
                .await?;
        Ok(version.unwrap_or(0))
    }

    async fn replace_ranges(
        &self,
        family: AddressFamily,
        records: &[RangeRecord],
        version: i64,
    ) -> StorageResult<ReplaceOutcome> {
        let table = sql::range_table(family);
        let mut tx = self.pool.begin().await?;

        let mark = format!("UPDATE {table} SET flag = 1 WHERE flag = 0");
        sqlx::query(&mark).execute(&mut *tx).await?;

        for chunk in records.chunks(BATCH_ROWS) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table} (low, high, country, flag) "));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(sql::encode_bound(record.low))
                    .push_bind(sql::encode_bound(record.high))
                    .push_bind(record.country.as_str().to_string())
                    .push("0");
            });
            builder.push(" ON CONFLICT (low, high) DO UPDATE SET country = EXCLUDED.country, flag = 0");
            builder.build().execute(&mut *tx).await?;
        }

        let sweep = format!("DELETE FROM {table} WHERE flag = 1");
        let removed = sqlx::query(&sweep).execute(&mut *tx).await?.rows_affected();

        sqlx::query(
            r#"
            INSERT INTO range_versions (family, version, records)
            VALUES ($1, $2, $3)
            ON CONFLICT (family) DO UPDATE SET version = EXCLUDED.version, records = EXCLUDED.records
            "#,
        )
        .bind(family.as_str())
        .bind(version)
        .bind(records.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReplaceOutcome {
            upserted: records.len() as u64,
            removed,
        })
    }

    async fn increment_stat(&self, key: &StatKey, amount: i64) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stats (date, site_id, channel, client, country, language, hits)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (date, site_id, channel, client, country, language)
            DO UPDATE SET hits = stats.hits + EXCLUDED.hits
            "#,
        )
        .bind(key.date_text())
        .bind(key.site_id)
        .bind(key.channel.as_str())
        .bind(key.client.as_str())
        .bind(key.country.as_str())
        .bind(&key.language)
        .bind(amount)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn purge_stats_before(&self, cutoff: NaiveDate) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM stats WHERE date < $1")
            .bind(format_date(cutoff))
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn query_stats(&self, query: &StatsQuery) -> StorageResult<Vec<StatRow>> {
        let rendered = sql::render_stats_query(query, Dialect::Postgres)?;

        let mut q = sqlx::query(&rendered.sql);
        for value in &rendered.binds {
            q = match value {
                StatValue::Int(n) => q.bind(*n),
                StatValue::Text(s) => q.bind(s.as_str()),
            };
        }

        let rows = q.fetch_all(self.pool.as_ref()).await?;
        rows.iter()
            .map(|row| {
                let group = (0..rendered.groups)
                    .map(|i| row.try_get::<String, _>(format!("g{i}").as_str()))
                    .collect::<Result<Vec<_>, _>>()?;
                let value: i64 = row.try_get("amount")?;
                Ok(StatRow { group, value })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StorageError::from)
    }
}
