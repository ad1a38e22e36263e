//! SQL shared by the storage backends
//!
//! Stats queries are rendered from the typed [`StatsQuery`] into SQL text plus
//! positional bind values. Column names only ever come from [`StatColumn`], so
//! user input reaches the database exclusively through binds.

use chrono::NaiveDate;
use std::fmt::Write as _;

use crate::geo::AddressFamily;
use crate::stats::{Comparison, OrderKey, Predicate, StatColumn, StatValue, StatsQuery};

use super::{StorageError, StorageResult};

/// Placeholder style of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Sqlite,
    Postgres,
}

pub(crate) fn range_table(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "ranges_v4",
        AddressFamily::V6 => "ranges_v6",
    }
}

/// Range bounds are stored as 16-byte big-endian blobs so that byte order
/// equals numeric order in both backends.
pub(crate) fn encode_bound(value: u128) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub(crate) fn decode_bound(bytes: &[u8]) -> StorageResult<u128> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("bound is {} bytes, expected 16", bytes.len())))?;
    Ok(u128::from_be_bytes(raw))
}

#[derive(Debug)]
pub(crate) struct RenderedQuery {
    pub sql: String,
    pub binds: Vec<StatValue>,
    /// Number of `g{i}` group columns in the result set.
    pub groups: usize,
}

pub(crate) fn render_stats_query(
    query: &StatsQuery,
    dialect: Dialect,
) -> StorageResult<RenderedQuery> {
    query.validate().map_err(StorageError::InvalidQuery)?;

    let mut binds = Vec::new();
    let filter = render_filter(query.filter(), dialect, &mut binds)?;

    let (sql, groups) = match query {
        StatsQuery::DistinctCount { columns, .. } => {
            let columns = join_columns(columns);
            (
                format!(
                    "SELECT COUNT(*) AS amount FROM (SELECT DISTINCT {columns} FROM stats{filter}) AS d"
                ),
                0,
            )
        }
        // A single total row; ordering and limit have nothing to act on
        StatsQuery::GroupedSum { group_by, .. } if group_by.is_empty() => (
            format!("SELECT CAST(COALESCE(SUM(hits), 0) AS BIGINT) AS amount FROM stats{filter}"),
            0,
        ),
        StatsQuery::GroupedSum {
            group_by,
            order,
            limit,
            ..
        } => {
            let select = group_by
                .iter()
                .enumerate()
                .map(|(i, c)| format!("CAST({} AS TEXT) AS g{i}", c.column_name()))
                .collect::<Vec<_>>()
                .join(", ");

            let mut order_terms: Vec<String> = order
                .iter()
                .map(|o| {
                    let expr = match o.by {
                        OrderKey::Hits => "amount",
                        OrderKey::Column(c) => c.column_name(),
                    };
                    format!("{expr} {}", if o.descending { "DESC" } else { "ASC" })
                })
                .collect();
            // Remaining group columns break ties so results are stable
            for column in group_by {
                if !order.iter().any(|o| o.by == OrderKey::Column(*column)) {
                    order_terms.push(format!("{} ASC", column.column_name()));
                }
            }

            let mut sql = format!(
                "SELECT {select}, CAST(SUM(hits) AS BIGINT) AS amount FROM stats{filter} GROUP BY {} ORDER BY {}",
                join_columns(group_by),
                order_terms.join(", ")
            );
            if let Some(limit) = limit {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (sql, group_by.len())
        }
    };

    Ok(RenderedQuery { sql, binds, groups })
}

fn join_columns(columns: &[StatColumn]) -> String {
    columns
        .iter()
        .map(|c| c.column_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder(dialect: Dialect, binds: &[StatValue]) -> String {
    match dialect {
        Dialect::Sqlite => "?".to_string(),
        Dialect::Postgres => format!("${}", binds.len()),
    }
}

fn render_filter(
    predicates: &[Predicate],
    dialect: Dialect,
    binds: &mut Vec<StatValue>,
) -> StorageResult<String> {
    if predicates.is_empty() {
        return Ok(String::new());
    }

    let mut terms = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let column = predicate.column.column_name();
        let (op, value) = match &predicate.op {
            Comparison::Eq(v) => ("=", v),
            Comparison::Ne(v) => ("<>", v),
            Comparison::Lt(v) => ("<", v),
            Comparison::Le(v) => ("<=", v),
            Comparison::Gt(v) => (">", v),
            Comparison::Ge(v) => (">=", v),
            Comparison::In(values) => {
                let mut slots = Vec::with_capacity(values.len());
                for value in values {
                    binds.push(coerce_value(predicate.column, value)?);
                    slots.push(placeholder(dialect, binds));
                }
                terms.push(format!("{column} IN ({})", slots.join(", ")));
                continue;
            }
        };
        binds.push(coerce_value(predicate.column, value)?);
        terms.push(format!("{column} {op} {}", placeholder(dialect, binds)));
    }

    Ok(format!(" WHERE {}", terms.join(" AND ")))
}

/// Bring a filter value into the stored representation of `column`.
fn coerce_value(column: StatColumn, value: &StatValue) -> StorageResult<StatValue> {
    let invalid = |reason: &str| {
        StorageError::InvalidQuery(format!("{}: {reason}", column.column_name()))
    };

    match (column, value) {
        (StatColumn::Site, StatValue::Int(n)) => Ok(StatValue::Int(*n)),
        (StatColumn::Site, StatValue::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(StatValue::Int)
            .map_err(|_| invalid("expected an integer site id")),
        (StatColumn::Date, StatValue::Text(s)) => {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(|d| StatValue::Text(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| invalid("expected a YYYY-MM-DD date"))
        }
        (StatColumn::Date, StatValue::Int(_)) => Err(invalid("expected a YYYY-MM-DD date")),
        (StatColumn::Country, StatValue::Text(s)) => {
            let code = s.trim().to_ascii_uppercase();
            if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(StatValue::Text(code))
            } else {
                Err(invalid("expected a two-character country code"))
            }
        }
        (_, StatValue::Text(s)) => Ok(StatValue::Text(s.trim().to_ascii_lowercase())),
        (_, StatValue::Int(n)) => Ok(StatValue::Text(n.to_string())),
    }
}
