//! Data models for usage statistics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::CountryCode;

/// Execution context a hit was served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Unknown,
    Cli,
    Cron,
    Ajax,
    XmlRpc,
    Rest,
    Feed,
    Backend,
    Frontend,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::Unknown,
        Channel::Cli,
        Channel::Cron,
        Channel::Ajax,
        Channel::XmlRpc,
        Channel::Rest,
        Channel::Feed,
        Channel::Backend,
        Channel::Frontend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Unknown => "unknown",
            Channel::Cli => "cli",
            Channel::Cron => "cron",
            Channel::Ajax => "ajax",
            Channel::XmlRpc => "xmlrpc",
            Channel::Rest => "rest",
            Channel::Feed => "feed",
            Channel::Backend => "backend",
            Channel::Frontend => "frontend",
        }
    }

    /// Map an environment-supplied label onto a channel; anything
    /// unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == label)
            .unwrap_or(Channel::Unknown)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse client classification derived from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientClass {
    Unknown,
    Desktop,
    Mobile,
    Bot,
}

impl ClientClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientClass::Unknown => "unknown",
            ClientClass::Desktop => "desktop",
            ClientClass::Mobile => "mobile",
            ClientClass::Bot => "bot",
        }
    }
}

impl fmt::Display for ClientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One served request, as seen by the statistics subsystem.
#[derive(Debug, Clone)]
pub struct HitEvent {
    pub site_id: i64,
    pub channel: Channel,
    pub client: ClientClass,
    pub country: CountryCode,
    pub language: String,
}

/// Unique key of a daily counter row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub date: NaiveDate,
    pub site_id: i64,
    pub channel: Channel,
    pub client: ClientClass,
    pub country: CountryCode,
    pub language: String,
}

impl StatKey {
    pub fn from_hit(date: NaiveDate, hit: &HitEvent) -> Self {
        Self {
            date,
            site_id: hit.site_id,
            channel: hit.channel,
            client: hit.client,
            country: hit.country.canonical(),
            language: hit.language.clone(),
        }
    }

    pub fn date_text(&self) -> String {
        format_date(self.date)
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Columns of the counter table that queries may filter and group on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatColumn {
    Date,
    Site,
    Channel,
    Client,
    Country,
    Language,
}

impl StatColumn {
    pub fn column_name(self) -> &'static str {
        match self {
            StatColumn::Date => "date",
            StatColumn::Site => "site_id",
            StatColumn::Channel => "channel",
            StatColumn::Client => "client",
            StatColumn::Country => "country",
            StatColumn::Language => "language",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq(StatValue),
    Ne(StatValue),
    Lt(StatValue),
    Le(StatValue),
    Gt(StatValue),
    Ge(StatValue),
    In(Vec<StatValue>),
}

/// A single filter condition; a query's predicates are AND-combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: StatColumn,
    pub op: Comparison,
}

impl Predicate {
    pub fn new(column: StatColumn, op: Comparison) -> Self {
        Self { column, op }
    }

    pub fn eq(column: StatColumn, value: impl Into<StatValue>) -> Self {
        Self::new(column, Comparison::Eq(value.into()))
    }

    /// `date >= from`
    pub fn since(from: NaiveDate) -> Self {
        Self::new(StatColumn::Date, Comparison::Ge(format_date(from).into()))
    }

    /// `date <= to`
    pub fn until(to: NaiveDate) -> Self {
        Self::new(StatColumn::Date, Comparison::Le(format_date(to).into()))
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        StatValue::Int(value)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        StatValue::Text(value.to_string())
    }
}

impl From<String> for StatValue {
    fn from(value: String) -> Self {
        StatValue::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKey {
    Hits,
    Column(StatColumn),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    pub by: OrderKey,
    #[serde(default)]
    pub descending: bool,
}

impl Ordering {
    pub fn hits_desc() -> Self {
        Self {
            by: OrderKey::Hits,
            descending: true,
        }
    }

    pub fn column_asc(column: StatColumn) -> Self {
        Self {
            by: OrderKey::Column(column),
            descending: false,
        }
    }
}

/// Report queries over the counter table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsQuery {
    /// Number of distinct value combinations of `columns`, e.g. distinct
    /// countries seen. Yields one row with an empty group.
    DistinctCount {
        #[serde(default)]
        filter: Vec<Predicate>,
        columns: Vec<StatColumn>,
    },
    /// Hit totals per combination of `group_by`; an empty `group_by` yields
    /// the overall total.
    GroupedSum {
        #[serde(default)]
        filter: Vec<Predicate>,
        #[serde(default)]
        group_by: Vec<StatColumn>,
        #[serde(default)]
        order: Vec<Ordering>,
        #[serde(default)]
        limit: Option<u32>,
    },
}

impl StatsQuery {
    /// Hits per day in chronological order.
    pub fn daily_series(filter: Vec<Predicate>) -> Self {
        StatsQuery::GroupedSum {
            filter,
            group_by: vec![StatColumn::Date],
            order: vec![Ordering::column_asc(StatColumn::Date)],
            limit: None,
        }
    }

    /// The `limit` largest groups by hit count.
    pub fn top(filter: Vec<Predicate>, group_by: Vec<StatColumn>, limit: u32) -> Self {
        StatsQuery::GroupedSum {
            filter,
            group_by,
            order: vec![Ordering::hits_desc()],
            limit: Some(limit),
        }
    }

    pub fn filter(&self) -> &[Predicate] {
        match self {
            StatsQuery::DistinctCount { filter, .. } | StatsQuery::GroupedSum { filter, .. } => {
                filter
            }
        }
    }

    /// Structural checks shared by every storage backend.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StatsQuery::DistinctCount { columns, .. } => {
                if columns.is_empty() {
                    return Err("distinct_count needs at least one column".to_string());
                }
            }
            StatsQuery::GroupedSum {
                group_by, order, ..
            } => {
                for ordering in order {
                    if let OrderKey::Column(column) = ordering.by {
                        if !group_by.contains(&column) {
                            return Err(format!(
                                "cannot order by '{}' without grouping by it",
                                column.column_name()
                            ));
                        }
                    }
                }
            }
        }

        for predicate in self.filter() {
            if let Comparison::In(values) = &predicate.op {
                if values.is_empty() {
                    return Err(format!(
                        "'in' filter on '{}' has no values",
                        predicate.column.column_name()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One result row: group values in `group_by` order, plus the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatRow {
    pub group: Vec<String>,
    pub value: i64,
}
