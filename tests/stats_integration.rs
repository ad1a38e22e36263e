use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use geoloc::config::StatsConfig;
use geoloc::geo::CountryCode;
use geoloc::stats::{
    Channel, ClientClass, FixedClock, HitEvent, Predicate, StatColumn, StatKey, StatsAggregator,
    StatsQuery,
};
use geoloc::storage::{SqliteStorage, Storage};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn setup(today: NaiveDate) -> (Arc<dyn Storage>, Arc<FixedClock>, Arc<StatsAggregator>) {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let clock = Arc::new(FixedClock::new(today));
    let config = StatsConfig {
        history_retention_days: 30,
        ..Default::default()
    };
    let aggregator = Arc::new(StatsAggregator::new(
        Arc::clone(&storage),
        clock.clone(),
        &config,
    ));
    (storage, clock, aggregator)
}

fn hit(site_id: i64, country: &str) -> HitEvent {
    HitEvent {
        site_id,
        channel: Channel::Rest,
        client: ClientClass::Desktop,
        country: CountryCode::coerce(country),
        language: "fr".to_string(),
    }
}

async fn total_for_site(aggregator: &StatsAggregator, site_id: i64) -> i64 {
    let rows = aggregator
        .query(&StatsQuery::GroupedSum {
            filter: vec![Predicate::eq(StatColumn::Site, site_id)],
            group_by: vec![],
            order: vec![],
            limit: None,
        })
        .await
        .unwrap();
    rows[0].value
}

#[tokio::test]
async fn test_hits_accumulate_across_flushes() {
    let (_storage, _clock, aggregator) = setup(date(2024, 6, 30)).await;

    aggregator.record(hit(1, "FR"));
    aggregator.record(hit(1, "FR"));
    assert_eq!(aggregator.pending_hits(), 2);

    let summary = aggregator.flush().await;
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.hits, 2);
    assert_eq!(aggregator.pending_hits(), 0);
    assert_eq!(total_for_site(&aggregator, 1).await, 2);

    aggregator.record(hit(1, "FR"));
    aggregator.flush().await;
    assert_eq!(total_for_site(&aggregator, 1).await, 3);

    // Nothing pending means nothing written
    let summary = aggregator.flush().await;
    assert_eq!(summary.rows, 0);
}

#[tokio::test]
async fn test_unknown_country_is_counted_as_unknown() {
    let (_storage, _clock, aggregator) = setup(date(2024, 6, 30)).await;

    aggregator.record(hit(2, "ZZ"));
    aggregator.flush().await;

    let rows = aggregator
        .query(&StatsQuery::top(
            vec![Predicate::eq(StatColumn::Site, 2)],
            vec![StatColumn::Country],
            10,
        ))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].group, vec!["00".to_string()]);
}

#[tokio::test]
async fn test_flush_purges_expired_rows() {
    let (storage, clock, aggregator) = setup(date(2024, 6, 30)).await;
    assert_eq!(aggregator.cutoff(), date(2024, 5, 31));

    let old = |day: NaiveDate| StatKey {
        date: day,
        site_id: 3,
        channel: Channel::Rest,
        client: ClientClass::Bot,
        country: CountryCode::coerce("DE"),
        language: "de".to_string(),
    };
    storage.increment_stat(&old(date(2024, 5, 30)), 4).await.unwrap();
    storage.increment_stat(&old(date(2024, 5, 31)), 6).await.unwrap();

    aggregator.record(hit(3, "FR"));
    let summary = aggregator.flush().await;
    assert_eq!(summary.purged, 1);

    let series = aggregator
        .query(&StatsQuery::daily_series(vec![Predicate::eq(StatColumn::Site, 3)]))
        .await
        .unwrap();
    let days: Vec<_> = series.iter().map(|r| r.group[0].clone()).collect();
    assert_eq!(days, vec!["2024-05-31", "2024-06-30"]);

    // Same cutoff: no second purge even though an expired row reappears
    storage.increment_stat(&old(date(2024, 5, 30)), 1).await.unwrap();
    aggregator.record(hit(3, "FR"));
    let summary = aggregator.flush().await;
    assert_eq!(summary.purged, 0);

    // The cutoff moves with the clock
    clock.set(date(2024, 7, 1));
    aggregator.record(hit(3, "FR"));
    let summary = aggregator.flush().await;
    assert_eq!(summary.purged, 2);
}

#[tokio::test]
async fn test_explicit_purge() {
    let (storage, _clock, aggregator) = setup(date(2024, 6, 30)).await;
    let key = StatKey {
        date: date(2024, 1, 1),
        site_id: 4,
        channel: Channel::Cron,
        client: ClientClass::Unknown,
        country: CountryCode::coerce("US"),
        language: "en".to_string(),
    };
    storage.increment_stat(&key, 9).await.unwrap();

    assert_eq!(aggregator.purge().await.unwrap(), 1);
    assert_eq!(total_for_site(&aggregator, 4).await, 0);
}

#[tokio::test]
async fn test_flush_task_flushes_on_shutdown() {
    let (_storage, _clock, aggregator) = setup(date(2024, 6, 30)).await;
    let (tx, rx) = watch::channel(false);

    // Long interval: only the first immediate tick and the shutdown flush run
    let task = aggregator.start_flush_task(Duration::from_secs(3600), rx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    aggregator.record(hit(5, "FR"));
    aggregator.record(hit(5, "FR"));
    aggregator.record(hit(5, "FR"));

    tx.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(aggregator.pending_hits(), 0);
    assert_eq!(total_for_site(&aggregator, 5).await, 3);
}

#[tokio::test]
async fn test_disabled_aggregator_records_nothing() {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    let config = StatsConfig {
        analytics_enabled: false,
        ..Default::default()
    };
    let aggregator = StatsAggregator::new(
        Arc::new(storage),
        Arc::new(FixedClock::new(date(2024, 6, 30))),
        &config,
    );

    aggregator.record(hit(6, "FR"));
    assert_eq!(aggregator.pending_hits(), 0);
    assert_eq!(aggregator.flush().await.rows, 0);
}
