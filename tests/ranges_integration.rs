//! Range ingestion integration tests
//!
//! Feeds are loaded into in-memory SQLite storage and checked through both
//! the live tables and what a fresh process would bootstrap from storage.

use geoloc::config::ResolverConfig;
use geoloc::geo::{normalize, AddressFamily, CountryCode};
use geoloc::ranges::{
    spawn_refresh, DigestKind, FeedDigest, HttpFeed, IngestError, IngestOptions, RangeIngester,
    RangeRecord, RangeTables, StaticFeed,
};
use geoloc::resolver::{RequestContext, SignalResolver, SignalSource};
use geoloc::storage::{SqliteStorage, Storage};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cc(code: &str) -> CountryCode {
    CountryCode::parse(code).unwrap()
}

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn create_ingester(storage: Arc<dyn Storage>, options: IngestOptions) -> RangeIngester {
    RangeIngester::new(storage, Arc::new(RangeTables::new()), options)
}

fn lookup(ingester: &RangeIngester, ip: &str) -> CountryCode {
    ingester.lookup(&normalize(ip).unwrap())
}

#[tokio::test]
async fn test_first_block_resolves_to_us() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(storage, IngestOptions::default());

    let feed = StaticFeed::new("seed", "0,16777215,US\n");
    let summary = ingester.reload(&feed, AddressFamily::V4).await.unwrap();
    assert_eq!(summary.records, 1);
    assert!(summary.version > 0);

    let resolver = SignalResolver::new(Arc::clone(ingester.tables()), &ResolverConfig::default());
    let resolved = resolver.resolve(&RequestContext::new("0.1.2.3")).await;
    assert_eq!(resolved.country, cc("US"));
    assert_eq!(resolved.source, SignalSource::RangeTable);

    assert_eq!(lookup(&ingester, "0.0.0.0"), cc("US"));
    assert_eq!(lookup(&ingester, "0.255.255.255"), cc("US"));
    assert_eq!(lookup(&ingester, "1.0.0.0"), CountryCode::UNKNOWN);
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(Arc::clone(&storage), IngestOptions::default());
    let feed = StaticFeed::new(
        "feed",
        "# sample\n0,99,US\n100,199,CA\n150,250,MX\n100,199,CA\n",
    );

    let first = ingester.reload(&feed, AddressFamily::V4).await.unwrap();
    let records_first = ingester.tables().snapshot(AddressFamily::V4).records().to_vec();
    let stored_first = storage.load_ranges(AddressFamily::V4).await.unwrap();

    let second = ingester.reload(&feed, AddressFamily::V4).await.unwrap();
    let records_second = ingester.tables().snapshot(AddressFamily::V4).records().to_vec();
    let stored_second = storage.load_ranges(AddressFamily::V4).await.unwrap();

    assert_eq!(records_first, records_second);
    assert_eq!(stored_first.records, stored_second.records);
    assert_eq!(stored_second.records, records_second);
    assert_eq!(second.removed, 0);
    assert!(second.version > first.version);
    assert_eq!(stored_second.version, second.version);

    // Overlap was clipped so the table stays disjoint
    for pair in records_second.windows(2) {
        assert!(pair[0].high < pair[1].low);
    }
    assert_eq!(lookup(&ingester, "0.0.0.199"), cc("CA"));
    assert_eq!(lookup(&ingester, "0.0.0.200"), cc("MX"));
}

#[tokio::test]
async fn test_reload_removes_stale_rows() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(Arc::clone(&storage), IngestOptions::default());

    ingester
        .reload(&StaticFeed::new("a", "0,99,US\n100,199,CA\n"), AddressFamily::V4)
        .await
        .unwrap();
    let summary = ingester
        .reload(&StaticFeed::new("b", "0,99,US\n"), AddressFamily::V4)
        .await
        .unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(lookup(&ingester, "0.0.0.150"), CountryCode::UNKNOWN);
    let stored = storage.load_ranges(AddressFamily::V4).await.unwrap();
    assert_eq!(stored.records, vec![RangeRecord::new(0, 99, cc("US"))]);
}

#[tokio::test]
async fn test_bootstrap_restores_tables_from_storage() {
    let storage = create_test_storage().await;
    let writer = create_ingester(Arc::clone(&storage), IngestOptions::default());
    writer
        .reload(&StaticFeed::new("v4", "1.0.0.0/24,AU\n"), AddressFamily::V4)
        .await
        .unwrap();
    let summary = writer
        .reload(
            &StaticFeed::new("v6", "2001:db8::,2001:db8::ffff,NL\nffff::,ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff,JP\n"),
            AddressFamily::V6,
        )
        .await
        .unwrap();

    let reader = create_ingester(storage, IngestOptions::default());
    assert_eq!(lookup(&reader, "1.0.0.1"), CountryCode::UNKNOWN);

    let loaded = reader.bootstrap().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(lookup(&reader, "1.0.0.1"), cc("AU"));
    assert_eq!(lookup(&reader, "2001:db8::1234"), cc("NL"));
    assert_eq!(lookup(&reader, "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"), cc("JP"));
    assert_eq!(
        reader.tables().snapshot(AddressFamily::V6).version(),
        summary.version
    );
}

/// Two handles on one SQLite file, as two processes would have.
struct SharedDb {
    path: std::path::PathBuf,
}

impl SharedDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("geoloc-{}-{}.db", name, std::process::id()));
        let db = Self { path };
        db.cleanup();
        db
    }

    async fn open(&self) -> Arc<dyn Storage> {
        let url = format!("sqlite://{}", self.path.display());
        let storage = SqliteStorage::new(&url, 2).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn cleanup(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

impl Drop for SharedDb {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[tokio::test]
async fn test_follower_refreshes_from_shared_storage() {
    let db = SharedDb::new("refresh");
    let leader = create_ingester(db.open().await, IngestOptions::default());
    let follower = create_ingester(db.open().await, IngestOptions::default());

    follower.bootstrap().await.unwrap();
    assert!(follower.refresh().await.unwrap().is_empty());

    let summary = leader
        .reload(&StaticFeed::new("seed", "0,16777215,US\n"), AddressFamily::V4)
        .await
        .unwrap();
    assert_eq!(lookup(&leader, "0.1.2.3"), cc("US"));
    assert_eq!(lookup(&follower, "0.1.2.3"), CountryCode::UNKNOWN);

    let changed = follower.refresh().await.unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].family, AddressFamily::V4);
    assert_eq!(changed[0].version, summary.version);
    assert_eq!(lookup(&follower, "0.1.2.3"), cc("US"));

    // Nothing new the second time
    assert!(follower.refresh().await.unwrap().is_empty());

    // A reload on the follower continues the shared version sequence
    let next = follower
        .reload(&StaticFeed::new("next", "0,16777215,CA\n"), AddressFamily::V4)
        .await
        .unwrap();
    assert!(next.version > summary.version);
    leader.refresh().await.unwrap();
    assert_eq!(lookup(&leader, "0.1.2.3"), cc("CA"));
}

#[tokio::test]
async fn test_refresh_task_clears_resolver_cache() {
    let db = SharedDb::new("refresh-task");
    let leader = create_ingester(db.open().await, IngestOptions::default());
    let follower = Arc::new(create_ingester(db.open().await, IngestOptions::default()));
    follower.bootstrap().await.unwrap();

    let resolver = Arc::new(SignalResolver::new(
        Arc::clone(follower.tables()),
        &ResolverConfig::default(),
    ));
    let ctx = RequestContext::new("0.1.2.3");
    // Caches the unknown answer
    assert_eq!(resolver.resolve(&ctx).await.country, CountryCode::UNKNOWN);

    let (tx, rx) = tokio::sync::watch::channel(false);
    let task = spawn_refresh(
        Arc::clone(&follower),
        Arc::clone(&resolver),
        Duration::from_millis(20),
        rx,
    );

    leader
        .reload(&StaticFeed::new("seed", "0,16777215,US\n"), AddressFamily::V4)
        .await
        .unwrap();

    let mut resolved = resolver.resolve(&ctx).await;
    for _ in 0..250 {
        if resolved.country == cc("US") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        resolved = resolver.resolve(&ctx).await;
    }
    assert_eq!(resolved.country, cc("US"));
    assert_eq!(resolved.source, SignalSource::RangeTable);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_table_untouched() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(Arc::clone(&storage), IngestOptions::default());
    ingester
        .reload(&StaticFeed::new("good", "0,99,US\n"), AddressFamily::V4)
        .await
        .unwrap();
    let version = ingester.tables().snapshot(AddressFamily::V4).version();

    let tampered = StaticFeed::new("tampered", "0,99,RU\n")
        .with_digest(FeedDigest::Sha256("00".repeat(32)));
    let err = ingester
        .reload(&tampered, AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ChecksumMismatch { .. }));

    assert_eq!(lookup(&ingester, "0.0.0.50"), cc("US"));
    assert_eq!(ingester.tables().snapshot(AddressFamily::V4).version(), version);
    let stored = storage.load_ranges(AddressFamily::V4).await.unwrap();
    assert_eq!(stored.records, vec![RangeRecord::new(0, 99, cc("US"))]);
}

#[tokio::test]
async fn test_checksum_mismatch_can_be_accepted() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(
        storage,
        IngestOptions {
            signing_key: None,
            accept_checksum_mismatch: true,
        },
    );

    let tampered =
        StaticFeed::new("tampered", "0,99,RU\n").with_digest(FeedDigest::Sha256("ab".into()));
    ingester.reload(&tampered, AddressFamily::V4).await.unwrap();
    assert_eq!(lookup(&ingester, "0.0.0.50"), cc("RU"));
}

#[tokio::test]
async fn test_parse_error_leaves_table_untouched() {
    let storage = create_test_storage().await;
    let ingester = create_ingester(storage, IngestOptions::default());
    ingester
        .reload(&StaticFeed::new("good", "0,99,US\n"), AddressFamily::V4)
        .await
        .unwrap();

    let err = ingester
        .reload(&StaticFeed::new("bad", "0,99,US\nnot,a,range\n"), AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ParseError { line: 2, .. }));
    assert!(err.is_retryable());

    let err = ingester
        .reload(&StaticFeed::new("empty", "# nothing\n"), AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ParseError { .. }));

    assert_eq!(lookup(&ingester, "0.0.0.50"), cc("US"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookups_never_see_a_mixed_generation() {
    let storage = create_test_storage().await;
    let ingester = Arc::new(create_ingester(storage, IngestOptions::default()));
    let generation_a = "0,99,US\n100,199,CA\n";
    let generation_b = "0,99,DE\n100,199,FR\n";

    ingester
        .reload(&StaticFeed::new("a", generation_a), AddressFamily::V4)
        .await
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let low = normalize("0.0.0.50").unwrap();
    let high = normalize("0.0.0.150").unwrap();

    let mut readers = Vec::new();
    for _ in 0..4 {
        let tables = Arc::clone(ingester.tables());
        let done = Arc::clone(&done);
        readers.push(tokio::spawn(async move {
            let mut checks = 0u64;
            while !done.load(Ordering::Acquire) {
                let snapshot = tables.snapshot(AddressFamily::V4);
                let pair = (snapshot.lookup(&low), snapshot.lookup(&high));
                assert!(
                    pair == (cc("US"), cc("CA")) || pair == (cc("DE"), cc("FR")),
                    "mixed generation: {pair:?}"
                );
                assert!(!tables.lookup(&low).is_unknown());
                checks += 1;
                tokio::task::yield_now().await;
            }
            checks
        }));
    }

    for i in 0..20 {
        let body = if i % 2 == 0 { generation_b } else { generation_a };
        ingester
            .reload(&StaticFeed::new("swap", body), AddressFamily::V4)
            .await
            .unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test]
async fn test_http_feed_with_checksum_companion() {
    let server = MockServer::start().await;
    let body = "\"16777216\",\"16777471\",\"AU\"\n";
    let checksum = hex::encode(Sha256::digest(body.as_bytes()));

    Mock::given(method("GET"))
        .and(path("/v4.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4.csv.sha256"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{checksum}  v4.csv\n")))
        .mount(&server)
        .await;

    let feed = HttpFeed::new(format!("{}/v4.csv", server.uri()), Duration::from_secs(5))
        .unwrap()
        .with_companion(format!("{}/v4.csv.sha256", server.uri()), DigestKind::Sha256);

    let storage = create_test_storage().await;
    let ingester = create_ingester(storage, IngestOptions::default());
    ingester.reload(&feed, AddressFamily::V4).await.unwrap();
    assert_eq!(lookup(&ingester, "1.0.0.1"), cc("AU"));
}

#[tokio::test]
async fn test_http_feed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited.csv"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notice.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("This file can only be downloaded 5 times per hour"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.csv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0,99,US\n"))
        .mount(&server)
        .await;

    let storage = create_test_storage().await;
    let ingester = create_ingester(storage, IngestOptions::default());
    let feed = |name: &str| {
        HttpFeed::new(format!("{}/{name}", server.uri()), Duration::from_secs(5)).unwrap()
    };

    let err = ingester
        .reload(&feed("limited.csv"), AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::QuotaExceeded));
    assert!(!err.is_retryable());

    let err = ingester
        .reload(&feed("notice.csv"), AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::QuotaExceeded));

    let err = ingester
        .reload(&feed("broken.csv"), AddressFamily::V4)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::DownloadFailed(_)));

    // Missing companion fails the reload
    let err = ingester
        .reload(
            &feed("ok.csv").with_companion(format!("{}/missing", server.uri()), DigestKind::Sha256),
            AddressFamily::V4,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::DownloadFailed(_)));

    assert!(ingester.tables().snapshot(AddressFamily::V4).is_empty());
}
