mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{FakeAuth, FakeSource, d, range, setup_engine, setup_engine_with, trading_days};
use diesel::RunQueryDsl;
use market_data_ingestor::errors::{AuthError, FetchError};
use market_data_ingestor::models::{OhlcvRecord, RangeError, SymbolInfo};
use quote_sync::StoreSettings;
use quote_sync::config::load_config_str;
use quote_sync::db::connection;
use quote_sync::errors::SyncError;
use quote_sync::sweeper::spawn_sweeper;
use secrecy::ExposeSecret;

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2023, 12, 1), d(2024, 2, 29)))).await;

    let first = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();
    assert_eq!(t.source.fetch_count(), 1);
    assert_eq!(first.len(), 23);
    assert_eq!(t.db.store.stats().await.unwrap().total_records, 23);

    let second = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();
    assert_eq!(t.source.fetch_count(), 1);
    assert_eq!(second, first);
}

#[tokio::test]
async fn negative_zero_closes_stay_cached() {
    let mut history = trading_days("7203", d(2024, 1, 1), d(2024, 1, 31));
    for record in history.iter_mut().take(3) {
        record.close = -0.0;
    }
    let t = setup_engine(FakeSource::with_history(history)).await;

    for _ in 0..3 {
        let got = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();
        assert_eq!(got.len(), 23);
    }
    assert_eq!(t.source.fetch_count(), 1);
}

#[tokio::test]
async fn series_stays_inside_the_requested_range() {
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2023, 12, 1), d(2024, 2, 29)))).await;
    t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    let cached = t.engine.get_series("7203", d(2024, 1, 10), d(2024, 1, 20), true).await.unwrap();

    assert_eq!(t.source.fetch_count(), 1);
    assert!(cached.iter().all(|r| r.date >= d(2024, 1, 10) && r.date <= d(2024, 1, 20)));
    assert!(cached.windows(2).all(|w| w[0].date < w[1].date));
}

#[tokio::test]
async fn bypassing_the_cache_always_fetches() {
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2024, 1, 1), d(2024, 1, 31)))).await;

    for _ in 0..3 {
        t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), false).await.unwrap();
    }
    assert_eq!(t.source.fetch_count(), 3);
    assert_eq!(t.db.store.metadata("7203").await.unwrap().data_version, 3);
}

#[tokio::test]
async fn inverted_range_is_rejected_before_any_io() {
    let t = setup_engine(FakeSource::default()).await;

    let err = t.engine.get_series("7203", d(2024, 2, 1), d(2024, 1, 1), true).await.unwrap_err();

    assert!(matches!(err, SyncError::InvalidRange(RangeError::StartAfterEnd { .. })));
    assert_eq!(t.source.fetch_count(), 0);
    assert_eq!(t.auth.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_upstream_result_is_not_stored() {
    let t = setup_engine(FakeSource::default()).await;

    let got = t.engine.get_series("0000", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    assert!(got.is_empty());
    assert!(t.engine.get_cache_stats().await.unwrap().symbols.is_empty());
}

#[tokio::test]
async fn fetch_errors_propagate_and_store_nothing() {
    let source = FakeSource {
        fail_with: Some(FetchError::HttpStatus(500)),
        ..FakeSource::default()
    };
    let t = setup_engine(source).await;

    let err = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap_err();

    assert_eq!(err, SyncError::Fetch(FetchError::HttpStatus(500)));
    assert_eq!(t.engine.get_cache_stats().await.unwrap().total_records, 0);
}

#[tokio::test]
async fn auth_failure_propagates_without_fetching() {
    let auth = FakeAuth {
        reject_all: true,
        ..FakeAuth::default()
    };
    let t = setup_engine_with(FakeSource::default(), auth, StoreSettings::default()).await;

    let err = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap_err();

    assert_eq!(err, SyncError::Auth(AuthError::NoValidCredential));
    assert_eq!(t.source.fetch_count(), 0);

    let status = t.engine.test_connection().await;
    assert!(!status.success);
    assert!(!status.message.is_empty());
}

#[tokio::test]
async fn test_connection_succeeds_and_exposes_the_refreshed_token() {
    let t = setup_engine(FakeSource::default()).await;

    let status = t.engine.test_connection().await;

    assert!(status.success);
    let credential = t.engine.current_credential().await;
    assert_eq!(credential.id_token.unwrap().expose_secret(), "id-token");
}

#[tokio::test]
async fn refresh_recent_always_fetches_the_recent_window() {
    let today = d(2024, 3, 15);
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2024, 1, 1), today))).await;
    let recent = range(d(2024, 3, 8), today);
    let older = range(d(2024, 1, 1), d(2024, 3, 7));

    let first = t.engine.refresh_recent_as_of("7203", today).await.unwrap();
    assert_eq!(t.source.fetches(), vec![("7203".to_string(), recent), ("7203".to_string(), older)]);
    assert_eq!(first.first().map(|r| r.date), Some(d(2024, 1, 1)));
    assert_eq!(first.last().map(|r| r.date), Some(d(2024, 3, 15)));

    // Upstream revises a recent bar after the close.
    let revised = OhlcvRecord::new("7203", d(2024, 3, 14)).with_prices(1.0, 1.0, 1.0, 99.0, 1.0);
    t.source.revise(revised.clone());

    let second = t.engine.refresh_recent_as_of("7203", today).await.unwrap();
    assert_eq!(t.source.fetch_count(), 3);
    assert_eq!(t.source.fetches()[2], ("7203".to_string(), recent));
    assert_eq!(second.len(), first.len());
    assert_eq!(second.iter().find(|r| r.date == d(2024, 3, 14)), Some(&revised));

    let stored = t.db.store.get("7203", &range(d(2024, 3, 14), d(2024, 3, 14))).await.unwrap();
    assert_eq!(stored, vec![revised]);
    assert_eq!(t.db.store.metadata("7203").await.unwrap().date_range, range(d(2024, 1, 1), today));
}

#[tokio::test]
async fn refresh_result_is_unique_and_ascending() {
    let today = d(2024, 3, 15);
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2024, 1, 1), today))).await;
    // Stored history overlaps the recent window.
    t.engine.get_series("7203", d(2024, 1, 1), today, true).await.unwrap();

    let merged = t.engine.refresh_recent_as_of("7203", today).await.unwrap();

    assert!(merged.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(merged.len(), trading_days("7203", d(2024, 1, 1), today).len());
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_fetch() {
    let source = FakeSource {
        delay: Duration::from_millis(150),
        ..FakeSource::with_history(trading_days("7203", d(2024, 1, 1), d(2024, 1, 31)))
    };
    let t = setup_engine(source).await;

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let engine = t.engine.clone();
            tokio::spawn(async move { engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 23);
    }
    assert_eq!(t.source.fetch_count(), 1);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_recent_fetch() {
    let today = d(2024, 3, 15);
    let source = FakeSource {
        delay: Duration::from_millis(150),
        ..FakeSource::with_history(trading_days("7203", d(2024, 1, 1), today))
    };
    let t = setup_engine(source).await;

    let (a, b) = tokio::join!(
        t.engine.refresh_recent_as_of("7203", today),
        t.engine.refresh_recent_as_of("7203", today),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    // One recent window plus one older window.
    assert_eq!(t.source.fetch_count(), 2);
}

#[tokio::test]
async fn corrupted_cache_is_cleared_and_refetched() {
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2024, 1, 1), d(2024, 1, 31)))).await;
    let original = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    let mut raw = connection::connect_sqlite(&t.db.path).unwrap();
    diesel::sql_query("UPDATE quotes SET volume = 0 WHERE symbol = '7203' AND date = '2024-01-15'")
        .execute(&mut raw)
        .unwrap();

    let healed = t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    assert_eq!(t.source.fetch_count(), 2);
    assert_eq!(healed, original);
    assert_eq!(t.db.store.get("7203", &range(d(2024, 1, 1), d(2024, 1, 31))).await.unwrap(), original);
}

#[tokio::test]
async fn symbol_catalog_is_cached() {
    let source = FakeSource::default();
    source.set_listing(vec![SymbolInfo {
        code: "7203".into(),
        name: "Toyota Motor".into(),
        sector: Some("Transportation Equipment".into()),
    }]);
    let t = setup_engine(source).await;

    let first = t.engine.list_symbols().await.unwrap();
    let second = t.engine.list_symbols().await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert_eq!(t.source.listing_calls.load(Ordering::SeqCst), 1);

    t.engine.clear_cache(None).await.unwrap();
    t.engine.list_symbols().await.unwrap();
    assert_eq!(t.source.listing_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_symbol_catalog_is_not_cached() {
    let t = setup_engine(FakeSource::default()).await;

    assert!(t.engine.list_symbols().await.unwrap().is_empty());
    assert!(t.engine.list_symbols().await.unwrap().is_empty());
    assert_eq!(t.source.listing_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_cache_for_one_symbol_forces_a_refetch() {
    let t = setup_engine(FakeSource::with_history(trading_days("7203", d(2024, 1, 1), d(2024, 1, 31)))).await;
    t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    assert_eq!(t.engine.clear_cache(Some("7203")).await.unwrap(), 1);
    t.engine.get_series("7203", d(2024, 1, 1), d(2024, 1, 31), true).await.unwrap();

    assert_eq!(t.source.fetch_count(), 2);
}

#[tokio::test]
async fn background_sweeper_removes_expired_symbols() {
    let settings = StoreSettings {
        ttl: Some(Duration::from_secs(3600)),
        ..StoreSettings::default()
    };
    let t = setup_engine_with(FakeSource::default(), FakeAuth::default(), settings).await;
    let jan = range(d(2024, 1, 1), d(2024, 1, 5));
    let long_ago = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    t.db.store
        .put_at("OLD", &trading_days("OLD", jan.start(), jan.end()), &jan, long_ago)
        .await
        .unwrap();
    t.engine.set_priority("OLD", 10).await.unwrap();

    let sweeper = spawn_sweeper(t.engine.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(400)).await;
    sweeper.shutdown().await;

    assert!(t.engine.get_cache_stats().await.unwrap().symbols.is_empty());
}

#[tokio::test]
async fn sweeper_runs_on_the_configured_interval() {
    let cfg = load_config_str("[store]\nttl_secs = 3600\n\n[cache]\nsweep_interval_secs = 1\n").unwrap();
    let t = setup_engine_with(FakeSource::default(), FakeAuth::default(), cfg.store_settings()).await;
    let jan = range(d(2024, 1, 1), d(2024, 1, 5));
    let long_ago = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    t.db.store
        .put_at("OLD", &trading_days("OLD", jan.start(), jan.end()), &jan, long_ago)
        .await
        .unwrap();

    let sweeper = spawn_sweeper(t.engine.clone(), cfg.sweep_interval());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(t.engine.get_cache_stats().await.unwrap().symbols, vec!["OLD"]);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    sweeper.shutdown().await;
    assert!(t.engine.get_cache_stats().await.unwrap().symbols.is_empty());
}

#[tokio::test]
async fn manual_sweep_reports_what_it_removed() {
    let settings = StoreSettings {
        ttl: Some(Duration::from_secs(60)),
        ..StoreSettings::default()
    };
    let t = setup_engine_with(FakeSource::default(), FakeAuth::default(), settings).await;
    let jan = range(d(2024, 1, 1), d(2024, 1, 5));
    let long_ago = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for symbol in ["AAAA", "BBBB"] {
        t.db.store
            .put_at(symbol, &trading_days(symbol, jan.start(), jan.end()), &jan, long_ago)
            .await
            .unwrap();
    }

    let report = t.engine.sweep_expired().await.unwrap();

    assert_eq!(report.store_symbols, 2);
    assert_eq!(report.memory_entries, 0);
}
