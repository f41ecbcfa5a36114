#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use market_data_ingestor::auth::{AuthApi, Credential, TokenManager};
use market_data_ingestor::errors::{AuthError, FetchError};
use market_data_ingestor::models::{DateRange, OhlcvRecord, SymbolInfo};
use market_data_ingestor::providers::QuoteSource;
use quote_sync::cache::EvictionPolicy;
use quote_sync::{EngineSettings, LocalCacheStore, StoreSettings, SyncEngine};
use secrecy::SecretString;
use tempfile::TempDir;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange::new(start, end).unwrap()
}

/// One record per weekday in `[start, end]`, with `close` set to the day of month.
pub fn trading_days(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<OhlcvRecord> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .map(|day| {
            let px = f64::from(day.day());
            OhlcvRecord::new(symbol, day).with_prices(px, px + 1.0, px - 1.0, px, 1_000.0)
        })
        .collect()
}

pub struct TestStore {
    _dir: TempDir, // keep alive for the life of the test
    pub path: String,
    pub store: Arc<LocalCacheStore>,
}

pub async fn setup_store(settings: StoreSettings) -> TestStore {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("quotes.db").to_string_lossy().to_string();
    let store = LocalCacheStore::open(&path, settings, EvictionPolicy::default())
        .await
        .expect("open store");
    TestStore {
        _dir: dir,
        path,
        store: Arc::new(store),
    }
}

/// Upstream auth that issues `"id-token"` for any refresh token and accepts it.
/// With `reject_all`, every call is refused.
#[derive(Default)]
pub struct FakeAuth {
    pub reject_all: bool,
    pub refreshes: AtomicUsize,
}

#[async_trait]
impl AuthApi for FakeAuth {
    async fn login(&self, _email: &str, _password: &SecretString) -> Result<SecretString, AuthError> {
        Err(AuthError::RemoteRejected { status: 401 })
    }

    async fn refresh(&self, _refresh_token: &SecretString) -> Result<SecretString, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.reject_all {
            return Err(AuthError::RemoteRejected { status: 401 });
        }
        Ok(SecretString::from("id-token".to_string()))
    }

    async fn probe(&self, _id_token: &SecretString) -> Result<(), AuthError> {
        if self.reject_all {
            return Err(AuthError::RemoteRejected { status: 401 });
        }
        Ok(())
    }
}

/// In-memory upstream holding a full history per symbol.
#[derive(Default)]
pub struct FakeSource {
    pub history: Mutex<Vec<OhlcvRecord>>,
    pub listing: Mutex<Vec<SymbolInfo>>,
    pub delay: Duration,
    pub fail_with: Option<FetchError>,
    pub fetches: Mutex<Vec<(String, DateRange)>>,
    pub listing_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_history(records: Vec<OhlcvRecord>) -> Self {
        Self {
            history: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Replaces every upstream record of `record.symbol` on `record.date`.
    pub fn revise(&self, record: OhlcvRecord) {
        let mut history = self.history.lock().unwrap();
        history.retain(|r| !(r.symbol == record.symbol && r.date == record.date));
        history.push(record);
    }

    pub fn set_listing(&self, listing: Vec<SymbolInfo>) {
        *self.listing.lock().unwrap() = listing;
    }

    pub fn fetches(&self) -> Vec<(String, DateRange)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl QuoteSource for FakeSource {
    async fn fetch_series(
        &self,
        symbol: &str,
        range: &DateRange,
        _id_token: &SecretString,
    ) -> Result<Vec<OhlcvRecord>, FetchError> {
        self.fetches.lock().unwrap().push((symbol.to_string(), *range));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let mut records: Vec<OhlcvRecord> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.symbol == symbol && range.contains(r.date))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn fetch_all_symbols(&self, _id_token: &SecretString) -> Vec<SymbolInfo> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.listing.lock().unwrap().clone()
    }
}

pub struct TestEngine {
    pub engine: Arc<SyncEngine>,
    pub source: Arc<FakeSource>,
    pub auth: Arc<FakeAuth>,
    pub db: TestStore,
}

pub async fn setup_engine(source: FakeSource) -> TestEngine {
    setup_engine_with(source, FakeAuth::default(), StoreSettings::default()).await
}

pub async fn setup_engine_with(source: FakeSource, auth: FakeAuth, settings: StoreSettings) -> TestEngine {
    let db = setup_store(settings).await;
    let source = Arc::new(source);
    let auth = Arc::new(auth);

    let tokens = Arc::new(TokenManager::new(
        auth.clone(),
        Credential::default().with_refresh_token("refresh-token"),
    ));
    let engine = SyncEngine::new(tokens, source.clone(), db.store.clone()).with_settings(EngineSettings {
        history_start: d(2024, 1, 1),
        ..EngineSettings::default()
    });

    TestEngine {
        engine: Arc::new(engine),
        source,
        auth,
        db,
    }
}
