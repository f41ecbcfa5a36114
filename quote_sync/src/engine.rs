//! The consumer-facing sync engine.
//!
//! [`SyncEngine`] answers two questions:
//! - "give me series X for range R" ([`SyncEngine::get_series`]): served from
//!   the local store when it holds anything for R, fetched and persisted
//!   otherwise;
//! - "refresh recent data for X" ([`SyncEngine::refresh_recent`]): the trailing
//!   window is always fetched live, older history is read through the cache,
//!   and the merged series is persisted as one write.
//!
//! Identical concurrent requests share one upstream fetch through
//! [`InFlight`]. A checksum failure on a cached read clears the symbol and
//! falls through to the upstream.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;
use market_data_ingestor::auth::{AuthApi, Credential, TokenManager};
use market_data_ingestor::errors::AuthError;
use market_data_ingestor::models::{DateRange, OhlcvRecord, SymbolInfo, merge_by_date};
use market_data_ingestor::providers::QuoteSource;
use market_data_ingestor::providers::rest::RestClient;
use tracing::{debug, info, warn};

use crate::cache::{EvictionPolicy, MemoryCache, MemoryCacheSettings};
use crate::config::Config;
use crate::errors::{StoreError, SyncError};
use crate::inflight::InFlight;
use crate::models::{CacheStats, ConnectionStatus, SweepReport};
use crate::store::LocalCacheStore;
use crate::tz;

const CATALOG_KEY: &str = "symbols";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Earliest day `refresh_recent` reads back to.
    pub history_start: NaiveDate,
    /// Days before today that are always fetched live.
    pub recent_window_days: u32,
    /// Zone whose calendar date is "today".
    pub market_tz: Tz,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            recent_window_days: 7,
            market_tz: chrono_tz::Asia::Tokyo,
        }
    }
}

impl EngineSettings {
    /// The live window ending on `today`, and the cacheable window before it.
    ///
    /// The older window is `None` when the live window already reaches back
    /// past `history_start`.
    pub fn windows(&self, today: NaiveDate) -> (DateRange, Option<DateRange>) {
        let recent = DateRange::trailing(today, u64::from(self.recent_window_days));
        let older = recent
            .start()
            .checked_sub_days(Days::new(1))
            .and_then(|older_end| DateRange::new(self.history_start, older_end).ok());
        (recent, older)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Series { symbol: String, range: DateRange },
    Recent { symbol: String, today: NaiveDate },
}

type Flight = Result<Arc<Vec<OhlcvRecord>>, SyncError>;

pub struct SyncEngine {
    tokens: Arc<TokenManager>,
    source: Arc<dyn QuoteSource>,
    store: Arc<LocalCacheStore>,
    catalog: MemoryCache<Vec<SymbolInfo>>,
    inflight: InFlight<FlightKey, Flight>,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(tokens: Arc<TokenManager>, source: Arc<dyn QuoteSource>, store: Arc<LocalCacheStore>) -> Self {
        Self {
            tokens,
            source,
            store,
            catalog: MemoryCache::new(MemoryCacheSettings::default(), EvictionPolicy::default()),
            inflight: InFlight::new(),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_catalog_cache(mut self, settings: MemoryCacheSettings, policy: EvictionPolicy) -> Self {
        self.catalog = MemoryCache::new(settings, policy);
        self
    }

    /// Wires the REST client, token manager, and SQLite store described by `cfg`.
    pub async fn from_config(cfg: &Config, credential: Credential) -> anyhow::Result<Self> {
        let client = Arc::new(RestClient::new(cfg.client_settings()).context("build upstream client")?);
        let auth: Arc<dyn AuthApi> = client.clone();
        let tokens = Arc::new(TokenManager::new(auth, credential));

        let store = LocalCacheStore::open(&cfg.store.database_url, cfg.store_settings(), cfg.eviction_policy())
            .await
            .with_context(|| format!("open quote store {}", cfg.store.database_url))?;

        Ok(Self::new(tokens, client, Arc::new(store))
            .with_settings(cfg.engine_settings()?)
            .with_catalog_cache(cfg.catalog_settings(), cfg.eviction_policy()))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &LocalCacheStore {
        &self.store
    }

    /// Records of `symbol` with `start <= date <= end`, ascending and unique by date.
    ///
    /// With `use_cache`, any non-empty stored result for the range is returned
    /// as is. Otherwise the range is fetched upstream and persisted.
    pub async fn get_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        use_cache: bool,
    ) -> Result<Vec<OhlcvRecord>, SyncError> {
        let range = DateRange::new(start, end)?;
        self.series(symbol, range, use_cache).await
    }

    async fn series(&self, symbol: &str, range: DateRange, use_cache: bool) -> Result<Vec<OhlcvRecord>, SyncError> {
        if use_cache {
            match self.store.get(symbol, &range).await {
                Ok(records) if !records.is_empty() => {
                    debug!(symbol, %range, count = records.len(), "cache hit");
                    return Ok(records);
                }
                Ok(_) => debug!(symbol, %range, "cache miss"),
                Err(StoreError::Integrity(err)) => {
                    warn!(symbol, error = %err, "cached series failed verification; refetching");
                    self.store.clear(Some(symbol)).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let key = FlightKey::Series {
            symbol: symbol.to_string(),
            range,
        };
        let records = self.inflight.run(key, || self.fetch_and_store(symbol, range)).await?;
        Ok(records.as_ref().clone())
    }

    async fn fetch_and_store(&self, symbol: &str, range: DateRange) -> Flight {
        let records = self.fetch_remote(symbol, &range).await?;
        if records.is_empty() {
            debug!(symbol, %range, "upstream returned no records; nothing stored");
        } else {
            self.store.put(symbol, &records, &range).await?;
        }
        Ok(Arc::new(records))
    }

    async fn fetch_remote(&self, symbol: &str, range: &DateRange) -> Result<Vec<OhlcvRecord>, SyncError> {
        let credential = self.tokens.get_valid().await?;
        let id_token = credential.id_token.ok_or(AuthError::NoValidCredential)?;
        let records = self.source.fetch_series(symbol, range, &id_token).await?;
        info!(symbol, %range, count = records.len(), "fetched series from upstream");
        Ok(records)
    }

    /// Re-syncs `symbol` with "today" taken in the market time zone.
    pub async fn refresh_recent(&self, symbol: &str) -> Result<Vec<OhlcvRecord>, SyncError> {
        let today = tz::today_in(self.settings.market_tz, Utc::now());
        self.refresh_recent_as_of(symbol, today).await
    }

    /// Fetches the recent window live, reads older history through the cache,
    /// and persists the merged, date-ascending series in one write.
    ///
    /// Where both windows hold a date, the live record wins.
    pub async fn refresh_recent_as_of(&self, symbol: &str, today: NaiveDate) -> Result<Vec<OhlcvRecord>, SyncError> {
        let key = FlightKey::Recent {
            symbol: symbol.to_string(),
            today,
        };
        let records = self.inflight.run(key, || self.refresh(symbol, today)).await?;
        Ok(records.as_ref().clone())
    }

    async fn refresh(&self, symbol: &str, today: NaiveDate) -> Flight {
        let (recent, older) = self.settings.windows(today);

        let live = self.fetch_remote(symbol, &recent).await?;
        let history = match older {
            Some(range) => self.series(symbol, range, true).await?,
            None => Vec::new(),
        };

        let merged = merge_by_date([history, live]);
        let covered = older.map_or(recent, |range| range.union(&recent));
        if !merged.is_empty() {
            self.store.put(symbol, &merged, &covered).await?;
        }
        info!(symbol, %recent, total = merged.len(), "recent window refreshed");
        Ok(Arc::new(merged))
    }

    /// Whether the upstream accepts one of the configured credentials right now.
    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.tokens.get_valid().await {
            Ok(_) => ConnectionStatus {
                success: true,
                message: "upstream accepted the credential".into(),
            },
            Err(err) => ConnectionStatus {
                success: false,
                message: err.to_string(),
            },
        }
    }

    /// Clears one symbol, or the whole store and the symbol catalog.
    /// Returns the number of symbols removed from the store.
    pub async fn clear_cache(&self, symbol: Option<&str>) -> Result<usize, SyncError> {
        let removed = self.store.clear(symbol).await?;
        if symbol.is_none() {
            self.catalog.clear();
        }
        Ok(removed)
    }

    pub async fn get_cache_stats(&self) -> Result<CacheStats, SyncError> {
        Ok(self.store.stats().await?)
    }

    /// The upstream symbol catalog, cached in memory.
    ///
    /// Listing fails open upstream, so an empty catalog is returned but never
    /// cached. Only an authentication failure is an error here.
    pub async fn list_symbols(&self) -> Result<Vec<SymbolInfo>, SyncError> {
        match self.catalog.get(CATALOG_KEY) {
            Ok(Some(symbols)) => {
                debug!(count = symbols.len(), "symbol catalog cache hit");
                return Ok(symbols);
            }
            Ok(None) => debug!("symbol catalog cache miss"),
            Err(err) => warn!(error = %err, "symbol catalog cache unreadable; refetching"),
        }

        let credential = self.tokens.get_valid().await?;
        let id_token = credential.id_token.ok_or(AuthError::NoValidCredential)?;
        let symbols = self.source.fetch_all_symbols(&id_token).await;
        if symbols.is_empty() {
            warn!("upstream symbol catalog empty; not caching");
            return Ok(symbols);
        }

        if let Err(err) = self.catalog.set(CATALOG_KEY, &symbols, None) {
            warn!(error = %err, "symbol catalog not cached");
        }
        Ok(symbols)
    }

    /// Eviction priority for a stored symbol, clamped to `1..=10`.
    pub async fn set_priority(&self, symbol: &str, priority: u8) -> Result<(), SyncError> {
        Ok(self.store.set_priority(symbol, priority).await?)
    }

    /// One TTL pass over the store and the in-memory catalog.
    pub async fn sweep_expired(&self) -> Result<SweepReport, SyncError> {
        let store_symbols = self.store.sweep_expired().await?;
        let memory_entries = self.catalog.sweep_expired();
        Ok(SweepReport {
            store_symbols,
            memory_entries,
        })
    }

    /// The session credential, including any token obtained by refresh or login.
    ///
    /// Nothing is persisted automatically; write it back if that is wanted.
    pub async fn current_credential(&self) -> Credential {
        self.tokens.current_credential().await
    }
}
