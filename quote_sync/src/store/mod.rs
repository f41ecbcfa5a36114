//! Persistent quote cache on SQLite.
//!
//! [`LocalCacheStore`] keeps daily records keyed by `(symbol, date)` and one
//! [`SymbolMetadata`] row per symbol. Each symbol is one eviction unit: the
//! TTL sweep and the byte budget remove whole symbols, records and metadata
//! together.
//!
//! The public API is async. Diesel is synchronous, so every call runs on
//! tokio's blocking pool against a single mutex-guarded connection.

mod repo;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use market_data_ingestor::models::{DateRange, OhlcvRecord};
use tracing::{debug, info, warn};

use crate::cache::{EntryStats, EvictionPolicy};
use crate::db::{connection, migrate};
use crate::errors::StoreError;
use crate::models::{CacheStats, EvictionReport, PRIORITY_RANGE, SymbolMetadata};

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Budget for the estimated on-disk footprint of all records.
    pub max_bytes: u64,
    /// Symbols not written for longer than this are swept. `None` keeps them forever.
    pub ttl: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            ttl: None,
        }
    }
}

pub struct LocalCacheStore {
    conn: Arc<Mutex<SqliteConnection>>,
    settings: StoreSettings,
    policy: EvictionPolicy,
}

impl LocalCacheStore {
    /// Runs pending migrations on `database_url`, then opens it.
    pub async fn open(database_url: &str, settings: StoreSettings, policy: EvictionPolicy) -> Result<Self, StoreError> {
        let url = database_url.to_string();
        let conn = tokio::task::spawn_blocking(move || {
            migrate::run_sqlite(&url)?;
            connection::connect_sqlite(&url)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        info!(database_url, "quote store opened");
        Ok(Self::from_connection(conn, settings, policy))
    }

    /// Wraps an already-migrated connection.
    pub fn from_connection(conn: SqliteConnection, settings: StoreSettings, policy: EvictionPolicy) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            settings,
            policy,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Records of `symbol` within `range`, ascending by date.
    ///
    /// Fails with [`StoreError::Integrity`] if any stored record no longer
    /// matches its checksum. A non-empty read counts as an access for eviction.
    pub async fn get(&self, symbol: &str, range: &DateRange) -> Result<Vec<OhlcvRecord>, StoreError> {
        let symbol = symbol.to_string();
        let range = *range;
        self.with_conn(move |conn| {
            let records = repo::select_range(conn, &symbol, &range)?;
            if !records.is_empty() {
                repo::touch(conn, &symbol, Utc::now())?;
            }
            debug!(symbol = %symbol, %range, count = records.len(), "store read");
            Ok(records)
        })
        .await
    }

    /// Upserts `records` atomically, then enforces the byte budget.
    ///
    /// The returned metadata describes the committed write. Budget enforcement
    /// is best effort: if it fails, the error is logged, not returned, and
    /// usage may stay above `max_bytes` until the next successful
    /// [`enforce_budget`](Self::enforce_budget). Callers that need the outcome
    /// call `enforce_budget` themselves and get an [`EvictionReport`].
    pub async fn put(&self, symbol: &str, records: &[OhlcvRecord], range: &DateRange) -> Result<SymbolMetadata, StoreError> {
        self.put_at(symbol, records, range, Utc::now()).await
    }

    /// [`put`](Self::put) with an explicit clock.
    pub async fn put_at(
        &self,
        symbol: &str,
        records: &[OhlcvRecord],
        range: &DateRange,
        now: DateTime<Utc>,
    ) -> Result<SymbolMetadata, StoreError> {
        let symbol = symbol.to_string();
        let records = records.to_vec();
        let range = *range;
        let meta = self
            .with_conn(move |conn| repo::upsert_batch(conn, &symbol, &records, &range, now))
            .await?;
        info!(
            symbol = %meta.symbol,
            version = meta.data_version,
            records = meta.record_count,
            range = %meta.date_range,
            "store write"
        );

        if let Err(err) = self.enforce_budget_at(now).await {
            warn!(error = %err, "budget enforcement failed after write");
        }
        Ok(meta)
    }

    /// Deletes one symbol, or everything when `symbol` is `None`.
    /// Returns the number of symbols removed.
    pub async fn clear(&self, symbol: Option<&str>) -> Result<usize, StoreError> {
        let symbol = symbol.map(str::to_string);
        let removed = self
            .with_conn(move |conn| match symbol {
                Some(s) => repo::delete_symbol(conn, &s).map(usize::from),
                None => repo::delete_all(conn),
            })
            .await?;
        info!(removed, "store cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats, StoreError> {
        self.with_conn(|conn| {
            let total_records = repo::count_records(conn)?;
            let all = repo::all_metadata(conn)?;
            Ok(CacheStats {
                total_records,
                last_updated: all.iter().map(|m| m.last_updated).max(),
                symbols: all.into_iter().map(|m| m.symbol).collect(),
            })
        })
        .await
    }

    pub async fn metadata(&self, symbol: &str) -> Result<SymbolMetadata, StoreError> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| repo::find_metadata(conn, &symbol)?.ok_or(StoreError::NotFound(symbol)))
            .await
    }

    pub async fn all_metadata(&self) -> Result<Vec<SymbolMetadata>, StoreError> {
        self.with_conn(repo::all_metadata).await
    }

    /// Sum of the per-symbol size estimates.
    pub async fn usage_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.all_metadata().await?.iter().map(|m| m.size_bytes).sum())
    }

    /// Sets the eviction priority of a cached symbol, clamped to `1..=10`.
    pub async fn set_priority(&self, symbol: &str, priority: u8) -> Result<(), StoreError> {
        let symbol = symbol.to_string();
        let priority = priority.clamp(*PRIORITY_RANGE.start(), *PRIORITY_RANGE.end());
        self.with_conn(move |conn| repo::update_priority(conn, &symbol, priority))
            .await
    }

    pub async fn enforce_budget(&self) -> Result<EvictionReport, StoreError> {
        self.enforce_budget_at(Utc::now()).await
    }

    /// Evicts whole symbols until usage is below `max_bytes`.
    ///
    /// Does nothing unless usage exceeds the budget.
    pub async fn enforce_budget_at(&self, now: DateTime<Utc>) -> Result<EvictionReport, StoreError> {
        let policy = self.policy.clone();
        let budget = self.settings.max_bytes;

        let report = self
            .with_conn(move |conn| {
                let all = repo::all_metadata(conn)?;
                let usage: u64 = all.iter().map(|m| m.size_bytes).sum();
                let stats = all.iter().map(|m| entry_stats(m, now)).collect();

                let plan = policy.plan(stats, usage, budget);
                if plan.is_empty() {
                    return Ok(EvictionReport::unchanged(usage));
                }

                repo::delete_symbols(conn, &plan)?;
                let freed: u64 = all
                    .iter()
                    .filter(|m| plan.contains(&m.symbol))
                    .map(|m| m.size_bytes)
                    .sum();
                Ok(EvictionReport {
                    evicted: plan,
                    bytes_before: usage,
                    bytes_after: usage - freed,
                })
            })
            .await?;

        if !report.evicted.is_empty() {
            info!(
                evicted = ?report.evicted,
                bytes_before = report.bytes_before,
                bytes_after = report.bytes_after,
                budget,
                "store budget enforced"
            );
        }
        Ok(report)
    }

    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Removes every symbol whose last write is more than `ttl` before `now`.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let Some(ttl) = self.settings.ttl.and_then(|t| chrono::Duration::from_std(t).ok()) else {
            return Ok(0);
        };

        let removed = self
            .with_conn(move |conn| {
                let expired: Vec<String> = repo::all_metadata(conn)?
                    .into_iter()
                    .filter(|m| now - m.last_updated > ttl)
                    .map(|m| m.symbol)
                    .collect();
                if expired.is_empty() {
                    return Ok(0);
                }
                repo::delete_symbols(conn, &expired)
            })
            .await?;

        if removed > 0 {
            info!(removed, "expired symbols swept");
        }
        Ok(removed)
    }
}

fn entry_stats(meta: &SymbolMetadata, now: DateTime<Utc>) -> EntryStats {
    EntryStats {
        key: meta.symbol.clone(),
        age_secs: (now - meta.last_updated).num_milliseconds().max(0) as f64 / 1000.0,
        access_count: meta.access_count,
        size_bytes: meta.size_bytes,
        priority: meta.priority,
    }
}
