//! TOML configuration: parsing, validation, and conversion into component settings.
//!
//! Every key has a default, so an empty file (or no file) is a valid
//! configuration. Unknown keys are rejected to catch typos early.
//!
//! Credentials never live here; see
//! [`Credential::from_env`](market_data_ingestor::auth::Credential::from_env).
//! Two environment variables override file values:
//! - `QUOTE_API_BASE_URL` -> `api.base_url`
//! - `QUOTE_SYNC_DATABASE_URL` -> `store.database_url`
//!
//! Example:
//! ```toml
//! [api]
//! base_url = "https://api.example.com/v1"
//! timeout_secs = 30
//!
//! [store]
//! database_url = "quotes.db"
//! max_bytes = 52428800
//!
//! [sync]
//! market_timezone = "Asia/Tokyo"
//! ```

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use market_data_ingestor::providers::rest::ClientSettings;
use serde::{Deserialize, Serialize};
use shared_utils::env::get_optional_env_var;

use crate::cache::{EvictionPolicy, MemoryCacheSettings};
use crate::engine::EngineSettings;
use crate::store::StoreSettings;
use crate::tz;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api: ApiCfg,
    pub store: StoreCfg,
    pub cache: CacheCfg,
    pub sync: SyncCfg,
}

/// Upstream connection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiCfg {
    pub base_url: String,
    /// Per-request timeout; must be non-zero.
    pub timeout_secs: u64,
    /// Optional client-side quota across all endpoints.
    pub requests_per_minute: Option<u32>,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com/v1".into(),
            timeout_secs: 30,
            requests_per_minute: None,
        }
    }
}

/// Persistent quote store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreCfg {
    /// SQLite file path.
    pub database_url: String,
    pub max_bytes: u64,
    /// 0 disables TTL expiry for the store.
    pub ttl_secs: u64,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            database_url: "quotes.db".into(),
            max_bytes: 50 * 1024 * 1024,
            ttl_secs: 0,
        }
    }
}

/// Eviction and the in-memory catalog cache.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheCfg {
    pub eviction_fraction: f64,
    pub sweep_interval_secs: u64,
    pub compression_threshold_bytes: usize,
    pub catalog_ttl_secs: u64,
    pub catalog_max_bytes: u64,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            eviction_fraction: 0.2,
            sweep_interval_secs: 30,
            compression_threshold_bytes: 4096,
            catalog_ttl_secs: 24 * 60 * 60,
            catalog_max_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Window boundaries for `refresh_recent`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncCfg {
    pub history_start: NaiveDate,
    pub recent_window_days: u32,
    /// IANA zone whose calendar date is "today".
    pub market_timezone: String,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            history_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            recent_window_days: 7,
            market_timezone: "Asia/Tokyo".into(),
        }
    }
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<Config> {
    let cfg: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
    cfg.validate().context("invalid config")?;
    Ok(cfg)
}

/// Read a configuration file from disk, parse, and validate it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than 0");
        }
        if self.api.requests_per_minute == Some(0) {
            bail!("api.requests_per_minute must be greater than 0 when set");
        }
        if self.store.max_bytes == 0 {
            bail!("store.max_bytes must be greater than 0");
        }
        if self.cache.catalog_max_bytes == 0 {
            bail!("cache.catalog_max_bytes must be greater than 0");
        }
        let fraction = self.cache.eviction_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            bail!("cache.eviction_fraction must be in (0, 1], got {fraction}");
        }
        if self.cache.sweep_interval_secs == 0 {
            bail!("cache.sweep_interval_secs must be greater than 0");
        }
        if self.sync.recent_window_days == 0 {
            bail!("sync.recent_window_days must be greater than 0");
        }
        tz::parse_tz(&self.sync.market_timezone)?;
        Ok(())
    }

    /// Applies `QUOTE_API_BASE_URL` / `QUOTE_SYNC_DATABASE_URL` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = get_optional_env_var("QUOTE_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = get_optional_env_var("QUOTE_SYNC_DATABASE_URL") {
            self.store.database_url = url;
        }
        self
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            requests_per_minute: self.api.requests_per_minute.and_then(NonZeroU32::new),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            max_bytes: self.store.max_bytes,
            ttl: (self.store.ttl_secs > 0).then(|| Duration::from_secs(self.store.ttl_secs)),
        }
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.cache.eviction_fraction)
    }

    pub fn catalog_settings(&self) -> MemoryCacheSettings {
        MemoryCacheSettings {
            default_ttl: (self.cache.catalog_ttl_secs > 0).then(|| Duration::from_secs(self.cache.catalog_ttl_secs)),
            max_bytes: self.cache.catalog_max_bytes,
            compression_threshold: self.cache.compression_threshold_bytes,
        }
    }

    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        Ok(EngineSettings {
            history_start: self.sync.history_start,
            recent_window_days: self.sync.recent_window_days,
            market_tz: tz::parse_tz(&self.sync.market_timezone)?,
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }
}
