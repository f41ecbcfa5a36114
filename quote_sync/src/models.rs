//! Types returned by the store and the sync engine.
//!
//! Diesel row mappings live in [`rows`].

pub mod rows;

use chrono::{DateTime, Utc};
use market_data_ingestor::models::DateRange;
use serde::Serialize;

/// Default eviction priority for a symbol that never had one set.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Valid priorities, lowest (evicted first) to highest.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// Per-symbol bookkeeping, one per cached symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolMetadata {
    pub symbol: String,
    /// Time of the most recent successful put.
    pub last_updated: DateTime<Utc>,
    /// Incremented by every put; starts at 1.
    pub data_version: u32,
    /// Union of every range ever written for this symbol.
    pub date_range: DateRange,
    pub record_count: u64,
    /// Estimated bytes held for this symbol; feeds the eviction budget.
    pub size_bytes: u64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub priority: u8,
}

/// Summary returned by `get_cache_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_records: u64,
    /// Cached symbols, ascending.
    pub symbols: Vec<String>,
    /// Latest `last_updated` across all symbols; `None` when the store is empty.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Result of `test_connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

/// Outcome of one budget-enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Keys removed, in eviction order.
    pub evicted: Vec<String>,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl EvictionReport {
    pub fn unchanged(bytes: u64) -> Self {
        Self {
            evicted: Vec::new(),
            bytes_before: bytes,
            bytes_after: bytes,
        }
    }
}

/// Outcome of one TTL sweep across the store and the in-memory caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub store_symbols: usize,
    pub memory_entries: usize,
}
