//! Canonical in-memory representation of a daily quote (OHLCV).
//!
//! This struct is the output of every [`QuoteSource`](crate::providers::QuoteSource)
//! implementation and the unit the local cache persists, one per `(symbol, date)`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily OHLCV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRecord {
    /// The symbol this record belongs to (e.g., "7203").
    pub symbol: String,

    /// Trading day. Unique per symbol.
    pub date: NaiveDate,

    /// Opening price.
    pub open: f64,

    /// Highest price of the day.
    pub high: f64,

    /// Lowest price of the day.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Traded volume.
    pub volume: f64,

    /// Optional derived values supplied by the upstream (turnover, adjustment factor, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicators: Option<BTreeMap<String, f64>>,
}

impl OhlcvRecord {
    pub fn new(symbol: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            indicators: None,
        }
    }

    /// Builder-style setter for the four prices and the volume.
    pub fn with_prices(mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self.close = close;
        self.volume = volume;
        self
    }
}

/// Merges batches of records into a single date-ascending series with one record per date.
///
/// Batches are applied in order, so for a date present in several batches the
/// record from the *last* batch wins.
pub fn merge_by_date<I>(batches: I) -> Vec<OhlcvRecord>
where
    I: IntoIterator<Item = Vec<OhlcvRecord>>,
{
    let mut by_date: BTreeMap<NaiveDate, OhlcvRecord> = BTreeMap::new();
    for batch in batches {
        for record in batch {
            by_date.insert(record.date, record);
        }
    }
    by_date.into_values().collect()
}
