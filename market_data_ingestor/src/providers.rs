//! Upstream quote sources.
//!
//! [`QuoteSource`] is the seam between the sync engine and whatever vendor
//! serves daily quotes. It is object safe, so the engine holds an
//! `Arc<dyn QuoteSource>` and tests substitute in-memory fakes.
//!
//! The two operations deliberately fail differently:
//! - [`QuoteSource::fetch_series`] fails **closed**: any transport, status or
//!   decoding problem is returned as a [`FetchError`].
//! - [`QuoteSource::fetch_all_symbols`] fails **open**: problems are logged and
//!   an empty catalog is returned.

pub mod rest;

use async_trait::async_trait;
use secrecy::SecretString;
use snafu::{Backtrace, Snafu};

use crate::errors::FetchError;
use crate::models::{DateRange, OhlcvRecord, SymbolInfo};

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Daily records for `symbol` whose date lies in `range`, ascending, one per date.
    async fn fetch_series(
        &self,
        symbol: &str,
        range: &DateRange,
        id_token: &SecretString,
    ) -> Result<Vec<OhlcvRecord>, FetchError>;

    /// The full symbol catalog. Never fails; errors degrade to an empty list.
    async fn fetch_all_symbols(&self, id_token: &SecretString) -> Vec<SymbolInfo>;
}

/// Errors that can occur while constructing a client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid base URL: {url}"))]
    InvalidBaseUrl { url: String, backtrace: Backtrace },

    #[snafu(display("Timeout must be non-zero"))]
    ZeroTimeout { backtrace: Backtrace },
}
