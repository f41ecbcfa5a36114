//! Local caching and incremental sync for daily market quotes.
//!
//! The upstream transport and credential handling live in
//! `market_data_ingestor`; this crate adds the persistent SQLite cache
//! ([`store`]), the eviction machinery ([`cache`]), and the
//! [`engine::SyncEngine`] that ties them together for callers.

pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod inflight;
pub mod integrity;
pub mod models;
pub mod schema;
pub mod store;
pub mod sweeper;
pub mod tz;

pub use engine::{EngineSettings, SyncEngine};
pub use store::{LocalCacheStore, StoreSettings};
