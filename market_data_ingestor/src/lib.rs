//! Upstream transport for daily quotes.
//!
//! - [`auth`]: bearer-credential lifecycle ([`auth::TokenManager`]).
//! - [`providers`]: the [`providers::QuoteSource`] seam and its REST implementation.
//! - [`models`]: records, ranges and catalog entries shared with the cache layer.
//! - [`errors`]: `FetchError` and `AuthError`.

pub mod auth;
pub mod errors;
pub mod models;
pub mod providers;
