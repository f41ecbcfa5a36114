//! JSON-over-HTTP upstream: token endpoints plus `/listing` and `/quotes`.

pub mod client;
pub mod params;
pub mod response;

pub use client::{ClientSettings, RestClient};
