//! Generic cache primitives.
//!
//! - [`policy`]: hybrid eviction scoring shared by every cached resource.
//! - [`entry`]: the bookkeeping record behind each cached value.
//! - [`codec`]: JSON encoding, gzip above a threshold, SHA-256 checksums.
//! - [`memory`]: an in-process cache built from the three above.
//!
//! The persistent quote store applies the same [`EvictionPolicy`] and TTL
//! rules to its per-symbol metadata; see [`crate::store`].

pub mod codec;
pub mod entry;
pub mod memory;
pub mod policy;

pub use entry::CacheEntry;
pub use memory::{MemoryCache, MemoryCacheSettings};
pub use policy::{EntryStats, EvictionPolicy, ScoreWeights};
