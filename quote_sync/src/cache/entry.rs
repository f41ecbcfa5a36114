use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::policy::EntryStats;

/// One cached value plus the bookkeeping the eviction policy reads.
///
/// `data` is whatever representation the owning cache keeps at rest; for
/// [`MemoryCache`](crate::cache::MemoryCache) that is the encoded (and
/// possibly compressed) byte form, covered by `checksum`.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    /// Write time.
    pub timestamp: DateTime<Utc>,
    /// `None` never expires.
    pub ttl: Option<Duration>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub size_estimate: u64,
    pub compressed: bool,
    pub priority: u8,
    pub checksum: String,
}

impl<T> CacheEntry<T> {
    /// `true` once strictly more than `ttl` has elapsed since `timestamp`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else { return false };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.timestamp > ttl,
            Err(_) => false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    pub fn stats(&self, now: DateTime<Utc>) -> EntryStats {
        EntryStats {
            key: self.key.clone(),
            age_secs: (now - self.timestamp).num_milliseconds().max(0) as f64 / 1000.0,
            access_count: self.access_count,
            size_bytes: self.size_estimate,
            priority: self.priority,
        }
    }
}
