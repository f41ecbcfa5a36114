use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::codec::{self, Encoded};
use crate::cache::entry::CacheEntry;
use crate::cache::policy::EvictionPolicy;
use crate::errors::CacheError;
use crate::models::{DEFAULT_PRIORITY, EvictionReport};

#[derive(Debug, Clone)]
pub struct MemoryCacheSettings {
    /// Applied when `set` is called without an explicit TTL.
    pub default_ttl: Option<Duration>,
    pub max_bytes: u64,
    pub compression_threshold: usize,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_bytes: 8 * 1024 * 1024,
            compression_threshold: 4096,
        }
    }
}

/// Size-bounded, TTL-aware, checksummed in-process cache of `T` values.
///
/// Values are held in encoded form (see [`codec`]); `get` verifies the
/// checksum and decodes a fresh `T` on every hit. The map lock is never held
/// across an `.await`.
pub struct MemoryCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<Encoded>>>,
    settings: MemoryCacheSettings,
    policy: EvictionPolicy,
    _value: PhantomData<fn() -> T>,
}

impl<T> MemoryCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(settings: MemoryCacheSettings, policy: EvictionPolicy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            settings,
            policy,
            _value: PhantomData,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<Encoded>>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<EvictionReport, CacheError> {
        self.set_at(key, value, ttl, DEFAULT_PRIORITY, Utc::now())
    }

    /// Inserts or replaces `key`, then enforces the byte budget.
    pub fn set_at(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        priority: u8,
        now: DateTime<Utc>,
    ) -> Result<EvictionReport, CacheError> {
        let encoded = codec::encode(value, self.settings.compression_threshold)?;
        let size = (encoded.bytes.len() + key.len()) as u64;
        if size > self.settings.max_bytes {
            return Err(CacheError::EntryTooLarge {
                key: key.to_string(),
                size,
                budget: self.settings.max_bytes,
            });
        }

        let entry = CacheEntry {
            key: key.to_string(),
            compressed: encoded.compressed,
            checksum: encoded.checksum.clone(),
            data: encoded,
            timestamp: now,
            ttl: ttl.or(self.settings.default_ttl),
            access_count: 0,
            last_accessed: now,
            size_estimate: size,
            priority,
        };

        let mut entries = self.lock();
        entries.insert(key.to_string(), entry);
        debug!(key, size, "cache entry stored");
        Ok(self.enforce_budget(&mut entries, now))
    }

    pub fn get(&self, key: &str) -> Result<Option<T>, CacheError> {
        self.get_at(key, Utc::now())
    }

    /// Returns the value if present and unexpired, counting the access.
    ///
    /// A checksum mismatch drops the entry and surfaces
    /// [`CacheError::Integrity`]; corrupted bytes are never decoded.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<T>, CacheError> {
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            entries.remove(key);
            return Ok(None);
        }

        match codec::decode(key, &entry.data) {
            Ok(value) => {
                entry.touch(now);
                Ok(Some(value))
            }
            Err(err) => {
                warn!(key, error = %err, "dropping unreadable cache entry");
                entries.remove(key);
                Err(err)
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn usage_bytes(&self) -> u64 {
        self.lock().values().map(|e| e.size_estimate).sum()
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Drops every expired entry regardless of size pressure.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "expired cache entries swept");
        }
        removed
    }

    fn enforce_budget(&self, entries: &mut HashMap<String, CacheEntry<Encoded>>, now: DateTime<Utc>) -> EvictionReport {
        let usage: u64 = entries.values().map(|e| e.size_estimate).sum();
        let stats = entries.values().map(|e| e.stats(now)).collect();
        let plan = self.policy.plan(stats, usage, self.settings.max_bytes);
        if plan.is_empty() {
            return EvictionReport::unchanged(usage);
        }

        let mut after = usage;
        for key in &plan {
            if let Some(entry) = entries.remove(key) {
                after -= entry.size_estimate;
            }
        }
        info!(evicted = plan.len(), bytes_before = usage, bytes_after = after, "cache budget enforced");

        EvictionReport {
            evicted: plan,
            bytes_before: usage,
            bytes_after: after,
        }
    }

    #[cfg(test)]
    fn corrupt(&self, key: &str) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.data.bytes[0] ^= 0xff;
        }
    }
}
