//! Hybrid eviction scoring.
//!
//! Each entry gets
//!
//! ```text
//! score = age_norm * 0.3 + 1/(access_count + 1) * 0.4 + size_norm * 0.2 + 1/priority * 0.1
//! ```
//!
//! where `age_norm` and `size_norm` are relative to the oldest and largest
//! candidate. Every term grows as an entry becomes a better eviction candidate
//! (older, colder, larger, lower priority), so entries are evicted
//! highest-score first.

use std::cmp::Ordering;

use crate::models::DEFAULT_PRIORITY;

/// Weights of the four score terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub age: f64,
    pub frequency: f64,
    pub size: f64,
    pub priority: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            age: 0.3,
            frequency: 0.4,
            size: 0.2,
            priority: 0.1,
        }
    }
}

/// What the policy needs to know about one cached entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStats {
    pub key: String,
    /// Seconds since the entry was written.
    pub age_secs: f64,
    pub access_count: u64,
    pub size_bytes: u64,
    pub priority: u8,
}

impl EntryStats {
    pub fn new(key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            age_secs: 0.0,
            access_count: 0,
            size_bytes,
            priority: DEFAULT_PRIORITY,
        }
    }
}

/// Budget-triggered eviction planner.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    pub weights: ScoreWeights,
    /// Share of the remaining entries removed per round, in `(0, 1]`.
    pub fraction: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl EvictionPolicy {
    pub fn new(fraction: f64) -> Self {
        Self {
            weights: ScoreWeights::default(),
            fraction: fraction.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Scores `entries`, normalizing age and size against this set.
    pub fn scores(&self, entries: &[EntryStats]) -> Vec<f64> {
        let max_age = entries.iter().map(|e| e.age_secs.max(0.0)).fold(0.0, f64::max);
        let max_size = entries.iter().map(|e| e.size_bytes).max().unwrap_or(0) as f64;

        entries
            .iter()
            .map(|e| {
                let age = if max_age > 0.0 { e.age_secs.max(0.0) / max_age } else { 0.0 };
                let size = if max_size > 0.0 { e.size_bytes as f64 / max_size } else { 0.0 };
                let frequency = 1.0 / (e.access_count as f64 + 1.0);
                let priority = 1.0 / f64::from(e.priority.max(1));

                age * self.weights.age
                    + frequency * self.weights.frequency
                    + size * self.weights.size
                    + priority * self.weights.priority
            })
            .collect()
    }

    /// Keys to evict so that `usage` ends strictly below `budget`.
    ///
    /// Nothing is planned unless `usage > budget`. Otherwise entries are removed
    /// in rounds, each taking the top `fraction` (at least one) of the remaining
    /// entries by score and rescoring the rest, until usage drops below the
    /// budget or no entries remain. Ties go to the lexically smaller key.
    pub fn plan(&self, mut entries: Vec<EntryStats>, mut usage: u64, budget: u64) -> Vec<String> {
        let mut evicted = Vec::new();
        if usage <= budget {
            return evicted;
        }

        while usage >= budget && !entries.is_empty() {
            let scores = self.scores(&entries);
            let mut ranked: Vec<(f64, EntryStats)> = scores.into_iter().zip(entries).collect();
            ranked.sort_by(|(sa, a), (sb, b)| {
                sb.partial_cmp(sa)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.key.cmp(&b.key))
            });

            let batch = ((ranked.len() as f64 * self.fraction).ceil() as usize).clamp(1, ranked.len());
            let rest = ranked.split_off(batch);

            for (_, entry) in ranked {
                if usage < budget {
                    break;
                }
                usage = usage.saturating_sub(entry.size_bytes);
                evicted.push(entry.key);
            }
            entries = rest.into_iter().map(|(_, e)| e).collect();
        }

        evicted
    }
}
