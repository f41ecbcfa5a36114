//! Request coalescing.
//!
//! Concurrent callers asking for the same key share one execution of the
//! underlying future and all receive a clone of its output. The slot is
//! dropped once the leader finishes, so a later call starts a fresh request
//! rather than replaying a stale result.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

pub struct InFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` unless a call for `key` is already in progress, in which case
    /// this waits for that call and returns its output.
    ///
    /// If the leading caller is cancelled, one of the waiters runs its own `f`.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let value = slot.get_or_init(f).await.clone();

        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
            slots.remove(&key);
        }
        value
    }

    /// Number of keys with a request in progress.
    pub fn pending(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_calls_share_one_execution() {
        let inflight: Arc<InFlight<&'static str, usize>> = Arc::new(InFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let inflight = inflight.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    inflight
                        .run("7203", || async {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            calls.fetch_add(1, Ordering::SeqCst) + 1
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(inflight.pending(), 0);
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let inflight: InFlight<&'static str, usize> = InFlight::new();
        let calls = AtomicUsize::new(0);

        for expected in 1..=3 {
            let got = inflight.run("k", || async { calls.fetch_add(1, Ordering::SeqCst) + 1 }).await;
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn different_keys_do_not_share() {
        let inflight: InFlight<&'static str, &'static str> = InFlight::new();
        let (a, b) = tokio::join!(
            inflight.run("a", || async { "A" }),
            inflight.run("b", || async { "B" }),
        );
        assert_eq!((a, b), ("A", "B"));
    }
}
