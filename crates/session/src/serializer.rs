//! Per-key load serialization.

use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc};

use parking_lot::Mutex;

/// Runs loaders for the same key one at a time, in arrival order.
///
/// Loaders for different keys run concurrently. A failing loader only affects
/// its own caller; the next queued loader runs normally and observes whatever
/// state the failed one left behind.
#[derive(Debug)]
pub struct KeyedSerializer<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedSerializer<K> {
    fn default() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }
}

impl<K: Clone + Eq + Hash> KeyedSerializer<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `loader` once every earlier call for `key` has settled.
    pub async fn run<F, Fut, T>(&self, key: K, loader: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.locks.lock().entry(key.clone()).or_default().clone();
        let _slot = Slot { locks: &self.locks, key, lock: lock.clone() };

        // tokio's mutex queues waiters fairly, which gives FIFO order.
        let _guard = lock.lock().await;
        loader().await
    }

    /// Number of keys with a loader running or queued.
    pub fn in_flight(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Drops the key's lock from the map once no caller holds or awaits it,
/// including when the caller's future is cancelled.
struct Slot<'a, K: Eq + Hash> {
    locks: &'a Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
    key: K,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<K: Eq + Hash> Drop for Slot<'_, K> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Map entry, this slot and the caller's clone. Clones are only taken
        // under the map lock, so the count is stable here.
        if Arc::strong_count(&self.lock) <= 3 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let serializer = Arc::new(KeyedSerializer::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for i in 0..5u32 {
            let serializer = serializer.clone();
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .run("feed", || async move {
                        log.lock().push(("start", i));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        log.lock().push(("end", i));
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        for task in tasks {
            task.await.unwrap();
        }

        let log = log.lock();
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, "start");
            assert_eq!(pair[1].0, "end");
            assert_eq!(pair[0].1, pair[1].1);
        }
        assert_eq!(serializer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_key() {
        let serializer = KeyedSerializer::new();
        let first: Result<(), &str> = serializer.run(1u8, || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));

        let second: Result<u8, &str> = serializer.run(1u8, || async { Ok(7) }).await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_concurrent_loads_initialize_once() {
        let serializer = Arc::new(KeyedSerializer::new());
        let slot: Arc<Mutex<Option<Arc<u32>>>> = Arc::default();
        let inits = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let (serializer, slot, inits) = (serializer.clone(), slot.clone(), inits.clone());
            tasks.push(tokio::spawn(async move {
                serializer
                    .run("feed", || async move {
                        let existing = slot.lock().clone();
                        if let Some(existing) = existing {
                            return existing;
                        }
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        inits.fetch_add(1, Ordering::SeqCst);
                        let handle = Arc::new(42);
                        *slot.lock() = Some(handle.clone());
                        handle
                    })
                    .await
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
