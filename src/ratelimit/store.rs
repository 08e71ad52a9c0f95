//! Concurrent registry of token buckets keyed by client.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::limit::Limit;

/// Maps client keys to their token buckets.
///
/// The map itself sits behind a reader/writer lock that is only held for a
/// single lookup or insert. Token accounting happens under each bucket's
/// own lock, after the map lock has been released.
pub struct BucketStore {
    /// Buckets indexed by client key
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    /// Time source handed to every bucket the store builds
    clock: Arc<dyn Clock>,
}

impl BucketStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose buckets read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Build a bucket sharing this store's clock, without inserting it.
    pub fn new_bucket(&self, limit: Limit) -> Arc<TokenBucket> {
        Arc::new(TokenBucket::with_clock(limit, self.clock.clone()))
    }

    /// Get the bucket for a key, if any.
    pub fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.buckets.read().get(key).cloned()
    }

    /// Insert or replace the bucket for a key.
    pub fn set(&self, key: &str, bucket: Arc<TokenBucket>) {
        let previous = self.buckets.write().insert(key.to_string(), bucket);
        debug!(key = %key, replaced = previous.is_some(), "Bucket installed");
    }

    /// Remove the bucket for a key.
    pub fn delete(&self, key: &str) {
        let removed = self.buckets.write().remove(key);
        debug!(key = %key, removed = removed.is_some(), "Bucket removed");
    }

    /// Get the bucket for a key, creating it from `limit` if it does not exist.
    ///
    /// Concurrent callers racing on the same unseen key all receive the same
    /// bucket.
    pub fn get_or_create(&self, key: &str, limit: Limit) -> Arc<TokenBucket> {
        if let Some(bucket) = self.get(key) {
            return bucket;
        }

        let mut buckets = self.buckets.write();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(
                    key = %key,
                    capacity = limit.capacity,
                    refill_interval = ?limit.refill_interval,
                    unlimited = limit.unlimited,
                    "Creating new token bucket"
                );
                Arc::new(TokenBucket::with_clock(limit, self.clock.clone()))
            })
            .clone()
    }

    /// Get the number of buckets in the store.
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    /// Check whether the store holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    /// Run one refill pass for a sweep ticking every `tick`.
    ///
    /// Only limited buckets whose refill interval is at least `tick` are
    /// touched; faster buckets refill themselves inside `allow`. Returns the
    /// number of buckets visited.
    pub fn sweep(&self, tick: Duration) -> usize {
        let snapshot: Vec<Arc<TokenBucket>> = self.buckets.read().values().cloned().collect();

        let mut refilled = 0;
        for bucket in snapshot {
            if bucket.is_unlimited() || bucket.refill_interval() < tick {
                continue;
            }
            bucket.refill();
            refilled += 1;
        }

        trace!(refilled = refilled, "Refill sweep complete");
        refilled
    }

    /// Start the background refill task.
    ///
    /// The task runs [`BucketStore::sweep`] every `tick` until the returned
    /// handle is shut down or dropped.
    pub fn spawn_refill(self: &Arc<Self>, tick: Duration) -> RefillHandle {
        let store = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        info!(tick = ?tick, "Starting background refill task");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        store.sweep(tick);
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Background refill task received shutdown");
                        break;
                    }
                }
            }
        });

        RefillHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle owning the background refill task.
pub struct RefillHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefillHandle {
    /// Stop the refill task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Background refill task ended abnormally");
        }
        info!("Background refill task stopped");
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefillHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::thread;

    fn limit(capacity: u64, interval: Duration) -> Limit {
        Limit::new(capacity, interval)
    }

    #[test]
    fn test_store_creation() {
        let store = BucketStore::new();
        assert!(store.is_empty());
        assert!(store.get("anyone").is_none());
    }

    #[test]
    fn test_set_replaces_existing_bucket() {
        let store = BucketStore::new();
        store.set("client", store.new_bucket(limit(1, Duration::from_secs(1))));
        store.set("client", store.new_bucket(limit(50, Duration::from_secs(1))));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("client").unwrap().capacity(), 50);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = BucketStore::new();
        store.get_or_create("client", limit(5, Duration::from_secs(1)));

        for _ in 0..3 {
            store.delete("client");
            assert!(store.get("client").is_none());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let store = BucketStore::new();
        let first = store.get_or_create("client", limit(5, Duration::from_secs(1)));
        let second = store.get_or_create("client", limit(99, Duration::from_secs(9)));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.capacity(), 5);
    }

    #[test]
    fn test_concurrent_get_or_create_single_winner() {
        let store = Arc::new(BucketStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create("shared", limit(5, Duration::from_secs(1))))
            })
            .collect();

        let buckets: Vec<Arc<TokenBucket>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.len(), 1);
        for bucket in &buckets {
            assert!(Arc::ptr_eq(bucket, &buckets[0]));
        }
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = BucketStore::new();
        let noisy = store.get_or_create("noisy", limit(1, Duration::from_secs(3600)));
        let quiet = store.get_or_create("quiet", limit(1, Duration::from_secs(3600)));

        assert!(noisy.allow());
        assert!(!noisy.allow());
        assert!(!noisy.allow());

        assert_eq!(quiet.tokens(), 1);
        assert!(quiet.allow());
    }

    #[test]
    fn test_sweep_skips_buckets_faster_than_tick() {
        let clock = Arc::new(ManualClock::new());
        let store = BucketStore::with_clock(clock.clone());

        let fast = store.get_or_create("fast", limit(100, Duration::from_millis(10)));
        let slow = store.get_or_create("slow", limit(100, Duration::from_secs(5)));
        let exempt = store.get_or_create("exempt", Limit::unlimited());

        for _ in 0..100 {
            assert!(fast.allow());
            assert!(slow.allow());
        }

        clock.advance(Duration::from_secs(10));
        let refilled = store.sweep(Duration::from_secs(1));

        assert_eq!(refilled, 1);
        assert_eq!(fast.tokens(), 0);
        assert_eq!(slow.tokens(), 2);
        assert!(exempt.allow());
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let store = BucketStore::new();
        assert_eq!(store.sweep(Duration::from_secs(1)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_task_refills_idle_buckets() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(BucketStore::with_clock(clock.clone()));
        let bucket = store.get_or_create("idle", limit(2, Duration::from_secs(1)));
        assert!(bucket.allow());
        assert!(bucket.allow());

        let handle = store.spawn_refill(Duration::from_millis(100));

        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(bucket.tokens(), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_refill_task_shutdown() {
        let store = Arc::new(BucketStore::new());
        let handle = store.spawn_refill(Duration::from_millis(10));
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }
}
