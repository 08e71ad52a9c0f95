//! Admission decisions for client keys.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::bucket::TokenBucket;
use super::limit::Limit;
use super::store::BucketStore;
use crate::directory::ClientDirectory;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request
    Admit,
    /// Reject the request
    Deny {
        /// Seconds until the bucket regenerates a token
        retry_after_secs: u64,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// Resolves buckets for client keys and decides whether to admit requests.
///
/// This struct is thread-safe and can be shared across request tasks.
pub struct RateLimiter {
    /// Bucket registry
    store: Arc<BucketStore>,
    /// Consulted when no bucket is cached for a key
    directory: Arc<dyn ClientDirectory>,
    /// Limit used for keys the directory does not know
    default_limit: Limit,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(
        store: Arc<BucketStore>,
        directory: Arc<dyn ClientDirectory>,
        default_limit: Limit,
    ) -> Self {
        Self {
            store,
            directory,
            default_limit,
        }
    }

    /// Check whether a request from `key` may proceed.
    ///
    /// This consumes a token from the client's bucket when one is available.
    pub async fn check(&self, key: &str) -> Decision {
        let bucket = self.resolve_bucket(key).await;

        trace!(key = %key, "Checking rate limit");

        if bucket.allow() {
            Decision::Admit
        } else {
            debug!(key = %key, capacity = bucket.capacity(), "Rate limit exceeded");
            Decision::Deny {
                retry_after_secs: bucket.retry_after_secs(),
            }
        }
    }

    /// Find the bucket for a key, building one on a cache miss.
    ///
    /// Requests racing on an unseen key each consult the directory, but only
    /// the first to reach the store installs a bucket; the rest share it.
    ///
    /// A directory failure is treated like an unknown client, so the key falls
    /// back to the default limit instead of failing the request.
    pub async fn resolve_bucket(&self, key: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.store.get(key) {
            return bucket;
        }

        match self.directory.lookup_limit(key).await {
            Ok(Some(limit)) => {
                debug!(key = %key, capacity = limit.capacity, "Loaded client limit from directory");
                self.store.get_or_create(key, limit)
            }
            Ok(None) => self.store.get_or_create(key, self.default_limit),
            Err(e) => {
                warn!(key = %key, error = %e, "Client lookup failed, using default limit");
                self.store.get_or_create(key, self.default_limit)
            }
        }
    }

    /// Get the bucket store.
    pub fn store(&self) -> &Arc<BucketStore> {
        &self.store
    }

    /// Get the default limit.
    pub fn default_limit(&self) -> Limit {
        self.default_limit
    }
}
