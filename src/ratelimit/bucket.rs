//! Token bucket implementation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};
use super::limit::{Limit, DEFAULT_REFILL_INTERVAL};

/// Mutable part of a bucket, guarded by the bucket's own lock.
#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// A token bucket admitting one request per token.
///
/// Every read and write of the token count happens under the bucket's own
/// mutex, so buckets belonging to different clients never contend with
/// each other.
pub struct TokenBucket {
    /// Maximum tokens held
    capacity: u64,
    /// Time needed to regenerate one token
    refill_interval: Duration,
    /// Skips accounting entirely
    unlimited: bool,
    /// Time source
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket using the system clock.
    pub fn new(limit: Limit) -> Self {
        Self::with_clock(limit, Arc::new(SystemClock))
    }

    /// Create a full bucket reading time from `clock`.
    ///
    /// A zero refill interval is replaced by one second.
    pub fn with_clock(limit: Limit, clock: Arc<dyn Clock>) -> Self {
        let refill_interval = if limit.refill_interval.is_zero() {
            DEFAULT_REFILL_INTERVAL
        } else {
            limit.refill_interval
        };
        let now = clock.now();

        Self {
            capacity: limit.capacity,
            refill_interval,
            unlimited: limit.unlimited,
            clock,
            state: Mutex::new(BucketState {
                tokens: limit.capacity,
                last_refill: now,
            }),
        }
    }

    /// Try to admit one request.
    ///
    /// Returns `true` if a token was available (or the bucket is unlimited).
    pub fn allow(&self) -> bool {
        if self.unlimited {
            return true;
        }

        let mut state = self.state.lock();
        self.refill_locked(&mut state);

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Top up the bucket for the time elapsed since the last refill.
    pub fn refill(&self) {
        if self.unlimited {
            return;
        }

        let mut state = self.state.lock();
        self.refill_locked(&mut state);
    }

    /// Credit whole intervals only. `last_refill` moves forward only when at
    /// least one token is credited, and the sub-interval remainder is dropped
    /// at that point.
    fn refill_locked(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        let new_tokens = elapsed.as_nanos() / self.refill_interval.as_nanos();

        if new_tokens > 0 {
            let new_tokens = u64::try_from(new_tokens).unwrap_or(u64::MAX);
            state.tokens = self.capacity.min(state.tokens.saturating_add(new_tokens));
            state.last_refill = now;
        }
    }

    /// Current token count, without refilling.
    pub fn tokens(&self) -> u64 {
        self.state.lock().tokens
    }

    /// Get the capacity of this bucket.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the refill interval of this bucket.
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Whether this bucket skips accounting.
    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    /// Whole seconds a denied caller should wait for the next token.
    pub fn retry_after_secs(&self) -> u64 {
        let interval = self.refill_interval;
        let secs = interval.as_secs() + u64::from(interval.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_interval", &self.refill_interval)
            .field("unlimited", &self.unlimited)
            .field("tokens", &self.tokens())
            .finish()
    }
}
