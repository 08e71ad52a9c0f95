//! Rate limiting logic and state management.

mod bucket;
mod clock;
mod limit;
mod limiter;
mod store;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limit::{Limit, LimitSettings, DEFAULT_REFILL_INTERVAL};
pub use limiter::{Decision, RateLimiter};
pub use store::{BucketStore, RefillHandle};
