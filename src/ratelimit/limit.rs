//! Rate limit parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Refill interval used when a limit is built with a zero interval.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(1);

/// The parameters a bucket is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Maximum number of tokens (burst size)
    pub capacity: u64,
    /// Time needed to regenerate a single token
    pub refill_interval: Duration,
    /// Whether the bucket skips accounting altogether
    pub unlimited: bool,
}

impl Limit {
    /// Create a limited configuration.
    pub fn new(capacity: u64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
            unlimited: false,
        }
    }

    /// Create a configuration that always admits.
    pub fn unlimited() -> Self {
        Self {
            capacity: 0,
            refill_interval: DEFAULT_REFILL_INTERVAL,
            unlimited: true,
        }
    }

    /// Build a limit from the whole-second representation used in
    /// configuration files and the admin API.
    pub fn from_settings(settings: &LimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_interval: Duration::from_secs(settings.refill_rate_seconds),
            unlimited: settings.unlimited,
        }
    }
}

/// Serialized form of a [`Limit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Maximum number of tokens
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    /// Seconds to regenerate one token; `0` falls back to one second
    #[serde(default = "default_refill_rate_seconds")]
    pub refill_rate_seconds: u64,
    /// Bypass rate limiting
    #[serde(default)]
    pub unlimited: bool,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate_seconds: default_refill_rate_seconds(),
            unlimited: false,
        }
    }
}

fn default_capacity() -> u64 {
    10
}

fn default_refill_rate_seconds() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_from_settings() {
        let settings = LimitSettings {
            capacity: 20,
            refill_rate_seconds: 3,
            unlimited: false,
        };
        let limit = Limit::from_settings(&settings);
        assert_eq!(limit.capacity, 20);
        assert_eq!(limit.refill_interval, Duration::from_secs(3));
        assert!(!limit.unlimited);
    }

    #[test]
    fn test_settings_defaults_from_yaml() {
        let settings: LimitSettings = serde_yaml::from_str("unlimited: true").unwrap();
        assert_eq!(settings.capacity, 10);
        assert_eq!(settings.refill_rate_seconds, 1);
        assert!(settings.unlimited);
    }
}
