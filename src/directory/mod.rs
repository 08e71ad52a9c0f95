//! Client records and the directory that stores them.
//!
//! The rate limiter only consults the directory when it has no bucket
//! cached for a key. The admin API uses the rest of the trait to manage
//! records.

mod memory;

pub use memory::MemoryDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::Limit;

/// A client with its own rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// API key identifying the client
    pub key: String,
    /// Bucket capacity
    pub capacity: u64,
    /// Seconds to regenerate one token
    pub refill_rate_seconds: u64,
    /// Bypass rate limiting
    pub unlimited: bool,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Create a new record stamped with the current time.
    pub fn new(key: impl Into<String>, capacity: u64, refill_rate_seconds: u64, unlimited: bool) -> Self {
        Self {
            key: key.into(),
            capacity,
            refill_rate_seconds,
            unlimited,
            created_at: Utc::now(),
        }
    }

    /// The limit this client's bucket is built from.
    pub fn limit(&self) -> Limit {
        Limit {
            capacity: self.capacity,
            refill_interval: Duration::from_secs(self.refill_rate_seconds),
            unlimited: self.unlimited,
        }
    }

    /// Check the record before it is stored.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(TurnstileError::InvalidClient("client_id is required".to_string()));
        }
        Ok(())
    }
}

/// Source of per-client limits and owner of client records.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Look up the limit configured for a client.
    ///
    /// Returns `Ok(None)` when the client is unknown.
    async fn lookup_limit(&self, key: &str) -> Result<Option<Limit>> {
        match self.get(key).await {
            Ok(record) => Ok(Some(record.limit())),
            Err(TurnstileError::ClientNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a new client. Fails if the key is taken.
    async fn add(&self, client: ClientRecord) -> Result<()>;

    /// Fetch a client by key.
    async fn get(&self, key: &str) -> Result<ClientRecord>;

    /// List all clients, newest first.
    async fn list(&self) -> Result<Vec<ClientRecord>>;

    /// Replace the limit fields of an existing client and return the result.
    async fn update(&self, client: ClientRecord) -> Result<ClientRecord>;

    /// Remove a client.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_limit_conversion() {
        let record = ClientRecord::new("key-1", 7, 2, false);
        let limit = record.limit();
        assert_eq!(limit.capacity, 7);
        assert_eq!(limit.refill_interval, Duration::from_secs(2));
        assert!(!limit.unlimited);
    }

    #[test]
    fn test_record_validation_rejects_blank_key() {
        assert!(ClientRecord::new("  ", 1, 1, false).validate().is_err());
        assert!(ClientRecord::new("key", 1, 1, false).validate().is_ok());
    }
}
