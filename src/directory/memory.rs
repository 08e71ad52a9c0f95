//! In-memory client directory.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::{ClientDirectory, ClientRecord};
use crate::error::{Result, TurnstileError};

/// Client directory held in a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    clients: DashMap<String, ClientRecord>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory seeded with `records`.
    ///
    /// Later records win when keys repeat.
    pub fn from_records(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let clients = DashMap::new();
        for record in records {
            if clients.insert(record.key.clone(), record).is_some() {
                warn!("Duplicate client key in seed data, keeping the last entry");
            }
        }
        Self { clients }
    }

    /// Get the number of stored clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check whether the directory holds no clients.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientDirectory for MemoryDirectory {
    async fn add(&self, client: ClientRecord) -> Result<()> {
        client.validate()?;

        match self.clients.entry(client.key.clone()) {
            Entry::Occupied(_) => Err(TurnstileError::ClientExists(client.key)),
            Entry::Vacant(slot) => {
                debug!(key = %client.key, "Client added");
                slot.insert(client);
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<ClientRecord> {
        self.clients
            .get(key)
            .map(|c| c.value().clone())
            .ok_or_else(|| TurnstileError::ClientNotFound(key.to_string()))
    }

    async fn list(&self) -> Result<Vec<ClientRecord>> {
        let mut clients: Vec<ClientRecord> =
            self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(clients)
    }

    async fn update(&self, client: ClientRecord) -> Result<ClientRecord> {
        let mut existing = self
            .clients
            .get_mut(&client.key)
            .ok_or_else(|| TurnstileError::ClientNotFound(client.key.clone()))?;

        existing.capacity = client.capacity;
        existing.refill_rate_seconds = client.refill_rate_seconds;
        existing.unlimited = client.unlimited;

        debug!(key = %client.key, "Client updated");
        Ok((*existing).clone())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.clients.remove(key) {
            Some(_) => {
                debug!(key = %key, "Client deleted");
                Ok(())
            }
            None => Err(TurnstileError::ClientNotFound(key.to_string())),
        }
    }
}
