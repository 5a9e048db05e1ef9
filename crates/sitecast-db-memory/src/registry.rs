use std::sync::Arc;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use time::OffsetDateTime;
use tracing::debug;

use sitecast_core::{CONNECTION_TTL, ConnectionId, ConnectionRecord, ConnectionRegistry, FanoutError};

/// Connection registry backed by a papaya lock-free map.
///
/// Suitable for a single process; every clone shares the same map.
#[derive(Debug, Clone)]
pub struct InMemoryRegistry {
    records: Arc<PapayaHashMap<ConnectionId, ConnectionRecord>>,
    ttl: time::Duration,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_ttl(CONNECTION_TTL)
    }

    pub fn with_ttl(ttl: time::Duration) -> Self {
        Self {
            records: Arc::new(PapayaHashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.records.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryRegistry {
    async fn register(&self, connection_id: &str, site: &str) -> Result<(), FanoutError> {
        let record =
            ConnectionRecord::new(connection_id, site, OffsetDateTime::now_utc(), self.ttl);
        self.records.pin().insert(connection_id.to_string(), record);
        debug!(connection_id = %connection_id, site = %site, "Connection registered");
        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<(), FanoutError> {
        if self.records.pin().remove(connection_id).is_some() {
            debug!(connection_id = %connection_id, "Connection removed");
        }
        Ok(())
    }

    async fn list_connections(&self, site: &str) -> Result<Vec<ConnectionId>, FanoutError> {
        Ok(self
            .records
            .pin()
            .iter()
            .filter(|(_, record)| record.site == site)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, FanoutError> {
        Ok(self.records.pin().get(connection_id).cloned())
    }
}
