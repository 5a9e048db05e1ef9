use async_trait::async_trait;

use crate::error::FanoutError;
use crate::types::{ConnectionId, ConnectionRecord};

/// Durable mapping from connection id to its current site.
///
/// Implementations keep no cache: every call reads or writes the backing
/// store, so several dispatcher instances can share one registry without
/// coordinating. Writes for the same key are last-write-wins.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Upsert the record for `connection_id` with fresh timestamps.
    /// Re-registering with another site moves the connection.
    async fn register(&self, connection_id: &str, site: &str) -> Result<(), FanoutError>;

    /// Delete the record if present. Removing an unknown id is not an error.
    async fn remove(&self, connection_id: &str) -> Result<(), FanoutError>;

    /// Ids of every connection currently subscribed to `site`, in no particular order.
    async fn list_connections(&self, site: &str) -> Result<Vec<ConnectionId>, FanoutError>;

    /// Fetch a single record
    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, FanoutError>;
}

#[async_trait]
impl<R> ConnectionRegistry for std::sync::Arc<R>
where
    R: ConnectionRegistry + ?Sized,
{
    async fn register(&self, connection_id: &str, site: &str) -> Result<(), FanoutError> {
        (**self).register(connection_id, site).await
    }

    async fn remove(&self, connection_id: &str) -> Result<(), FanoutError> {
        (**self).remove(connection_id).await
    }

    async fn list_connections(&self, site: &str) -> Result<Vec<ConnectionId>, FanoutError> {
        (**self).list_connections(site).await
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, FanoutError> {
        (**self).get(connection_id).await
    }
}
