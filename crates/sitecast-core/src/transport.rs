use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SendError;
use crate::types::Message;

/// Pushes a message to one addressed connection.
///
/// A failure concerns only that connection (closed, stale, unreachable);
/// it never means the fan-out as a whole failed.
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &str;

    async fn send(&self, connection_id: &str, message: &Message) -> Result<(), SendError>;
}

#[async_trait]
impl<T> TransportSender for Arc<T>
where
    T: TransportSender + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn send(&self, connection_id: &str, message: &Message) -> Result<(), SendError> {
        (**self).send(connection_id, message).await
    }
}
