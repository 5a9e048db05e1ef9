use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FanoutError;

/// A message handed out by [`MessageQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Handle used to acknowledge this delivery of the message
    pub receipt: String,
    pub body: String,
    /// How many times the message has been handed out, this delivery included
    pub receive_count: u32,
}

/// At-least-once message queue between pipeline stages.
///
/// A received message stays invisible to other receivers until it is acked
/// or its visibility timeout expires, after which it is handed out again.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name for logging
    fn name(&self) -> &str;

    async fn send(&self, body: String) -> Result<(), FanoutError>;

    /// Claim up to `max` visible messages.
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, FanoutError>;

    /// Delete a received message for good.
    async fn ack(&self, receipt: &str) -> Result<(), FanoutError>;
}

#[async_trait]
impl<Q> MessageQueue for Arc<Q>
where
    Q: MessageQueue + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn send(&self, body: String) -> Result<(), FanoutError> {
        (**self).send(body).await
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, FanoutError> {
        (**self).receive(max).await
    }

    async fn ack(&self, receipt: &str) -> Result<(), FanoutError> {
        (**self).ack(receipt).await
    }
}
