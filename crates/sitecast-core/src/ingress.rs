//! Fan-out planning stage: publish event in, one delivery job per partition out.
//!
//! No transport I/O happens here. The expensive per-connection sends live in
//! the egress stage so both can scale and retry independently.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use tracing::{error, info};

use crate::codec::{decode_publish_event, encode_delivery_job};
use crate::config::FanoutConfig;
use crate::error::FanoutError;
use crate::partition::split;
use crate::queue::MessageQueue;
use crate::registry::ConnectionRegistry;
use crate::types::{DeliveryJob, PublishEvent};
use crate::worker::{BatchHandler, RecordOutcome};

pub struct IngressConsumer<R, Q>
where
    R: ConnectionRegistry,
    Q: MessageQueue,
{
    registry: R,
    egress: Q,
    chunk_size: NonZeroUsize,
}

impl<R, Q> IngressConsumer<R, Q>
where
    R: ConnectionRegistry,
    Q: MessageQueue,
{
    pub fn new(registry: R, egress: Q, config: &FanoutConfig) -> Self {
        Self {
            registry,
            egress,
            chunk_size: config.chunk_size(),
        }
    }

    /// Snapshot the site's connections and partition them into jobs.
    ///
    /// A connection that moves to another site after this snapshot still
    /// receives this message.
    pub async fn plan(&self, event: PublishEvent) -> Result<Vec<DeliveryJob>, FanoutError> {
        let connection_ids = self.registry.list_connections(&event.site).await?;
        let message = event.into_message();

        Ok(split(&connection_ids, self.chunk_size)
            .into_iter()
            .map(|connections| DeliveryJob {
                connections,
                message: message.clone(),
            })
            .collect())
    }

    /// Plan the event and enqueue every job onto the egress queue.
    /// Returns the number of jobs enqueued.
    pub async fn handle(&self, event: PublishEvent) -> Result<usize, FanoutError> {
        let site = event.site.clone();
        let topic = event.topic.clone();
        let jobs = self.plan(event).await?;

        for job in &jobs {
            self.egress.send(encode_delivery_job(job)?).await?;
        }

        info!(
            site = %site,
            topic = %topic,
            jobs = jobs.len(),
            connections = jobs.iter().map(|j| j.connections.len()).sum::<usize>(),
            queue = self.egress.name(),
            "Fan-out planned"
        );

        Ok(jobs.len())
    }
}

#[async_trait]
impl<R, Q> BatchHandler for IngressConsumer<R, Q>
where
    R: ConnectionRegistry,
    Q: MessageQueue,
{
    fn stage(&self) -> &str {
        "ingress"
    }

    async fn handle_record(&self, body: &str) -> RecordOutcome {
        let event = match decode_publish_event(body) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, body_len = body.len(), "Error parsing incoming queue contents");
                return RecordOutcome::Skipped;
            }
        };

        match self.handle(event).await {
            Ok(_) => RecordOutcome::Handled,
            Err(e) => {
                error!(error = %e, "Fan-out planning failed, leaving event for redelivery");
                RecordOutcome::Failed
            }
        }
    }
}
