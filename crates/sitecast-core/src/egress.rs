//! Delivery stage: one job per queue record, handed to the dispatcher.

use async_trait::async_trait;
use tracing::error;

use crate::codec::decode_delivery_job;
use crate::dispatcher::Dispatcher;
use crate::transport::TransportSender;
use crate::types::{DeliveryJob, DispatchReport};
use crate::worker::{BatchHandler, RecordOutcome};

pub struct EgressConsumer<T>
where
    T: TransportSender,
{
    dispatcher: Dispatcher<T>,
}

impl<T> EgressConsumer<T>
where
    T: TransportSender,
{
    pub fn new(dispatcher: Dispatcher<T>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub async fn handle(&self, job: &DeliveryJob) -> DispatchReport {
        self.dispatcher.dispatch(job).await
    }
}

#[async_trait]
impl<T> BatchHandler for EgressConsumer<T>
where
    T: TransportSender,
{
    fn stage(&self) -> &str {
        "egress"
    }

    /// Per-connection failures are already absorbed by the dispatcher, so a
    /// decodable job is always `Handled`.
    async fn handle_record(&self, body: &str) -> RecordOutcome {
        match decode_delivery_job(body) {
            Ok(job) => {
                self.handle(&job).await;
                RecordOutcome::Handled
            }
            Err(e) => {
                error!(error = %e, body_len = body.len(), "Error parsing queue contents");
                RecordOutcome::Skipped
            }
        }
    }
}
