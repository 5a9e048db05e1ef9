use std::time::Duration;

use futures_util::{StreamExt, future, stream};
use tracing::{debug, info, warn};

use crate::config::FanoutConfig;
use crate::error::SendError;
use crate::transport::TransportSender;
use crate::types::{DeliveryJob, DispatchReport, Message};

/// Delivers one job to every connection it lists.
///
/// Each send is isolated: a failure or timeout on one connection is logged
/// and counted, and never stops the attempts on the others.
pub struct Dispatcher<T>
where
    T: TransportSender,
{
    transport: T,
    send_timeout: Duration,
    max_concurrent_sends: usize,
}

impl<T> Dispatcher<T>
where
    T: TransportSender,
{
    pub fn new(transport: T, config: &FanoutConfig) -> Self {
        Self {
            transport,
            send_timeout: config.send_timeout(),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Attempt delivery to all connections of the job. Sends run concurrently,
    /// so no ordering across connections is implied.
    pub async fn dispatch(&self, job: &DeliveryJob) -> DispatchReport {
        let message = &job.message;

        // Futures are built up front (not polled) so no closure is captured in
        // the awaited type; this sidesteps a rustc higher-ranked `Send` inference issue.
        let sends: Vec<_> = job
            .connections
            .iter()
            .map(|connection_id| self.send_one(connection_id, message))
            .collect();

        let failed = stream::iter(sends)
            .buffer_unordered(self.max_concurrent_sends)
            .filter(|delivered| future::ready(!*delivered))
            .count()
            .await;

        let report = DispatchReport {
            attempted: job.connections.len(),
            failed,
        };

        info!(
            site = %message.site,
            topic = %message.topic,
            transport = self.transport.name(),
            attempted = report.attempted,
            failed = report.failed,
            "Delivery job dispatched"
        );

        report
    }

    async fn send_one(&self, connection_id: &str, message: &Message) -> bool {
        let result =
            match tokio::time::timeout(self.send_timeout, self.transport.send(connection_id, message))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SendError::Timeout {
                    connection_id: connection_id.to_string(),
                    after: self.send_timeout,
                }),
            };

        match result {
            Ok(()) => {
                debug!(connection_id = %connection_id, "Message delivered");
                true
            }
            Err(e) if e.is_gone() => {
                debug!(connection_id = %connection_id, error = %e, "Connection gone, message dropped");
                false
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Could not send to connection");
                false
            }
        }
    }
}
