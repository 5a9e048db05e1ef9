//! Polling loop that drives one pipeline stage from its queue.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::FanoutConfig;
use crate::error::FanoutError;
use crate::queue::{MessageQueue, QueueMessage};

/// What happened to one queue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Handled,
    /// Malformed; dropped without retry
    Skipped,
    /// Transient failure; left on the queue for redelivery
    Failed,
}

impl RecordOutcome {
    pub fn should_ack(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// A pipeline stage that consumes raw queue bodies.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Stage name for logging
    fn stage(&self) -> &str;

    async fn handle_record(&self, body: &str) -> RecordOutcome;

    /// Records are handled one by one; an outcome never affects the others.
    async fn handle_batch(&self, records: &[QueueMessage]) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            debug!(stage = self.stage(), body = %record.body, "Message body");
            outcomes.push(self.handle_record(&record.body).await);
        }
        outcomes
    }
}

/// Counts for one poll of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct QueueWorker<Q, H>
where
    Q: MessageQueue,
    H: BatchHandler,
{
    queue: Q,
    handler: H,
    batch_size: usize,
    poll_interval: Duration,
}

impl<Q, H> QueueWorker<Q, H>
where
    Q: MessageQueue,
    H: BatchHandler,
{
    pub fn new(queue: Q, handler: H, config: &FanoutConfig) -> Self {
        Self {
            queue,
            handler,
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            stage = self.handler.stage(),
            queue = self.queue.name(),
            "Queue worker started"
        );

        loop {
            let pause = match self.poll_once().await {
                Ok(summary) if summary.received > 0 => Duration::ZERO,
                Ok(_) => self.poll_interval,
                Err(e) => {
                    error!(stage = self.handler.stage(), error = %e, "Failed to poll queue");
                    self.poll_interval
                }
            };

            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    match result {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => {}
                        Err(_) => break,
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(stage = self.handler.stage(), "Queue worker stopped");
    }

    /// Receive one batch, handle it, and ack what should not be redelivered.
    pub async fn poll_once(&self) -> Result<BatchSummary, FanoutError> {
        let records = self.queue.receive(self.batch_size).await?;
        let mut summary = BatchSummary {
            received: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(summary);
        }

        let outcomes = self.handler.handle_batch(&records).await;

        for (record, outcome) in records.iter().zip(outcomes) {
            match outcome {
                RecordOutcome::Handled => summary.handled += 1,
                RecordOutcome::Skipped => summary.skipped += 1,
                RecordOutcome::Failed => summary.failed += 1,
            }
            if outcome.should_ack()
                && let Err(e) = self.queue.ack(&record.receipt).await
            {
                error!(
                    stage = self.handler.stage(),
                    receipt = %record.receipt,
                    error = %e,
                    "Failed to ack queue message"
                );
            }
        }

        debug!(
            stage = self.handler.stage(),
            received = summary.received,
            handled = summary.handled,
            skipped = summary.skipped,
            failed = summary.failed,
            "Processed queue batch"
        );

        Ok(summary)
    }
}
