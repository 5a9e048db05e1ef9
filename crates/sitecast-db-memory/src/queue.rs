use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use sitecast_core::{FanoutError, MessageQueue, QueueMessage};

/// Default time a received message stays hidden before redelivery.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Entry {
    body: String,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<Entry>,
    /// receipt -> (entry, redelivery deadline)
    in_flight: HashMap<String, (Entry, Instant)>,
}

impl QueueState {
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some((entry, _)) = self.in_flight.remove(&receipt) {
                self.visible.push_front(entry);
            }
        }
    }
}

/// In-process at-least-once queue with a visibility timeout.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Messages waiting to be received
    pub fn visible_len(&self) -> usize {
        self.state.lock().visible.len()
    }

    /// Messages received but not yet acked
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String) -> Result<(), FanoutError> {
        self.state.lock().visible.push_back(Entry {
            body,
            receive_count: 0,
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, FanoutError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.requeue_expired(now);

        let n = max.min(state.visible.len());
        let mut messages = Vec::with_capacity(n);
        let drained: Vec<Entry> = state.visible.drain(..n).collect();
        for mut entry in drained {
            entry.receive_count += 1;
            let receipt = Uuid::new_v4().to_string();
            messages.push(QueueMessage {
                receipt: receipt.clone(),
                body: entry.body.clone(),
                receive_count: entry.receive_count,
            });
            state
                .in_flight
                .insert(receipt, (entry, now + self.visibility_timeout));
        }

        Ok(messages)
    }

    async fn ack(&self, receipt: &str) -> Result<(), FanoutError> {
        if self.state.lock().in_flight.remove(receipt).is_none() {
            debug!(queue = %self.name, receipt = %receipt, "Ack for unknown or expired receipt");
        }
        Ok(())
    }
}
