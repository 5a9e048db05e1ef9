//! PostgreSQL-backed stage queue.
//!
//! Many queues share the `queue_messages` table, keyed by name. Receivers
//! claim rows with `FOR UPDATE SKIP LOCKED`, so concurrent workers never
//! receive the same message while it is invisible.

use std::time::Duration;

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use sitecast_core::{FanoutError, MessageQueue, QueueMessage};

#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    name: String,
    visibility_timeout: Duration,
}

impl PostgresQueue {
    pub fn new(pool: PgPool, name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            name: name.into(),
            visibility_timeout,
        }
    }

    /// Messages still stored for this queue, in flight or not.
    pub async fn depth(&self) -> Result<i64, FanoutError> {
        sqlx_core::query_scalar::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = $1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(queue_error)
    }
}

fn queue_error(e: sqlx_core::error::Error) -> FanoutError {
    FanoutError::Queue(e.to_string())
}

#[async_trait]
impl MessageQueue for PostgresQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String) -> Result<(), FanoutError> {
        sqlx_core::query::query("INSERT INTO queue_messages (id, queue, body) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(&self.name)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.name))]
    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, FanoutError> {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);

        let rows: Vec<(Uuid, String, i32)> = sqlx_core::query_as::query_as(
            r#"
            WITH claimed AS (
                UPDATE queue_messages m
                SET visible_at = NOW() + make_interval(secs => $3),
                    receipt = gen_random_uuid(),
                    receive_count = m.receive_count + 1
                WHERE m.id IN (
                    SELECT id FROM queue_messages
                    WHERE queue = $1 AND visible_at <= NOW()
                    ORDER BY enqueued_at
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING m.receipt, m.body, m.receive_count, m.enqueued_at
            )
            SELECT receipt, body, receive_count FROM claimed ORDER BY enqueued_at
            "#,
        )
        .bind(&self.name)
        .bind(limit)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(queue_error)?;

        debug!(count = rows.len(), "Claimed queue messages");

        Ok(rows
            .into_iter()
            .map(|(receipt, body, receive_count)| QueueMessage {
                receipt: receipt.to_string(),
                body,
                receive_count: u32::try_from(receive_count).unwrap_or(0),
            })
            .collect())
    }

    async fn ack(&self, receipt: &str) -> Result<(), FanoutError> {
        let receipt = Uuid::parse_str(receipt)
            .map_err(|e| FanoutError::Queue(format!("invalid receipt {receipt}: {e}")))?;

        sqlx_core::query::query("DELETE FROM queue_messages WHERE receipt = $1")
            .bind(receipt)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;
        Ok(())
    }
}
