//! PostgreSQL connection registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use sitecast_core::{CONNECTION_TTL, ConnectionId, ConnectionRecord, ConnectionRegistry, FanoutError};

/// Registry stored in the `connections` table. Every call hits the database.
#[derive(Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
    ttl: time::Duration,
}

impl PostgresRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self::with_ttl(pool, CONNECTION_TTL)
    }

    pub fn with_ttl(pool: PgPool, ttl: time::Duration) -> Self {
        Self { pool, ttl }
    }

    fn time_to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
        DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_else(Utc::now)
    }

    fn chrono_to_time(t: DateTime<Utc>) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(t.timestamp())
            .map(|ts| ts.replace_nanosecond(t.timestamp_subsec_nanos()).unwrap_or(ts))
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

fn storage_error(e: sqlx_core::error::Error) -> FanoutError {
    FanoutError::Storage(e.to_string())
}

#[async_trait]
impl ConnectionRegistry for PostgresRegistry {
    #[instrument(skip(self))]
    async fn register(&self, connection_id: &str, site: &str) -> Result<(), FanoutError> {
        let record =
            ConnectionRecord::new(connection_id, site, OffsetDateTime::now_utc(), self.ttl);

        sqlx_core::query::query(
            r#"
            INSERT INTO connections (connection_id, site, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (connection_id) DO UPDATE
            SET site = EXCLUDED.site,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&record.connection_id)
        .bind(&record.site)
        .bind(Self::time_to_chrono(record.created_at))
        .bind(Self::time_to_chrono(record.expires_at))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        debug!("Connection registered");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, connection_id: &str) -> Result<(), FanoutError> {
        let result = sqlx_core::query::query("DELETE FROM connections WHERE connection_id = $1")
            .bind(connection_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        debug!(removed = result.rows_affected(), "Connection removed");
        Ok(())
    }

    async fn list_connections(&self, site: &str) -> Result<Vec<ConnectionId>, FanoutError> {
        sqlx_core::query_scalar::query_scalar::<_, String>(
            "SELECT connection_id FROM connections WHERE site = $1",
        )
        .bind(site)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, FanoutError> {
        let row: Option<(String, String, DateTime<Utc>, DateTime<Utc>)> =
            sqlx_core::query_as::query_as(
                r#"
                SELECT connection_id, site, created_at, expires_at
                FROM connections WHERE connection_id = $1
                "#,
            )
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(
            row.map(|(connection_id, site, created_at, expires_at)| ConnectionRecord {
                connection_id,
                site,
                created_at: Self::chrono_to_time(created_at),
                expires_at: Self::chrono_to_time(expires_at),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_time_conversion_keeps_microseconds() {
        let t = datetime!(2024-05-01 12:00:00.123456 UTC);
        let back = PostgresRegistry::chrono_to_time(PostgresRegistry::time_to_chrono(t));
        assert_eq!(back, t);
    }
}
