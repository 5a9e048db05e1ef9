use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Opaque identifier assigned by the transport layer at connect time.
pub type ConnectionId = String;

/// Default lifetime of a subscription record.
pub const CONNECTION_TTL: Duration = Duration::hours(24);

/// A connection's current subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: ConnectionId,

    /// Site the connection receives updates for
    pub site: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Advisory only; nothing in the fan-out path filters on it
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ConnectionRecord {
    pub fn new(
        connection_id: impl Into<ConnectionId>,
        site: impl Into<String>,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            site: site.into(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// An event published by a producer for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishEvent {
    pub site: String,
    pub topic: String,
    pub data: serde_json::Value,
}

impl PublishEvent {
    pub fn new(site: impl Into<String>, topic: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            site: site.into(),
            topic: topic.into(),
            data,
        }
    }

    pub fn into_message(self) -> Message {
        Message {
            site: self.site,
            topic: self.topic,
            data: self.data,
        }
    }
}

/// Payload pushed to every connection of a site. `data` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub site: String,
    pub topic: String,
    pub data: serde_json::Value,
}

/// One partition of a fan-out plus the message to deliver to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub connections: Vec<ConnectionId>,
    pub message: Message,
}

/// Outcome tally of a single dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_record_expiry_window() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let record = ConnectionRecord::new("c1", "weather", now, CONNECTION_TTL);

        assert_eq!(record.expires_at, datetime!(2024-05-02 12:00 UTC));
        assert!(!record.is_expired(now + Duration::hours(23)));
        assert!(record.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_publish_event_into_message() {
        let event = PublishEvent::new("weather", "alert", serde_json::json!({"temp": 90}));
        let message = event.into_message();

        assert_eq!(message.site, "weather");
        assert_eq!(message.topic, "alert");
        assert_eq!(message.data["temp"], 90);
    }

    #[test]
    fn test_delivery_job_wire_shape() {
        let job = DeliveryJob {
            connections: vec!["c1".into(), "c2".into()],
            message: Message {
                site: "weather".into(),
                topic: "alert".into(),
                data: serde_json::json!({"temp": 90}),
            },
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["connections"], serde_json::json!(["c1", "c2"]));
        assert_eq!(value["message"]["site"], "weather");
        assert_eq!(value["message"]["data"]["temp"], 90);
    }
}
