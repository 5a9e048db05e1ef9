//! Queue body encoding.
//!
//! Producers sometimes put JSON-encoded strings inside the JSON body
//! (`{"site": "\"weather\"", "data": "{\"temp\": 90}"}`). Every top-level field
//! is therefore accepted either as a plain value or as a JSON string that
//! decodes to one. A string that is not valid JSON is taken literally.

use serde_json::{Map, Value};

use crate::error::FanoutError;
use crate::types::{DeliveryJob, Message, PublishEvent};

/// Decode a raw ingress queue body into a publish event.
pub fn decode_publish_event(body: &str) -> Result<PublishEvent, FanoutError> {
    let mut fields = decode_object(body)?;

    let site = string_field(&mut fields, "site")?;
    let topic = string_field(&mut fields, "topic")?;
    let data = fields
        .remove("data")
        .map(unwrap_encoded)
        .ok_or_else(|| missing("data"))?;

    Ok(PublishEvent { site, topic, data })
}

/// Decode a raw egress queue body into a delivery job.
pub fn decode_delivery_job(body: &str) -> Result<DeliveryJob, FanoutError> {
    let mut fields = decode_object(body)?;

    let connections = match fields.remove("connections").map(unwrap_encoded) {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Ok(id),
                other => Err(FanoutError::Malformed(format!(
                    "connection id must be a string, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(FanoutError::Malformed(format!(
                "`connections` must be an array, got {other}"
            )));
        }
        None => return Err(missing("connections")),
    };

    let mut message = match fields.remove("message").map(unwrap_encoded) {
        Some(Value::Object(message)) => message,
        Some(other) => {
            return Err(FanoutError::Malformed(format!(
                "`message` must be an object, got {other}"
            )));
        }
        None => return Err(missing("message")),
    };

    let message = Message {
        site: string_field(&mut message, "site")?,
        topic: string_field(&mut message, "topic")?,
        data: message.remove("data").ok_or_else(|| missing("data"))?,
    };

    Ok(DeliveryJob {
        connections,
        message,
    })
}

pub fn encode_delivery_job(job: &DeliveryJob) -> Result<String, FanoutError> {
    serde_json::to_string(job).map_err(|e| FanoutError::Internal(e.to_string()))
}

pub fn encode_publish_event(event: &PublishEvent) -> Result<String, FanoutError> {
    serde_json::to_string(event).map_err(|e| FanoutError::Internal(e.to_string()))
}

fn decode_object(body: &str) -> Result<Map<String, Value>, FanoutError> {
    match unwrap_encoded(serde_json::from_str(body)?) {
        Value::Object(map) => Ok(map),
        other => Err(FanoutError::Malformed(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn unwrap_encoded(value: Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn string_field(fields: &mut Map<String, Value>, name: &str) -> Result<String, FanoutError> {
    match fields.remove(name) {
        // "\"weather\"" decodes to "weather"; "42" stays "42"
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(inner)) => Ok(inner),
            _ => Ok(raw),
        },
        Some(Value::Null) | None => Err(missing(name)),
        Some(other) => Err(FanoutError::Malformed(format!(
            "`{name}` must be a string, got {other}"
        ))),
    }
}

fn missing(name: &str) -> FanoutError {
    FanoutError::Malformed(format!("missing field `{name}`"))
}
