//! Gateway-style response envelope shared by every HTTP and WebSocket reply.
//!
//! Each reply carries a status code, a string body and permissive CORS
//! headers. Non-string bodies are JSON-encoded.

use std::collections::BTreeMap;

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Credentials", "true"),
    ("Access-Control-Allow-Headers", "*"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status_code: u16, body: impl Into<Value>) -> Self {
        let body = match body.into() {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let headers = CORS_HEADERS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok(body: impl Into<Value>) -> Self {
        Self::new(200, body)
    }

    pub fn bad_request(body: impl Into<Value>) -> Self {
        Self::new(400, body)
    }

    pub fn internal_error(body: impl Into<Value>) -> Self {
        Self::new(500, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The envelope itself as a JSON frame, for WebSocket replies.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.body.clone())
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

/// Parse a request body as JSON, falling back to an empty object.
pub fn parse_body(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode request body");
            Value::Object(Default::default())
        }
    }
}
