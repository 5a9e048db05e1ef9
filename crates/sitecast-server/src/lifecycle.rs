//! Connection lifecycle and subscription updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, warn};

use sitecast_core::ConnectionRegistry;

use crate::response::{ApiResponse, parse_body};

/// Lifecycle notification for one client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub event_type: String,
    pub connection_id: String,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Connect,
    Disconnect,
    Unrecognized,
}

impl LifecycleEvent {
    pub fn connect(connection_id: impl Into<String>, site: Option<&str>) -> Self {
        Self {
            event_type: "CONNECT".into(),
            connection_id: connection_id.into(),
            query_string_parameters: site
                .map(|s| HashMap::from([("site".to_string(), s.to_string())])),
        }
    }

    pub fn disconnect(connection_id: impl Into<String>) -> Self {
        Self {
            event_type: "DISCONNECT".into(),
            connection_id: connection_id.into(),
            query_string_parameters: None,
        }
    }

    pub fn kind(&self) -> LifecycleKind {
        match self.event_type.as_str() {
            "CONNECT" => LifecycleKind::Connect,
            "DISCONNECT" | "CLOSE" => LifecycleKind::Disconnect,
            _ => LifecycleKind::Unrecognized,
        }
    }

    fn site(&self) -> Option<&str> {
        self.query_string_parameters
            .as_ref()?
            .get("site")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The site a CONNECT subscribes to, or the 400 reply when it names none.
    pub fn connect_site(&self) -> Result<&str, ApiResponse> {
        self.site().ok_or_else(|| {
            warn!(connection_id = %self.connection_id, "Connect without site");
            ApiResponse::bad_request("No site specified")
        })
    }
}

/// Register or deregister a connection.
///
/// CONNECT needs a `site` query parameter. DISCONNECT and CLOSE always
/// succeed, even for unknown connections.
pub async fn handle_lifecycle(registry: &dyn ConnectionRegistry, event: &LifecycleEvent) -> ApiResponse {
    match event.kind() {
        LifecycleKind::Connect => {
            let site = match event.connect_site() {
                Ok(site) => site,
                Err(response) => return response,
            };
            if let Err(e) = registry.register(&event.connection_id, site).await {
                error!(connection_id = %event.connection_id, error = %e, "Failed to register connection");
                return ApiResponse::internal_error("Connect failed.");
            }
            info!(connection_id = %event.connection_id, site, "Client connected");
            ApiResponse::ok("Connect successful.")
        }
        LifecycleKind::Disconnect => {
            if let Err(e) = registry.remove(&event.connection_id).await {
                error!(connection_id = %event.connection_id, error = %e, "Failed to remove connection");
                return ApiResponse::internal_error("Disconnect failed.");
            }
            info!(connection_id = %event.connection_id, "Client disconnected");
            ApiResponse::ok("Disconnect successful.")
        }
        LifecycleKind::Unrecognized => {
            error!(event_type = %event.event_type, "Connection manager received unrecognized eventType");
            ApiResponse::internal_error("Unrecognized eventType.")
        }
    }
}

/// Move a connection to the site named in `body` (`{"site": "..."}`).
///
/// Only connections the registry already knows can move; anything else is a 404.
pub async fn update_subscription(
    registry: &dyn ConnectionRegistry,
    connection_id: &str,
    body: &str,
) -> ApiResponse {
    let parsed = parse_body(body);
    let Some(site) = parsed
        .get("site")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    else {
        return ApiResponse::bad_request("Missing the subscribers new site");
    };

    match registry.get(connection_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(connection_id, site, "Subscription update for unknown connection");
            return ApiResponse::new(404, "Unknown connection.");
        }
        Err(e) => {
            error!(connection_id, error = %e, "Failed to look up connection");
            return ApiResponse::internal_error("Subscription update failed.");
        }
    }

    match registry.register(connection_id, site).await {
        Ok(()) => {
            info!(connection_id, site, "Subscription updated");
            ApiResponse::ok(format!("Successfully subscribed to {site}."))
        }
        Err(e) => {
            error!(connection_id, error = %e, "Failed to update subscription");
            ApiResponse::internal_error("Subscription update failed.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecast_db_memory::InMemoryRegistry;

    #[tokio::test]
    async fn test_connect_registers_under_site() {
        let registry = InMemoryRegistry::new();
        let r = handle_lifecycle(&registry, &LifecycleEvent::connect("c1", Some("weather"))).await;
        assert_eq!(r.status_code, 200);
        assert_eq!(r.body, "Connect successful.");
        assert_eq!(registry.list_connections("weather").await.unwrap(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_connect_without_site_is_rejected() {
        let registry = InMemoryRegistry::new();
        let r = handle_lifecycle(&registry, &LifecycleEvent::connect("c1", None)).await;
        assert_eq!(r.status_code, 400);
        assert_eq!(r.body, "No site specified");
        assert!(registry.is_empty());

        let r = handle_lifecycle(&registry, &LifecycleEvent::connect("c1", Some(""))).await;
        assert_eq!(r.status_code, 400);
    }

    #[tokio::test]
    async fn test_disconnect_and_close_remove() {
        let registry = InMemoryRegistry::new();
        registry.register("c1", "weather").await.unwrap();
        registry.register("c2", "weather").await.unwrap();

        let r = handle_lifecycle(&registry, &LifecycleEvent::disconnect("c1")).await;
        assert_eq!(r.body, "Disconnect successful.");

        let close: LifecycleEvent = serde_json::from_str(
            r#"{"eventType":"CLOSE","connectionId":"c2"}"#,
        )
        .unwrap();
        assert_eq!(handle_lifecycle(&registry, &close).await.status_code, 200);
        assert!(registry.list_connections("weather").await.unwrap().is_empty());

        // unknown connection is still a success
        let r = handle_lifecycle(&registry, &LifecycleEvent::disconnect("ghost")).await;
        assert_eq!(r.status_code, 200);
    }

    #[tokio::test]
    async fn test_unrecognized_event_type() {
        let registry = InMemoryRegistry::new();
        let event: LifecycleEvent = serde_json::from_str(
            r#"{"eventType":"MESSAGE","connectionId":"c1","queryStringParameters":{"site":"a"}}"#,
        )
        .unwrap();
        let r = handle_lifecycle(&registry, &event).await;
        assert_eq!(r.status_code, 500);
        assert_eq!(r.body, "Unrecognized eventType.");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_update_subscription_moves_connection() {
        let registry = InMemoryRegistry::new();
        registry.register("c1", "weather").await.unwrap();

        let r = update_subscription(&registry, "c1", r#"{"site":"news"}"#).await;
        assert_eq!(r.status_code, 200);
        assert_eq!(r.body, "Successfully subscribed to news.");
        assert!(registry.list_connections("weather").await.unwrap().is_empty());
        assert_eq!(registry.list_connections("news").await.unwrap(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_update_subscription_for_unknown_connection_is_not_found() {
        let registry = InMemoryRegistry::new();
        registry.register("c1", "weather").await.unwrap();

        let r = update_subscription(&registry, "ghost", r#"{"site":"weather"}"#).await;
        assert_eq!(r.status_code, 404);
        assert!(registry.get("ghost").await.unwrap().is_none());
        assert_eq!(registry.list_connections("weather").await.unwrap(), vec!["c1"]);
    }

    #[test]
    fn test_connect_site() {
        assert_eq!(LifecycleEvent::connect("c1", Some("news")).connect_site().unwrap(), "news");
        let err = LifecycleEvent::connect("c1", None).connect_site().unwrap_err();
        assert_eq!(err.status_code, 400);
        assert_eq!(err.body, "No site specified");
    }

    #[tokio::test]
    async fn test_update_subscription_requires_site() {
        let registry = InMemoryRegistry::new();
        for body in ["{}", "garbage", r#"{"site":""}"#, r#"{"site":7}"#] {
            let r = update_subscription(&registry, "c1", body).await;
            assert_eq!(r.status_code, 400, "body {body}");
            assert_eq!(r.body, "Missing the subscribers new site");
        }
        assert!(registry.is_empty());
    }
}
