use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State, ws::WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use sitecast_core::MessageQueue;
use sitecast_core::codec::decode_publish_event;

use crate::hub;
use crate::lifecycle::{LifecycleEvent, update_subscription};
use crate::response::ApiResponse;
use crate::server::AppState;

pub async fn healthz(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok(json!({
        "status": "ok",
        "connections": state.hub.len(),
    }))
}

/// Accept a publish event and put it on the ingress queue.
///
/// The raw body is enqueued unchanged once it decodes, so double-encoded
/// fields reach the ingress stage as the producer sent them.
pub async fn publish(State(state): State<AppState>, body: String) -> ApiResponse {
    let event = match decode_publish_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Rejected malformed publish event");
            return ApiResponse::bad_request(e.to_string());
        }
    };

    if let Err(e) = state.ingress.send(body).await {
        error!(site = %event.site, error = %e, "Failed to enqueue publish event");
        return ApiResponse::new(503, "Could not enqueue event.");
    }
    ApiResponse::new(202, json!({ "status": "queued", "site": event.site }))
}

pub async fn update_connection_subscription(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    body: String,
) -> ApiResponse {
    update_subscription(state.registry.as_ref(), &connection_id, &body).await
}

/// `GET /ws?site=S`: check the site, then hand the socket to the hub.
///
/// Registration happens in [`hub::serve_socket`] once the upgrade has
/// completed, so a failed upgrade leaves nothing in the registry.
pub async fn ws_connect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let connection_id = Uuid::new_v4().to_string();
    let event = LifecycleEvent::connect(&connection_id, params.get("site").map(String::as_str));
    let site = match event.connect_site() {
        Ok(site) => site.to_string(),
        Err(response) => return response.into_response(),
    };

    ws.on_upgrade(move |socket| hub::serve_socket(socket, connection_id, site, state))
}
