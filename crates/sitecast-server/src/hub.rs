//! WebSocket connection hub.
//!
//! Every open socket owns an outbound channel registered here under its
//! connection id. The egress stage pushes through [`ConnectionHub`] as its
//! [`TransportSender`]; ids with no open socket come back as `Gone`.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sitecast_core::{ConnectionId, Message, SendError, TransportSender};

use crate::lifecycle::{LifecycleEvent, handle_lifecycle, update_subscription};
use crate::response::ApiResponse;
use crate::server::AppState;

/// Frames buffered per socket before senders wait.
const OUTBOUND_BUFFER: usize = 64;

#[derive(Default)]
pub struct ConnectionHub {
    sockets: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, connection_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.sockets.write().insert(connection_id.to_string(), tx);
        rx
    }

    pub fn detach(&self, connection_id: &str) {
        self.sockets.write().remove(connection_id);
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.sockets.read().contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }
}

#[async_trait]
impl TransportSender for ConnectionHub {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn send(&self, connection_id: &str, message: &Message) -> Result<(), SendError> {
        let gone = || SendError::Gone {
            connection_id: connection_id.to_string(),
        };

        // clone the sender so the lock is not held across the await
        let Some(tx) = self.sockets.read().get(connection_id).cloned() else {
            return Err(gone());
        };
        let frame =
            serde_json::to_string(message).map_err(|e| SendError::Transport(e.to_string()))?;
        tx.send(frame).await.map_err(|_| gone())
    }
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    action: String,
}

/// Register one accepted socket under `site` and drive it until either side
/// closes it. The registry record is removed when the loop ends.
pub async fn serve_socket(socket: WebSocket, connection_id: String, site: String, state: AppState) {
    let mut outbound = state.hub.attach(&connection_id);
    let (mut sender, mut receiver) = socket.split();

    let connect = LifecycleEvent::connect(&connection_id, Some(&site));
    let registered = handle_lifecycle(state.registry.as_ref(), &connect).await;
    if !registered.is_success() {
        state.hub.detach(&connection_id);
        let _ = sender.send(WsMessage::Text(registered.to_frame().into())).await;
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    }

    let hello = json!({ "type": "connected", "connectionId": connection_id }).to_string();
    if sender.send(WsMessage::Text(hello.into())).await.is_err() {
        debug!(%connection_id, "Socket closed before greeting");
    } else {
        loop {
            tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_client_frame(&state, &connection_id, text.as_str()).await;
                        if sender.send(WsMessage::Text(reply.to_frame().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if sender.send(WsMessage::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "WebSocket receive error");
                        break;
                    }
                },
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }

    state.hub.detach(&connection_id);
    let response = handle_lifecycle(state.registry.as_ref(), &LifecycleEvent::disconnect(&connection_id)).await;
    if !response.is_success() {
        warn!(%connection_id, status = response.status_code, "Disconnect cleanup failed");
    }
    info!(%connection_id, "WebSocket closed");
}

async fn handle_client_frame(state: &AppState, connection_id: &str, text: &str) -> ApiResponse {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) if frame.action == "subscribe" => {
            update_subscription(state.registry.as_ref(), connection_id, text).await
        }
        Ok(frame) => {
            debug!(connection_id, action = %frame.action, "Unknown client action");
            ApiResponse::bad_request("Unrecognized action.")
        }
        Err(_) => ApiResponse::bad_request("Expected a JSON frame with an action."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_to_attached_socket() {
        let hub = ConnectionHub::new();
        let mut rx = hub.attach("c1");
        let message = Message {
            site: "weather".into(),
            topic: "alert".into(),
            data: json!({"temp": 3}),
        };

        hub.send("c1", &message).await.unwrap();
        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame, json!({"site": "weather", "topic": "alert", "data": {"temp": 3}}));
    }

    #[tokio::test]
    async fn test_unknown_or_closed_is_gone() {
        let hub = ConnectionHub::new();
        let message = Message {
            site: "s".into(),
            topic: "t".into(),
            data: serde_json::Value::Null,
        };
        assert!(hub.send("nobody", &message).await.unwrap_err().is_gone());

        let rx = hub.attach("c1");
        drop(rx);
        assert!(hub.send("c1", &message).await.unwrap_err().is_gone());

        hub.detach("c1");
        assert!(hub.is_empty());
    }
}
