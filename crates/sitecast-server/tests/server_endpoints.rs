use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use sitecast_core::{ConnectionRegistry, FanoutConfig};
use sitecast_server::config::AppConfig;
use sitecast_server::{AppState, build_app, spawn_workers};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: std::net::SocketAddr,
    state: AppState,
    shutdown_http: oneshot::Sender<()>,
    shutdown_workers: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl TestServer {
    fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        let _ = self.shutdown_http.send(());
        let _ = self.shutdown_workers.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn start_server(fanout: FanoutConfig) -> TestServer {
    let mut cfg = AppConfig::default();
    cfg.fanout = fanout;
    cfg.fanout.poll_interval_ms = 20;
    let state = AppState::in_memory(cfg);

    let (shutdown_workers, workers_rx) = watch::channel(false);
    let mut handles = spawn_workers(&state, &workers_rx);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (shutdown_http, rx) = oneshot::channel::<()>();

    let app = build_app(state.clone());
    handles.push(tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    }));

    TestServer {
        addr,
        state,
        shutdown_http,
        shutdown_workers,
        handles,
    }
}

/// Open a socket for `site` and return it with its connection id.
async fn connect(server: &TestServer, site: &str) -> (Client, String) {
    let url = format!("ws://{}/ws?site={site}", server.addr);
    let (mut ws, _) = connect_async(url).await.expect("ws connect");
    let hello = next_json(&mut ws).await.expect("greeting");
    assert_eq!(hello["type"], "connected");
    let id = hello["connectionId"].as_str().expect("connection id").to_string();
    (ws, id)
}

async fn next_json(ws: &mut Client) -> Option<Value> {
    next_json_within(ws, Duration::from_secs(5)).await
}

async fn next_json_within(ws: &mut Client, wait: Duration) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(wait, ws.next()).await.ok()??.ok()?;
        if frame.is_text() {
            return serde_json::from_str(frame.to_text().ok()?).ok();
        }
    }
}

async fn publish(client: &reqwest::Client, server: &TestServer, body: String) -> reqwest::Response {
    client
        .post(server.http("/publish"))
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn published_event_reaches_every_subscriber_of_the_site() {
    let server = start_server(FanoutConfig::default().with_chunk_size(1)).await;
    let client = reqwest::Client::new();

    let (mut c1, _) = connect(&server, "weather").await;
    let (mut c2, _) = connect(&server, "weather").await;
    let (mut c3, _) = connect(&server, "news").await;

    let resp = publish(
        &client,
        &server,
        json!({"site": "weather", "topic": "alert", "data": {"temp": 3}}).to_string(),
    )
    .await;
    assert_eq!(resp.status(), 202);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let expected = json!({"site": "weather", "topic": "alert", "data": {"temp": 3}});
    assert_eq!(next_json(&mut c1).await, Some(expected.clone()));
    assert_eq!(next_json(&mut c2).await, Some(expected));
    assert_eq!(next_json_within(&mut c3, Duration::from_millis(300)).await, None);

    server.stop().await;
}

#[tokio::test]
async fn double_encoded_fields_are_unwrapped() {
    let server = start_server(FanoutConfig::default()).await;
    let client = reqwest::Client::new();
    let (mut ws, _) = connect(&server, "weather").await;

    let body = json!({
        "site": "\"weather\"",
        "topic": "\"alert\"",
        "data": "{\"temp\":3}",
    });
    let resp = publish(&client, &server, body.to_string()).await;
    assert_eq!(resp.status(), 202);

    let frame = next_json(&mut ws).await.expect("delivery");
    assert_eq!(frame, json!({"site": "weather", "topic": "alert", "data": {"temp": 3}}));

    server.stop().await;
}

#[tokio::test]
async fn connect_without_site_is_rejected() {
    let server = start_server(FanoutConfig::default()).await;

    let err = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect_err("handshake should fail");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("unexpected error: {other}"),
    }

    server.stop().await;
}

#[tokio::test]
async fn subscribe_frame_moves_the_connection() {
    let server = start_server(FanoutConfig::default()).await;
    let client = reqwest::Client::new();
    let (mut ws, id) = connect(&server, "weather").await;

    ws.send(Message::text(json!({"action": "subscribe", "site": "news"}).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await.expect("reply");
    assert_eq!(reply["statusCode"], 200);
    assert_eq!(reply["body"], "Successfully subscribed to news.");
    assert_eq!(reply["headers"]["Access-Control-Allow-Origin"], "*");

    let registry = &server.state.registry;
    assert!(registry.list_connections("weather").await.unwrap().is_empty());
    assert_eq!(registry.list_connections("news").await.unwrap(), vec![id]);

    ws.send(Message::text(json!({"action": "dance"}).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await.expect("reply");
    assert_eq!(reply["statusCode"], 400);

    let resp = publish(
        &client,
        &server,
        json!({"site": "news", "topic": "headline", "data": "extra"}).to_string(),
    )
    .await;
    assert_eq!(resp.status(), 202);
    let frame = next_json(&mut ws).await.expect("delivery");
    assert_eq!(frame["topic"], "headline");
    assert_eq!(frame["data"], "extra");

    server.stop().await;
}

#[tokio::test]
async fn subscription_endpoint_updates_site() {
    let server = start_server(FanoutConfig::default()).await;
    let client = reqwest::Client::new();
    let (_ws, id) = connect(&server, "weather").await;
    let url = server.http(&format!("/connections/{id}/subscription"));

    let resp = client.post(&url).body("{}").send().await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
    assert_eq!(resp.text().await.unwrap(), "Missing the subscribers new site");

    let resp = client
        .post(&url)
        .body(json!({"site": "sports"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Successfully subscribed to sports.");

    let record = server.state.registry.get(&id).await.unwrap().expect("record");
    assert_eq!(record.site, "sports");

    server.stop().await;
}

#[tokio::test]
async fn health_and_malformed_publish() {
    let server = start_server(FanoutConfig::default()).await;
    let client = reqwest::Client::new();
    let (_ws, _) = connect(&server, "weather").await;

    let resp = client.get(server.http("/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);

    let resp = publish(&client, &server, json!({"topic": "t", "data": 1}).to_string()).await;
    assert_eq!(resp.status(), 400);
    let resp = publish(&client, &server, "not json".into()).await;
    assert_eq!(resp.status(), 400);

    server.stop().await;
}

#[tokio::test]
async fn closing_the_socket_deregisters_the_connection() {
    let server = start_server(FanoutConfig::default()).await;
    let (mut ws, id) = connect(&server, "weather").await;
    assert!(server.state.registry.get(&id).await.unwrap().is_some());

    ws.close(None).await.unwrap();

    let mut removed = false;
    for _ in 0..100 {
        if server.state.registry.get(&id).await.unwrap().is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed, "connection {id} still registered");
    assert!(!server.state.hub.is_connected(&id));

    server.stop().await;
}

#[tokio::test]
async fn subscription_endpoint_rejects_unknown_connection() {
    let server = start_server(FanoutConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.http("/connections/ghost/subscription"))
        .body(json!({"site": "weather"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let registry = &server.state.registry;
    assert!(registry.get("ghost").await.unwrap().is_none());
    assert!(registry.list_connections("weather").await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn client_dropping_after_handshake_leaves_no_record() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = start_server(FanoutConfig::default()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET /ws?site=weather HTTP/1.1\r\n\
         Host: {}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        server.addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before handshake response");
        head.extend_from_slice(&buf[..n]);
    }
    assert!(String::from_utf8_lossy(&head).starts_with("HTTP/1.1 101"));
    drop(stream);

    let mut cleared = false;
    for _ in 0..100 {
        let listed = server.state.registry.list_connections("weather").await.unwrap();
        if listed.is_empty() && server.state.hub.is_empty() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleared, "aborted client is still registered");

    server.stop().await;
}
