//! Tests for the http handshake and the built-in transports against an axum server
mod fixture;
mod utils;

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
};
use fixture::{Event, Recorder};
use serde_json::json;
use socketioxide_client::{
    ClientConfig, ConnectionRegistry, Error, TransportError,
    transport::{PollingFactory, TransportFactory},
};
use tokio::{net::TcpListener, sync::mpsc};

struct TestServer {
    handshake: &'static str,
    outbox: Mutex<VecDeque<String>>,
    failing_posts: AtomicUsize,
    received: mpsc::UnboundedSender<String>,
    tokens: mpsc::UnboundedSender<Option<String>>,
}

type Shared = State<Arc<TestServer>>;

async fn handshake(State(server): Shared, headers: HeaderMap) -> String {
    let token = headers
        .get("x-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    server.tokens.send(token).unwrap();
    server.handshake.to_string()
}

async fn poll(State(server): Shared) -> String {
    let frame = server.outbox.lock().unwrap().pop_front();
    match frame {
        Some(frame) => frame,
        None => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            String::new()
        }
    }
}

async fn post(State(server): Shared, body: String) -> Result<&'static str, StatusCode> {
    let failing = server
        .failing_posts
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    if failing.is_ok() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    server.received.send(body).unwrap();
    Ok("1")
}

async fn ws(State(server): Shared, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, server))
}

async fn ws_session(mut socket: WebSocket, server: Arc<TestServer>) {
    let frames: Vec<String> = server.outbox.lock().unwrap().drain(..).collect();
    for frame in frames {
        socket.send(Message::Text(frame.into())).await.unwrap();
    }
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => server.received.send(text.as_str().to_string()).unwrap(),
            Message::Close(_) => break,
            _ => (),
        }
    }
    server.received.send("<closed>".to_string()).unwrap();
}

struct Harness {
    addr: SocketAddr,
    server: Arc<TestServer>,
    received: mpsc::UnboundedReceiver<String>,
    tokens: mpsc::UnboundedReceiver<Option<String>>,
}

impl Harness {
    fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn push(&self, frame: &str) {
        self.server.outbox.lock().unwrap().push_back(frame.to_string());
    }

    async fn received(&mut self) -> String {
        fixture::timeout(self.received.recv()).await.unwrap()
    }
}

async fn spawn_server(handshake_body: &'static str, outbox: &[&str]) -> Harness {
    let (received_tx, received) = mpsc::unbounded_channel();
    let (tokens_tx, tokens) = mpsc::unbounded_channel();
    let server = Arc::new(TestServer {
        handshake: handshake_body,
        outbox: Mutex::new(outbox.iter().map(|f| f.to_string()).collect()),
        failing_posts: AtomicUsize::new(0),
        received: received_tx,
        tokens: tokens_tx,
    });
    let router = Router::new()
        .route("/socket.io/1/", get(handshake))
        .route("/socket.io/1/xhr-polling/{sid}", get(poll).post(post))
        .route("/socket.io/1/websocket/{sid}", get(ws))
        .with_state(server.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Harness {
        addr,
        server,
        received,
        tokens,
    }
}

#[tokio::test]
pub async fn polling_transport() {
    let mut harness = spawn_server("abc123:60:60:websocket,xhr-polling", &["1::"]).await;
    let config = ClientConfig::builder()
        .transports([Arc::new(PollingFactory) as Arc<dyn TransportFactory>])
        .build();
    let registry = ConnectionRegistry::new(config);
    let (recorder, mut rx) = Recorder::new();
    let headers = fixture::headers(&[("x-token", "secret")]);
    let socket = assert_ok!(registry.connect_with_headers(&harness.origin(), recorder, headers));

    assert_event!(rx, Event::Connect);
    assert_eq!(
        fixture::timeout(harness.tokens.recv()).await,
        Some(Some("secret".to_string()))
    );
    let conn = assert_some!(socket.connection());
    assert_eq!(conn.transport_name(), Some("xhr-polling"));

    harness.push("\u{fffd}5\u{fffd}3:::a\u{fffd}5\u{fffd}3:::b");
    assert_event!(rx, Event::Message(text, None) if text == "a");
    assert_event!(rx, Event::Message(text, None) if text == "b");

    assert_ok!(socket.emit("hi", vec![json!(1)]));
    assert_eq!(harness.received().await, r#"5:::{"name":"hi","args":[1]}"#);
}

#[tokio::test]
pub async fn failed_post_is_retried() {
    let mut harness = spawn_server("abc123:60:60:xhr-polling", &["1::"]).await;
    let config = ClientConfig::builder()
        .transports([Arc::new(PollingFactory) as Arc<dyn TransportFactory>])
        .reconnect_delay(Duration::from_millis(50))
        .build();
    let registry = ConnectionRegistry::new(config);
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(&harness.origin(), recorder));
    assert_event!(rx, Event::Connect);

    harness.server.failing_posts.store(1, Ordering::SeqCst);
    assert_ok!(socket.send("kept", None));
    // sent again with the keepalive of the reconnection
    assert_eq!(
        harness.received().await,
        "\u{fffd}8\u{fffd}3:::kept\u{fffd}3\u{fffd}2::"
    );
    assert!(assert_some!(socket.connection()).is_connected());
}

#[tokio::test]
pub async fn websocket_transport() {
    let mut harness = spawn_server("abc123:60:60:websocket,xhr-polling", &["1::", "3:::hello"]).await;
    let registry = ConnectionRegistry::new(ClientConfig::default());
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(&harness.origin(), recorder));

    assert_event!(rx, Event::Connect);
    assert_event!(rx, Event::Message(text, None) if text == "hello");
    assert_eq!(
        assert_some!(socket.connection()).transport_name(),
        Some("websocket")
    );

    assert_ok!(socket.emit("hi", vec![]));
    assert_eq!(harness.received().await, r#"5:::{"name":"hi","args":[]}"#);

    socket.disconnect();
    assert_event!(rx, Event::Disconnect);
    assert_eq!(harness.received().await, "0::");
    assert_eq!(harness.received().await, "<closed>");
}

#[tokio::test]
pub async fn http_handshake_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route(
        "/socket.io/1/",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let registry = ConnectionRegistry::new(ClientConfig::default());
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(&format!("http://{addr}"), recorder));
    assert_event!(
        rx,
        Event::Error(Error::HandshakeIo(err)) if matches!(**err, TransportError::Status(StatusCode::SERVICE_UNAVAILABLE))
    );
}
