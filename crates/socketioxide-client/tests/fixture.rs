#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures_util::future::BoxFuture;
use http::HeaderMap;
use serde_json::Value;
use socketioxide_client::{
    CallbackResult, ClientConfig, ConnectionRegistry, Error, HandshakeRequest, Handshaker,
    ProtocolVersion, RemoteAck, SocketCallback, Str, TransportError,
    transport::{Transport, TransportContext, TransportEvents, TransportFactory},
};
use tokio::sync::mpsc;

pub const ORIGIN: &str = "http://localhost:3000";

/// sid `abc123`, 15s heartbeat timeout, 25s closing timeout
pub const V1_HANDSHAKE: &str = "abc123:15:25:websocket,xhr-polling";
/// sid `abc123`, 25s ping interval, 60s ping timeout
pub const V2_HANDSHAKE: &str =
    r#"97:0{"sid":"abc123","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;

/// What the engine did with a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Send(String),
    Disconnect,
    Invalidate,
}

struct MockShared {
    ops: mpsc::UnboundedSender<Op>,
    events: Mutex<Option<TransportEvents>>,
    auto_connect: AtomicBool,
    fail_sends: AtomicBool,
    created: AtomicUsize,
}

pub struct MockTransportFactory {
    name: &'static str,
    shared: Arc<MockShared>,
}

impl TransportFactory for MockTransportFactory {
    fn name(&self, _version: ProtocolVersion) -> &'static str {
        self.name
    }

    fn create(&self, ctx: &TransportContext) -> Box<dyn Transport> {
        assert_eq!(ctx.sid, "abc123");
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockTransport {
            name: self.name,
            shared: self.shared.clone(),
        })
    }
}

struct MockTransport {
    name: &'static str,
    shared: Arc<MockShared>,
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn connect(&mut self, events: TransportEvents) {
        self.shared.events.lock().unwrap().replace(events.clone());
        self.shared.ops.send(Op::Connect).unwrap();
        if self.shared.auto_connect.load(Ordering::SeqCst) {
            events.connected();
        }
    }

    fn send(&mut self, frame: Str) -> Result<(), TransportError> {
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared.ops.send(Op::Send(frame.to_string())).unwrap();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.shared.ops.send(Op::Disconnect).unwrap();
    }

    fn invalidate(&mut self) {
        self.shared.ops.send(Op::Invalidate).unwrap();
    }
}

/// The server side of the mock transports.
pub struct MockServer {
    ops: mpsc::UnboundedReceiver<Op>,
    shared: Arc<MockShared>,
}

impl MockServer {
    pub fn new(name: &'static str) -> (MockTransportFactory, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(MockShared {
            ops: tx,
            events: Mutex::new(None),
            auto_connect: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        });
        let factory = MockTransportFactory {
            name,
            shared: shared.clone(),
        };
        (factory, Self { ops: rx, shared })
    }

    pub async fn op(&mut self) -> Op {
        timeout(self.ops.recv()).await.expect("transport ops closed")
    }

    /// The next frame sent by the client, other ops are skipped.
    pub async fn sent(&mut self) -> String {
        loop {
            if let Op::Send(frame) = self.op().await {
                return frame;
            }
        }
    }

    /// Whether nothing happened to the transports yet.
    pub fn is_idle(&mut self) -> bool {
        self.ops.try_recv().is_err()
    }

    /// The event sink of the last connected transport.
    pub fn events(&self) -> TransportEvents {
        self.shared
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no transport connected")
    }

    pub fn receive(&self, frame: &'static str) {
        self.events().message(Str::from(frame));
    }

    pub fn receive_payload(&self, payload: impl Into<String>) {
        self.events().payload(Str::from(payload.into()));
    }

    pub fn auto_connect(&self, auto: bool) {
        self.shared.auto_connect.store(auto, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }
}

/// How the handshake request is answered.
#[derive(Clone)]
pub enum Reply {
    Body(&'static str),
    Fail,
    Hang,
}

#[derive(Clone)]
pub struct MockHandshaker {
    reply: Reply,
    requests: Arc<Mutex<Vec<HandshakeRequest>>>,
}

impl MockHandshaker {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<HandshakeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Handshaker for MockHandshaker {
    fn handshake(
        &self,
        req: HandshakeRequest,
    ) -> BoxFuture<'static, Result<String, TransportError>> {
        self.requests.lock().unwrap().push(req);
        let reply = self.reply.clone();
        Box::pin(async move {
            match reply {
                Reply::Body(body) => Ok(body.to_string()),
                Reply::Fail => Err(TransportError::Status(http::StatusCode::FORBIDDEN)),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

/// What a socket callback received.
#[derive(Debug)]
pub enum Event {
    Connect,
    Disconnect,
    Message(String, Option<i64>),
    Json(Value, Option<i64>),
    Event(String, Vec<Value>, Option<i64>),
    Error(Error),
}

/// Records every callback call and answers acknowledgement requests with `reply`.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    reply: Option<Vec<Value>>,
    fail_events: bool,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Self {
            tx,
            reply: None,
            fail_events: false,
        };
        (recorder, rx)
    }

    pub fn reply(mut self, args: Vec<Value>) -> Self {
        self.reply = Some(args);
        self
    }

    pub fn fail_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    fn answer(&self, ack: Option<RemoteAck>) -> Option<i64> {
        let ack = ack?;
        let id = ack.id();
        if let Some(reply) = &self.reply {
            ack.ack(reply.clone()).unwrap();
        }
        Some(id)
    }
}

impl SocketCallback for Recorder {
    fn on_connect(&self) -> CallbackResult {
        self.tx.send(Event::Connect)?;
        Ok(())
    }

    fn on_disconnect(&self) -> CallbackResult {
        self.tx.send(Event::Disconnect)?;
        Ok(())
    }

    fn on_message(&self, text: Str, ack: Option<RemoteAck>) -> CallbackResult {
        let id = self.answer(ack);
        self.tx.send(Event::Message(text.to_string(), id))?;
        Ok(())
    }

    fn on_json_message(&self, value: Value, ack: Option<RemoteAck>) -> CallbackResult {
        let id = self.answer(ack);
        self.tx.send(Event::Json(value, id))?;
        Ok(())
    }

    fn on_event(&self, name: &str, ack: Option<RemoteAck>, args: Vec<Value>) -> CallbackResult {
        if self.fail_events {
            return Err(format!("cannot handle {name}").into());
        }
        let id = self.answer(ack);
        self.tx.send(Event::Event(name.to_string(), args, id))?;
        Ok(())
    }

    fn on_error(&self, err: &Error) {
        let _ = self.tx.send(Event::Error(err.clone()));
    }
}

/// A registry whose connections use a mock transport named `websocket`.
pub fn mock_client(
    protocol: ProtocolVersion,
    handshake: Reply,
) -> (ConnectionRegistry, MockServer, MockHandshaker) {
    let (factory, server) = MockServer::new("websocket");
    let handshaker = MockHandshaker::new(handshake);
    let config = ClientConfig::builder()
        .protocol(protocol)
        .reconnect_delay(Duration::from_millis(100))
        .connect_timeout(Duration::from_secs(5))
        .transports([Arc::new(factory) as Arc<dyn TransportFactory>])
        .handshaker(handshaker.clone())
        .build();
    (ConnectionRegistry::new(config), server, handshaker)
}

pub fn v1_client() -> (ConnectionRegistry, MockServer) {
    let (registry, server, _) = mock_client(ProtocolVersion::V1, Reply::Body(V1_HANDSHAKE));
    (registry, server)
}

pub fn v2_client() -> (ConnectionRegistry, MockServer) {
    let (registry, server, _) = mock_client(ProtocolVersion::V2, Reply::Body(V2_HANDSHAKE));
    (registry, server)
}

pub fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    pairs
        .iter()
        .map(|(k, v)| {
            (
                http::HeaderName::from_static(k),
                http::HeaderValue::from_static(v),
            )
        })
        .collect()
}

/// Wait for the next item of a channel, panics after a while.
pub async fn timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(120), fut)
        .await
        .expect("timed out")
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(rx.recv()).await.expect("callback channel closed")
}
