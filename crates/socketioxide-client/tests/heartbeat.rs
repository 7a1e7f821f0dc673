//! Tests for the keepalive frames and the heartbeat watchdog
mod fixture;
mod utils;

use std::time::Duration;

use fixture::{Event, ORIGIN, Op, Recorder, Reply};
use socketioxide_client::{ConnectionState, Error, ProtocolVersion};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
pub async fn heartbeat_is_sent_periodically() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    let start = Instant::now();
    assert_eq!(server.sent().await, "2::");
    assert!(start.elapsed() >= Duration::from_secs(15));
    server.receive("2::");
    assert_eq!(server.sent().await, "2::");
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(server.sent().await, "2::");
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
pub async fn server_heartbeat_is_echoed() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    let start = Instant::now();
    server.receive("2::");
    assert_eq!(server.sent().await, "2::");
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
pub async fn silent_server_is_fatal() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);
    let conn = assert_some!(socket.connection());

    let start = Instant::now();
    assert_event!(rx, Event::Error(Error::HeartbeatTimeout(window)) if *window == Duration::from_secs(40));
    assert!(start.elapsed() >= Duration::from_secs(40));
    assert_eq!(conn.state(), ConnectionState::Invalid);
    assert!(registry.connections(ORIGIN).is_empty());
}

#[tokio::test(start_paused = true)]
pub async fn inbound_frames_reset_the_watchdog() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);
    let conn = assert_some!(socket.connection());

    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(30)).await;
    server.receive("8::");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(conn.state(), ConnectionState::Ready);

    assert_event!(rx, Event::Error(Error::HeartbeatTimeout(_)));
    assert!(start.elapsed() >= Duration::from_secs(70));
}

#[tokio::test(start_paused = true)]
pub async fn v2_ping_and_probes() {
    let (registry, mut server) = fixture::v2_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    server.receive("2");
    assert_eq!(server.sent().await, "3");
    server.receive("2probe");
    assert_eq!(server.sent().await, "3probe");
    server.receive("3probe");
    assert_eq!(server.sent().await, "5");

    let start = Instant::now();
    assert_eq!(server.sent().await, "2");
    assert!(start.elapsed() >= Duration::from_secs(25));
}

#[tokio::test(start_paused = true)]
pub async fn disabled_timeouts() {
    let (registry, mut server, _) =
        fixture::mock_client(ProtocolVersion::V1, Reply::Body("abc123::0:websocket"));
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);
    let conn = assert_some!(socket.connection());
    let session = assert_some!(conn.session());
    assert_eq!(session.heartbeat_timeout, None);
    assert_eq!(session.closing_timeout, None);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(server.is_idle());
    assert!(rx.try_recv().is_err());
}
