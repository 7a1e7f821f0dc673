//! Tests for invalid frames and payloads sent by the server
mod fixture;
mod utils;

use fixture::{Event, ORIGIN, Op, Recorder};
use socketioxide_client::{ConnectionState, Error, ProtocolError};
use socketioxide_client_core::errors::{DecodeError, PayloadError};

#[tokio::test]
pub async fn garbage_is_fatal() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    let socket = assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);
    let conn = assert_some!(socket.connection());

    server.receive("this is not a frame");
    assert_event!(
        rx,
        Event::Error(Error::Protocol(err)) if matches!(**err, ProtocolError::Decode(DecodeError::Garbage(_)))
    );
    assert_eq!(server.op().await, Op::Disconnect);
    assert_eq!(conn.state(), ConnectionState::Invalid);
    assert!(!socket.is_registered());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
pub async fn invalid_frames_are_dropped() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    server.receive(r#"5:::{"name":"#);
    server.receive("9::");
    server.receive("4:::not json");
    server.receive("3:::ok");
    assert_event!(rx, Event::Message(text, None) if text == "ok");
}

#[tokio::test]
pub async fn payloads_are_split() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    server.receive_payload("\u{fffd}7\u{fffd}3:::one\u{fffd}8\u{fffd}3:::tw:o\u{fffd}7\u{fffd}3:::é😀");
    assert_event!(rx, Event::Message(text, None) if text == "one");
    assert_event!(rx, Event::Message(text, None) if text == "tw:o");
    assert_event!(rx, Event::Message(text, None) if text == "é😀");

    // a body without delimiter is a single frame
    server.receive_payload("3:::single");
    assert_event!(rx, Event::Message(text, None) if text == "single");
}

#[tokio::test]
pub async fn invalid_payload_is_fatal() {
    let (registry, mut server) = fixture::v1_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    server.receive_payload("\u{fffd}9\u{fffd}3:::one");
    assert_event!(
        rx,
        Event::Error(Error::Protocol(err)) if matches!(**err, ProtocolError::Payload(PayloadError::LengthMismatch { .. }))
    );
    assert!(registry.connections(ORIGIN).is_empty());
}

#[tokio::test]
pub async fn v2_payloads() {
    let (registry, mut server) = fixture::v2_client();
    let (recorder, mut rx) = Recorder::new();
    assert_ok!(registry.connect(ORIGIN, recorder));
    assert_eq!(server.op().await, Op::Connect);
    assert_event!(rx, Event::Connect);

    server.receive_payload(r#"7:42["a"]1:618:42["message","hi"]"#);
    assert_event!(rx, Event::Event(name, args, None) if name == "a" && args.is_empty());
    assert_event!(rx, Event::Message(text, None) if text == "hi");

    // binary attachments are not supported but not fatal
    server.receive(r#"451-["bin",{"_placeholder":true,"num":0}]"#);
    server.receive(r#"42["after"]"#);
    assert_event!(rx, Event::Event(name, _, None) if name == "after");
}
