use std::{sync::Arc, time::Duration};

use socketioxide_client_core::{
    Str,
    errors::{DecodeError, EncodeError, HandshakeError, PayloadError},
};
use tokio::time::error::Elapsed;

/// Error returned by application callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// The error delivered to [`SocketCallback::on_error`](crate::SocketCallback::on_error).
///
/// Every failure is normalized into this type before reaching application code.
/// It is cheap to clone so it can be broadcast to every socket of a connection.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The handshake response could not be understood
    #[error("invalid handshake response: {0}")]
    Handshake(#[source] Arc<HandshakeError>),

    /// The handshake request failed
    #[error("handshake request failed: {0}")]
    HandshakeIo(#[source] Arc<TransportError>),

    /// None of the configured transports is advertised by the server
    #[error("no supported transport in {0:?}")]
    NoTransport(Vec<String>),

    /// The transport failed
    #[error("transport error: {0}")]
    Transport(#[source] Arc<TransportError>),

    /// No frame was received from the server within the heartbeat window
    #[error("no heartbeat from server within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The connection could not be restored within the closing timeout
    #[error("could not reconnect within {timeout:?}, last error: {last:?}")]
    ReconnectTimeout {
        /// The closing timeout
        timeout: Duration,
        /// The last transport error observed
        last: Option<Arc<TransportError>>,
    },

    /// The server sent something that is not a valid frame or payload
    #[error("garbage from server: {0}")]
    Protocol(#[source] Arc<ProtocolError>),

    /// The server pushed an error frame
    #[error("server error: {0}")]
    Server(Str),

    /// An application callback failed
    #[error("{callback} callback failed while handling a {frame} frame: {source}")]
    Callback {
        /// The failing callback
        callback: &'static str,
        /// The kind of frame being handled
        frame: &'static str,
        /// The error returned by the callback
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn callback(callback: &'static str, frame: &'static str, err: CallbackError) -> Self {
        Error::Callback {
            callback,
            frame,
            source: Arc::from(err),
        }
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(Arc::new(err))
    }
}
impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(Arc::new(err))
    }
}
impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Protocol(Arc::new(ProtocolError::Decode(err)))
    }
}
impl From<PayloadError> for Error {
    fn from(err: PayloadError) -> Self {
        Error::Protocol(Arc::new(ProtocolError::Payload(err)))
    }
}

/// Fatal protocol violations.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// A frame could not be decoded
    #[error("{0}")]
    Decode(#[from] DecodeError),
    /// A multi-frame payload could not be split
    #[error("{0}")]
    Payload(#[from] PayloadError),
}

/// Error type for the send operations.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// The socket is not registered on a connection
    #[error("socket is not registered")]
    SocketClosed,
    /// The connection has been torn down
    #[error("connection is closed")]
    ConnectionClosed,
    /// The frame could not be encoded
    #[error("error encoding frame: {0}")]
    Encode(#[from] EncodeError),
    /// The data could not be serialized to json
    #[error("error serializing data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error type for the socket registration.
#[derive(thiserror::Error, Debug)]
pub enum RegisterError {
    /// A socket can only be registered once
    #[error("socket {0} has already been registered")]
    AlreadyRegistered(Str),
    /// The url could not be parsed
    #[error("invalid url: {0}")]
    Url(#[from] UrlError),
}

/// Error type for the url parsing.
#[derive(thiserror::Error, Debug)]
pub enum UrlError {
    /// The url is not a valid uri
    #[error("{0}")]
    Invalid(#[from] http::uri::InvalidUri),
    /// The url has no scheme or an unsupported one
    #[error("unsupported scheme {0:?}, expected http or https")]
    Scheme(Option<String>),
    /// The url has no host
    #[error("missing host")]
    MissingHost,
}

/// Error type for the transports and the handshake request.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The transport is not connected
    #[error("transport is not connected")]
    NotConnected,
    /// The transport cannot send several frames at once
    #[error("bulk send is not supported")]
    BulkUnsupported,
    /// The connection was closed by the server
    #[error("connection closed by the server")]
    Closed,
    /// The request timed out
    #[error("request timed out")]
    Timeout,
    /// The server answered with an unexpected status
    #[error("unexpected http status {0}")]
    Status(http::StatusCode),
    /// The server sent non utf8 data
    #[error("invalid utf8 data: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// The request could not be built
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
    /// The http client failed
    #[error("http client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),
    /// The response body could not be read
    #[error("http body error: {0}")]
    Body(#[from] hyper::Error),
    /// The websocket failed
    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl From<Elapsed> for TransportError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}
