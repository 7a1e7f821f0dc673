use std::{fmt, sync::Arc, time::Duration};

use socketioxide_client_core::ProtocolVersion;

use crate::{
    handshake::{Handshaker, HttpHandshaker},
    transport::{PollingFactory, TransportFactory, WebsocketFactory},
};

/// Configuration shared by every connection of a [`ConnectionRegistry`](crate::ConnectionRegistry).
#[derive(Clone)]
pub struct ClientConfig {
    /// The protocol version to handshake with. It selects the handshake url and the frame codec.
    /// Defaults to [`ProtocolVersion::V1`].
    pub protocol: ProtocolVersion,

    /// The base path of the handshake and transport requests.
    /// Defaults to "/socket.io/1/".
    pub req_path: String,

    /// The timeout of the handshake request.
    /// Defaults to 10 seconds.
    pub connect_timeout: Duration,

    /// The delay before each reconnect attempt.
    /// Defaults to 1 second.
    pub reconnect_delay: Duration,

    /// The transports, in preference order.
    /// Defaults to websocket then polling.
    pub transports: Vec<Arc<dyn TransportFactory>>,

    /// The collaborator performing the handshake request.
    /// Defaults to an http `GET` with [`HttpHandshaker`].
    pub handshaker: Arc<dyn Handshaker>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolVersion::V1,
            req_path: "/socket.io/1/".to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            transports: vec![Arc::new(WebsocketFactory), Arc::new(PollingFactory)],
            handshaker: Arc::new(HttpHandshaker::default()),
        }
    }
}

impl ClientConfig {
    /// Create a new [`ClientConfigBuilder`]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The handshake url for the given origin.
    pub fn handshake_url(&self, origin: &str) -> String {
        match self.protocol {
            ProtocolVersion::V1 => format!("{origin}{}", self.req_path),
            ProtocolVersion::V2 => format!("{origin}{}?EIO=2&transport=polling", self.req_path),
        }
    }

    /// Pick the first configured transport advertised by the server.
    pub fn select_transport(&self, advertised: &[String]) -> Option<&Arc<dyn TransportFactory>> {
        self.transports.iter().find(|factory| {
            let name = factory.name(self.protocol);
            advertised.iter().any(|t| t == name)
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transports: Vec<_> = self
            .transports
            .iter()
            .map(|t| t.name(self.protocol))
            .collect();
        f.debug_struct("ClientConfig")
            .field("protocol", &self.protocol)
            .field("req_path", &self.req_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("transports", &transports)
            .finish()
    }
}

/// A builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a builder with the default config.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// The protocol version to handshake with.
    /// Defaults to [`ProtocolVersion::V1`].
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// The base path of the handshake and transport requests.
    /// Defaults to "/socket.io/1/".
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.req_path = req_path.into();
        self
    }

    /// The timeout of the handshake request.
    /// Defaults to 10 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// The delay before each reconnect attempt.
    /// Defaults to 1 second.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Replace the transports, in preference order.
    pub fn transports(
        mut self,
        transports: impl IntoIterator<Item = Arc<dyn TransportFactory>>,
    ) -> Self {
        self.config.transports = transports.into_iter().collect();
        self
    }

    /// Replace the handshake collaborator.
    pub fn handshaker(mut self, handshaker: impl Handshaker) -> Self {
        self.config.handshaker = Arc::new(handshaker);
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
