//! The [`ConnectionRegistry`] shares connections between the sockets of the same origin.
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use http::{HeaderMap, Uri};
use socketioxide_client_core::{Str, frame::normalize_ns};

use crate::{
    callback::SocketCallback,
    config::ClientConfig,
    connection::Connection,
    errors::{RegisterError, UrlError},
    ns::NsSocket,
};

pub(crate) struct RegistryInner {
    config: Arc<ClientConfig>,
    connections: Mutex<HashMap<String, Vec<Arc<Connection>>>>,
}

impl RegistryInner {
    /// Forget a torn down connection.
    pub fn remove(&self, conn: &Connection) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(list) = connections.get_mut(conn.origin()) {
            list.retain(|c| !std::ptr::eq(Arc::as_ptr(c), conn));
            if list.is_empty() {
                connections.remove(conn.origin());
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(origin = conn.origin(), "connection removed from registry");
    }
}

/// Maps server origins to their live [`Connection`]s.
///
/// Sockets registered for the same origin share a connection as long as their namespaces differ.
/// A socket whose namespace is already taken on every live connection gets a new connection.
///
/// It is cheaply cloneable, clones share the same connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create a registry whose connections use the given config.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config: Arc::new(config),
                connections: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The config of the connections created by this registry.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Attach a socket to a connection of `origin`, creating the connection if needed.
    ///
    /// A new connection starts its handshake right away, this must be called from a tokio runtime.
    pub fn register(
        &self,
        origin: &str,
        socket: &Arc<NsSocket>,
    ) -> Result<Arc<Connection>, RegisterError> {
        if !socket.is_fresh() {
            return Err(RegisterError::AlreadyRegistered(socket.ns().clone()));
        }
        let origin = origin.trim_end_matches('/');
        let mut connections = self.inner.connections.lock().unwrap();
        let list = connections.entry(origin.to_string()).or_default();
        if let Some(conn) = list.iter().find(|conn| conn.register(socket)) {
            return Ok(conn.clone());
        }
        if !socket.is_fresh() {
            return Err(RegisterError::AlreadyRegistered(socket.ns().clone()));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(origin, ns = ?socket.ns(), "creating connection");
        let conn = Connection::new(
            origin.to_string(),
            self.inner.config.clone(),
            socket.headers().clone(),
            Arc::downgrade(&self.inner),
        );
        if !conn.register(socket) {
            return Err(RegisterError::AlreadyRegistered(socket.ns().clone()));
        }
        list.push(conn.clone());
        conn.start();
        Ok(conn)
    }

    /// Create a socket for the namespace of `url` and register it.
    ///
    /// ```no_run
    /// # use socketioxide_client::{ConnectionRegistry, ClientConfig, SocketCallback};
    /// struct Handler;
    /// impl SocketCallback for Handler {}
    ///
    /// # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
    /// let registry = ConnectionRegistry::new(ClientConfig::default());
    /// let socket = registry.connect("http://localhost:3000/chat", Handler)?;
    /// socket.emit("hello", vec![serde_json::json!("world")])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(
        &self,
        url: &str,
        callback: impl SocketCallback,
    ) -> Result<Arc<NsSocket>, RegisterError> {
        self.connect_with_headers(url, callback, HeaderMap::new())
    }

    /// Same as [`ConnectionRegistry::connect`] with custom headers.
    pub fn connect_with_headers(
        &self,
        url: &str,
        callback: impl SocketCallback,
        headers: HeaderMap,
    ) -> Result<Arc<NsSocket>, RegisterError> {
        let url = SocketUrl::parse(url)?;
        let socket = NsSocket::with_headers(&url.namespace, callback, headers);
        self.register(&url.origin, &socket)?;
        Ok(socket)
    }

    /// The live connections of `origin`.
    pub fn connections(&self, origin: &str) -> Vec<Arc<Connection>> {
        let connections = self.inner.connections.lock().unwrap();
        connections
            .get(origin.trim_end_matches('/'))
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connections = self.inner.connections.lock().unwrap();
        f.debug_struct("ConnectionRegistry")
            .field("config", &self.inner.config)
            .field("connections", &*connections)
            .finish()
    }
}

/// A socket url split into the server origin and the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUrl {
    /// `scheme://host[:port]`
    pub origin: String,
    /// The url path, `/` for the default namespace
    pub namespace: Str,
}

impl SocketUrl {
    /// Parse an `http` or `https` url. The query and fragment are ignored.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let uri: Uri = url.parse()?;
        let scheme = match uri.scheme_str() {
            Some(scheme @ ("http" | "https")) => scheme,
            other => return Err(UrlError::Scheme(other.map(str::to_string))),
        };
        let authority = uri.authority().ok_or(UrlError::MissingHost)?;
        if authority.host().is_empty() {
            return Err(UrlError::MissingHost);
        }
        Ok(Self {
            origin: format!("{scheme}://{authority}"),
            namespace: normalize_ns(uri.path().trim_end_matches('/')),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_urls() {
        let url = SocketUrl::parse("http://localhost:3000/chat").unwrap();
        assert_eq!(url.origin, "http://localhost:3000");
        assert_eq!(url.namespace, "/chat");

        let url = SocketUrl::parse("https://example.com").unwrap();
        assert_eq!(url.origin, "https://example.com");
        assert_eq!(url.namespace, "/");

        let url = SocketUrl::parse("http://example.com/?foo=bar").unwrap();
        assert_eq!(url.namespace, "/");

        let url = SocketUrl::parse("http://example.com/a/b/").unwrap();
        assert_eq!(url.namespace, "/a/b");
    }

    #[test]
    fn reject_urls() {
        assert!(matches!(
            SocketUrl::parse("ws://localhost:3000"),
            Err(UrlError::Scheme(Some(s))) if s == "ws"
        ));
        assert!(matches!(
            SocketUrl::parse("/chat"),
            Err(UrlError::Scheme(None))
        ));
        assert!(matches!(
            SocketUrl::parse("not a url"),
            Err(UrlError::Invalid(_))
        ));
    }
}
