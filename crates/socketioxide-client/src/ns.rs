//! Namespace sockets and the per connection namespace registry.
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, OnceLock, RwLock, Weak,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use http::HeaderMap;
use serde_json::Value;
use socketioxide_client_core::{DEFAULT_NS, Str, frame::normalize_ns};

use crate::{
    ack::AckCallback,
    callback::{CallbackResult, SocketCallback},
    connection::Connection,
    errors::{Error, SendError},
};

const FRESH: u8 = 0;
const REGISTERED: u8 = 1;
const DEAD: u8 = 2;

/// A logical client bound to one namespace of a [`Connection`].
///
/// A socket is single use: once unregistered, or once its connection is torn down,
/// it cannot be registered again.
pub struct NsSocket {
    ns: Str,
    callback: Box<dyn SocketCallback>,
    headers: HeaderMap,
    state: AtomicU8,
    connected: AtomicBool,
    connection: OnceLock<Weak<Connection>>,
}

impl NsSocket {
    /// Create a socket for the given namespace, an empty namespace is the default one.
    pub fn new(ns: impl AsRef<str>, callback: impl SocketCallback) -> Arc<Self> {
        Self::with_headers(ns, callback, HeaderMap::new())
    }

    /// Create a socket with custom headers.
    ///
    /// The headers are only used if this socket triggers the handshake of a new connection.
    pub fn with_headers(
        ns: impl AsRef<str>,
        callback: impl SocketCallback,
        headers: HeaderMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            ns: normalize_ns(ns.as_ref()),
            callback: Box::new(callback),
            headers,
            state: AtomicU8::new(FRESH),
            connected: AtomicBool::new(false),
            connection: OnceLock::new(),
        })
    }

    /// The namespace of this socket.
    pub fn ns(&self) -> &Str {
        &self.ns
    }

    /// The custom headers of this socket.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether this socket is bound to the default namespace.
    pub fn is_default_ns(&self) -> bool {
        self.ns == DEFAULT_NS
    }

    /// Whether this socket is currently registered on a connection.
    pub fn is_registered(&self) -> bool {
        self.state.load(Ordering::Acquire) == REGISTERED
    }

    /// Whether the namespace connection was confirmed.
    pub fn is_connected(&self) -> bool {
        self.is_registered() && self.connected.load(Ordering::Acquire)
    }

    /// The connection this socket is registered on.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.get().and_then(Weak::upgrade)
    }

    /// Emit an event to the server.
    pub fn emit(&self, event: impl Into<String>, args: Vec<Value>) -> Result<(), SendError> {
        self.connected_to()?.emit(self, event, args, None)
    }

    /// Emit an event to the server and call `ack` with the server acknowledgement.
    pub fn emit_with_ack(
        &self,
        event: impl Into<String>,
        args: Vec<Value>,
        ack: impl FnOnce(Vec<Value>) + Send + 'static,
    ) -> Result<(), SendError> {
        self.connected_to()?
            .emit(self, event, args, Some(Box::new(ack)))
    }

    /// Send a plain text message to the server.
    pub fn send(&self, text: impl Into<Str>, ack: Option<AckCallback>) -> Result<(), SendError> {
        self.connected_to()?.send(self, text, ack)
    }

    /// Send a structured message to the server.
    pub fn send_json(&self, value: Value, ack: Option<AckCallback>) -> Result<(), SendError> {
        self.connected_to()?.send_json(self, value, ack)
    }

    /// Disconnect this socket from its namespace.
    ///
    /// The connection is torn down if it was the last socket. Calling it twice is a no-op.
    pub fn disconnect(&self) {
        if let Some(conn) = self.connection() {
            conn.unregister(self);
        }
    }

    fn connected_to(&self) -> Result<Arc<Connection>, SendError> {
        if !self.is_registered() {
            return Err(SendError::SocketClosed);
        }
        self.connection().ok_or(SendError::SocketClosed)
    }

    /// Fresh -> Registered
    pub(crate) fn mark_registered(&self) -> bool {
        self.state
            .compare_exchange(FRESH, REGISTERED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Registered -> Dead, returns false if the socket was not registered.
    pub(crate) fn mark_dead(&self) -> bool {
        self.state
            .compare_exchange(REGISTERED, DEAD, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_fresh(&self) -> bool {
        self.state.load(Ordering::Acquire) == FRESH
    }

    pub(crate) fn bind(&self, conn: Weak<Connection>) {
        let _ = self.connection.set(conn);
    }

    /// Call `on_connect` once per registration.
    pub(crate) fn deliver_connect(&self) {
        if !self.connected.swap(true, Ordering::AcqRel) {
            self.call("on_connect", "connect", |cb| cb.on_connect());
        }
    }

    pub(crate) fn deliver_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.call("on_disconnect", "disconnect", |cb| cb.on_disconnect());
    }

    pub(crate) fn deliver_error(&self, err: &Error) {
        self.callback.on_error(err);
    }

    /// Call an application callback and route its error to `on_error`.
    pub(crate) fn call(
        &self,
        callback: &'static str,
        frame: &'static str,
        f: impl FnOnce(&dyn SocketCallback) -> CallbackResult,
    ) {
        if let Err(err) = f(self.callback.as_ref()) {
            let err = Error::callback(callback, frame, err);
            #[cfg(feature = "tracing")]
            tracing::warn!(ns = ?self.ns, "{err}");
            self.callback.on_error(&err);
        }
    }
}

impl fmt::Debug for NsSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NsSocket")
            .field("ns", &self.ns)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .finish()
    }
}

/// The namespace sockets multiplexed over one connection, keyed by namespace.
#[derive(Default)]
pub(crate) struct NamespaceRegistry {
    sockets: RwLock<HashMap<Str, Arc<NsSocket>>>,
    /// Set under the write lock once the last socket left, nothing can join afterwards
    closed: AtomicBool,
}

impl NamespaceRegistry {
    /// Store the socket if its namespace is vacant and the socket was never registered.
    #[cfg(test)]
    pub fn register(&self, socket: &Arc<NsSocket>) -> bool {
        self.register_if(socket, || true)
    }

    /// Same as [`NamespaceRegistry::register`], `alive` is checked under the lock.
    pub fn register_if(&self, socket: &Arc<NsSocket>, alive: impl FnOnce() -> bool) -> bool {
        let mut sockets = self.sockets.write().unwrap();
        if self.closed.load(Ordering::Acquire)
            || !alive()
            || sockets.contains_key(socket.ns())
            || !socket.mark_registered()
        {
            return false;
        }
        sockets.insert(socket.ns().clone(), socket.clone());
        true
    }

    /// Remove the socket of `ns`. The registry is closed if it becomes empty.
    pub fn remove(&self, ns: &str) -> Option<Arc<NsSocket>> {
        let mut sockets = self.sockets.write().unwrap();
        let socket = sockets.remove(ns);
        self.close_if_empty(&sockets);
        socket
    }

    /// Remove this exact socket, a socket of the same namespace stays in place.
    /// The registry is closed if it becomes empty.
    pub fn remove_socket(&self, socket: &NsSocket) -> bool {
        let mut sockets = self.sockets.write().unwrap();
        let removed = match sockets.get(socket.ns()) {
            Some(s) if std::ptr::eq(Arc::as_ptr(s), socket) => sockets.remove(socket.ns()).is_some(),
            _ => false,
        };
        self.close_if_empty(&sockets);
        removed
    }

    fn close_if_empty(&self, sockets: &HashMap<Str, Arc<NsSocket>>) {
        if sockets.is_empty() {
            self.closed.store(true, Ordering::Release);
        }
    }

    /// Refuse every further registration.
    pub fn close(&self) {
        let _sockets = self.sockets.write().unwrap();
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the registry was closed, the connection must be torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn get(&self, ns: &str) -> Option<Arc<NsSocket>> {
        self.sockets.read().unwrap().get(ns).cloned()
    }

    /// Find the socket an inbound frame is addressed to.
    ///
    /// A frame for the default namespace goes to the only registered socket when there is one.
    pub fn dispatch(&self, ns: &str) -> Option<Arc<NsSocket>> {
        let sockets = self.sockets.read().unwrap();
        if let Some(socket) = sockets.get(ns) {
            return Some(socket.clone());
        }
        if ns == DEFAULT_NS && sockets.len() == 1 {
            return sockets.values().next().cloned();
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(ns, "cannot find socket for namespace");
        None
    }

    pub fn all(&self) -> Vec<Arc<NsSocket>> {
        self.sockets.read().unwrap().values().cloned().collect()
    }

    /// Close the registry and take every socket out.
    pub fn drain(&self) -> Vec<Arc<NsSocket>> {
        let mut sockets = self.sockets.write().unwrap();
        self.closed.store(true, Ordering::Release);
        sockets.drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.sockets.read().unwrap().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
