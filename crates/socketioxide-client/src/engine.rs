//! The task driving a [`Connection`]: handshake, transport lifecycle, timers and
//! inbound frame dispatch.
//!
//! The engine owns the transport, every other party reaches it through the
//! [`Command`] channel of the connection so all the state transitions happen
//! on a single task and in order.
use std::{ops::ControlFlow, sync::Arc, time::Duration};

use socketioxide_client_core::{
    DEFAULT_NS, Frame, FrameData, HandshakeData, Probe, ProtocolVersion, Str,
    payload::decode_payload,
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    ack::RemoteAck,
    connection::{Command, Connection, ConnectionState},
    errors::{Error, TransportError},
    handshake::HandshakeRequest,
    transport::{Transport, TransportContext, TransportEvent, TransportEvents},
};

/// Resets its timer every time a frame is received.
struct Watchdog {
    task: JoinHandle<()>,
    reset: mpsc::Sender<()>,
    window: Duration,
}

pub(crate) struct Engine {
    conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<Command>,
    transport: Option<Box<dyn Transport>>,
    /// Incremented for every new transport, events of older ones are ignored
    generation: u64,
    handshake: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    watchdog: Option<Watchdog>,
    reconnect: Option<JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
    last_transport_error: Option<Arc<TransportError>>,
    keepalive_in_queue: bool,
    first_connect: bool,
}

impl Engine {
    pub fn new(conn: Arc<Connection>, rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            conn,
            rx,
            transport: None,
            generation: 0,
            handshake: None,
            heartbeat: None,
            watchdog: None,
            reconnect: None,
            deadline: None,
            last_transport_error: None,
            keepalive_in_queue: false,
            first_connect: true,
        }
    }

    pub async fn run(mut self) {
        self.start_handshake();
        while let Some(cmd) = self.rx.recv().await {
            if self.handle(cmd).is_break() {
                break;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(origin = self.conn.origin(), "connection task ended");
    }

    fn version(&self) -> ProtocolVersion {
        self.conn.config.protocol
    }

    fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Handshake(Ok(session)) => {
                self.handshake = None;
                #[cfg(feature = "tracing")]
                tracing::debug!(origin = self.conn.origin(), ?session, "handshake done");
                let _ = self.conn.session.set(session);
                self.connect_transport()
            }
            Command::Handshake(Err(err)) => self.fatal(err),
            Command::Transport {
                event: TransportEvent::Unsent(frames),
                ..
            } => {
                // they were sent before anything still buffered
                #[cfg(feature = "tracing")]
                tracing::debug!(count = frames.len(), "requeueing unsent frames");
                self.conn.buffer.restore(frames.into_iter());
                ControlFlow::Continue(())
            }
            Command::Transport { generation, event } => {
                if generation != self.generation || self.transport.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(generation, ?event, "ignoring event of a stale transport");
                    return ControlFlow::Continue(());
                }
                self.on_transport_event(event)
            }
            Command::Send(raw) => {
                self.send_raw(raw);
                ControlFlow::Continue(())
            }
            Command::Registered(ns) => {
                self.on_registered(ns);
                ControlFlow::Continue(())
            }
            Command::Heartbeat => {
                if self.conn.is_connected() {
                    self.send_frame(&Frame::heartbeat());
                }
                ControlFlow::Continue(())
            }
            Command::WatchdogExpired(generation) => match &self.watchdog {
                Some(watchdog) if generation == self.generation => {
                    let window = watchdog.window;
                    self.fatal(Error::HeartbeatTimeout(window))
                }
                _ => ControlFlow::Continue(()),
            },
            Command::ReconnectTimer => {
                self.reconnect = None;
                if self.conn.state() != ConnectionState::Interrupted {
                    return ControlFlow::Continue(());
                }
                self.reconnect_transport()
            }
            Command::ReconnectDeadline => match self.conn.state() {
                ConnectionState::Interrupted | ConnectionState::ConnectingTransport => {
                    let timeout = self.closing_timeout().unwrap_or_default();
                    let last = self.last_transport_error.clone();
                    self.fatal(Error::ReconnectTimeout { timeout, last })
                }
                _ => ControlFlow::Continue(()),
            },
            Command::Reconnect => {
                match self.conn.state() {
                    ConnectionState::Ready | ConnectionState::ConnectingTransport => {
                        self.transport_failure(None)
                    }
                    _ => (),
                }
                ControlFlow::Continue(())
            }
            Command::Shutdown => {
                #[cfg(feature = "tracing")]
                tracing::debug!(origin = self.conn.origin(), "connection shutdown requested");
                self.teardown(true)
            }
        }
    }

    fn start_handshake(&mut self) {
        if !self.conn.set_state(ConnectionState::Handshaking) {
            return;
        }
        let config = &self.conn.config;
        let req = HandshakeRequest {
            url: config.handshake_url(self.conn.origin()),
            headers: self.conn.headers.clone(),
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(url = req.url, "sending handshake request");

        let fut = config.handshaker.handshake(req);
        let timeout = config.connect_timeout;
        let version = config.protocol;
        let tx = self.conn.cmd_tx.clone();
        self.handshake = Some(tokio::spawn(async move {
            let res = match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(body)) => HandshakeData::parse_expecting(&body, version).map_err(Error::from),
                Ok(Err(err)) => Err(Error::HandshakeIo(Arc::new(err))),
                Err(elapsed) => Err(Error::HandshakeIo(Arc::new(elapsed.into()))),
            };
            let _ = tx.send(Command::Handshake(res));
        }));
    }

    /// Create and connect a transport for the known session.
    fn connect_transport(&mut self) -> ControlFlow<()> {
        let Some(session) = self.conn.session.get() else {
            return ControlFlow::Continue(());
        };
        let config = &self.conn.config;
        let Some(factory) = config.select_transport(&session.transports) else {
            let err = Error::NoTransport(session.transports.clone());
            return self.fatal(err);
        };
        let ctx = TransportContext {
            origin: self.conn.origin().to_string(),
            req_path: config.req_path.clone(),
            sid: session.sid.clone(),
            version: config.protocol,
            headers: self.conn.headers.clone(),
        };
        let mut transport = factory.create(&ctx);
        if !self.conn.set_state(ConnectionState::ConnectingTransport) {
            return ControlFlow::Break(());
        }

        self.drop_transport();
        self.generation += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            origin = self.conn.origin(),
            transport = transport.name(),
            generation = self.generation,
            "connecting transport"
        );
        self.conn.set_transport_name(transport.name());
        transport.connect(TransportEvents::new(self.generation, self.conn.cmd_tx.clone()));
        self.transport = Some(transport);
        ControlFlow::Continue(())
    }

    fn reconnect_transport(&mut self) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(origin = self.conn.origin(), "reconnecting transport");
        self.connect_transport()?;
        // at most one keepalive waits in the buffer
        if !self.keepalive_in_queue {
            if let Ok(raw) = self.version().encode(&Frame::heartbeat()) {
                self.keepalive_in_queue = true;
                self.conn.buffer.enqueue(raw);
            }
        }
        ControlFlow::Continue(())
    }

    fn on_transport_event(&mut self, event: TransportEvent) -> ControlFlow<()> {
        match event {
            TransportEvent::Connected => self.on_ready(),
            TransportEvent::Message(raw) => {
                self.reset_watchdog();
                self.on_frame(raw)
            }
            TransportEvent::Payload(data) => {
                self.reset_watchdog();
                let frames = match decode_payload(self.version(), &data) {
                    Ok(frames) => frames,
                    Err(err) => return self.fatal(err.into()),
                };
                for raw in frames {
                    self.on_frame(raw)?;
                }
                ControlFlow::Continue(())
            }
            TransportEvent::Closed => {
                self.transport_failure(None);
                ControlFlow::Continue(())
            }
            TransportEvent::Error(err) => {
                self.transport_failure(Some(err));
                ControlFlow::Continue(())
            }
            TransportEvent::Unsent(frames) => {
                self.conn.buffer.restore(frames.into_iter());
                ControlFlow::Continue(())
            }
        }
    }

    fn on_ready(&mut self) -> ControlFlow<()> {
        if self.conn.state() != ConnectionState::ConnectingTransport
            || !self.conn.set_state(ConnectionState::Ready)
        {
            return ControlFlow::Continue(());
        }
        abort(self.reconnect.take());
        abort(self.deadline.take());
        self.arm_heartbeat();
        self.arm_watchdog();
        self.keepalive_in_queue = false;

        if let Some(transport) = self.transport.as_deref_mut() {
            if let Err(err) = self.conn.buffer.flush(transport) {
                self.transport_failure(Some(err));
                return ControlFlow::Continue(());
            }
        }

        if std::mem::take(&mut self.first_connect) {
            if let Some(socket) = self.conn.default_socket() {
                socket.deliver_connect();
            }
        }
        ControlFlow::Continue(())
    }

    fn on_registered(&mut self, ns: Str) {
        let Some(socket) = self.conn.sockets.get(&ns) else {
            return;
        };
        if socket.is_default_ns() {
            // a default socket joining a live connection has nothing to wait for
            if !self.first_connect && self.conn.is_connected() {
                socket.deliver_connect();
            }
        } else {
            self.send_frame(&Frame::connect(&ns));
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self), fields(origin = self.conn.origin())))]
    fn on_frame(&mut self, raw: Str) -> ControlFlow<()> {
        let frame = match self.version().decode(&raw) {
            Ok(frame) => frame,
            Err(err) if err.is_fatal() => return self.fatal(err.into()),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(?raw, "dropping invalid frame: {_err}");
                return ControlFlow::Continue(());
            }
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(?frame, "received frame");

        let ack = RemoteAck::for_frame(&frame, self.version(), &self.conn.cmd_tx);
        let advises_disconnect = frame.advises_disconnect();
        if let Some(id) = frame.id.filter(|id| !id.wants_data) {
            // 0.9.x servers expect an immediate empty ack for ids without `+`
            self.send_frame(&Frame::ack(&frame.ns, id.id, vec![]));
        }

        let Frame { data, ns, .. } = frame;
        match data {
            FrameData::Connect => {
                // namespaced sockets wait for the confirmation of their own namespace
                let socket = if ns == DEFAULT_NS {
                    self.conn.default_socket()
                } else {
                    self.conn.sockets.get(&ns)
                };
                if let Some(socket) = socket {
                    socket.deliver_connect();
                }
            }
            FrameData::Disconnect if ns == DEFAULT_NS => {
                return self.teardown(true);
            }
            FrameData::Disconnect => {
                if let Some(socket) = self.conn.sockets.remove(&ns) {
                    if socket.mark_dead() {
                        socket.deliver_disconnect();
                    }
                }
                if self.conn.sockets.is_closed() {
                    return self.teardown(true);
                }
            }
            FrameData::Close => return self.teardown(true),
            FrameData::Heartbeat => match self.version() {
                ProtocolVersion::V1 => self.send_frame(&Frame::heartbeat()),
                ProtocolVersion::V2 => self.send_frame(&Frame::root(FrameData::Pong)),
            },
            FrameData::Probe(Probe::Ping) => {
                self.send_frame(&Frame::root(FrameData::Probe(Probe::Pong)))
            }
            FrameData::Probe(Probe::Pong) => self.send_frame(&Frame::root(FrameData::Upgrade)),
            FrameData::Pong | FrameData::Open(_) | FrameData::Upgrade | FrameData::Noop => (),
            FrameData::Message(text) => {
                if let Some(socket) = self.conn.sockets.dispatch(&ns) {
                    socket.call("on_message", "message", |cb| cb.on_message(text, ack));
                }
            }
            FrameData::JsonMessage(value) => {
                if let Some(socket) = self.conn.sockets.dispatch(&ns) {
                    socket.call("on_json_message", "json message", |cb| {
                        cb.on_json_message(value, ack)
                    });
                }
            }
            FrameData::Event { name, args } => {
                if let Some(socket) = self.conn.sockets.dispatch(&ns) {
                    socket.call("on_event", "event", |cb| cb.on_event(&name, ack, args));
                }
            }
            FrameData::Ack { id, args } => {
                self.conn.acks.resolve(id, args);
            }
            FrameData::Error(reason) => {
                let err = Error::Server(reason);
                #[cfg(feature = "tracing")]
                tracing::warn!(?ns, "{err}");
                if ns == DEFAULT_NS {
                    for socket in self.conn.sockets.all() {
                        socket.deliver_error(&err);
                    }
                } else if let Some(socket) = self.conn.sockets.dispatch(&ns) {
                    socket.deliver_error(&err);
                }
                if advises_disconnect {
                    self.conn.set_last_error(err);
                    return self.teardown(true);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn send_frame(&mut self, frame: &Frame) {
        match self.version().encode(frame) {
            Ok(raw) => self.send_raw(raw),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(?frame, "cannot encode frame: {_err}");
            }
        }
    }

    /// Send right away when ready, buffer otherwise.
    fn send_raw(&mut self, raw: Str) {
        if self.conn.state() == ConnectionState::Invalid {
            return;
        }
        let transport = match self.transport.as_deref_mut() {
            Some(transport) if self.conn.is_connected() => transport,
            _ => {
                self.conn.buffer.enqueue(raw);
                return;
            }
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(?raw, "sending frame");
        if let Err(err) = transport.send(raw.clone()) {
            self.conn.buffer.enqueue(raw);
            self.transport_failure(Some(err));
        }
    }

    /// The transport is gone: keep the session and schedule a reconnect.
    fn transport_failure(&mut self, err: Option<TransportError>) {
        if self.conn.state() == ConnectionState::Invalid {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(origin = self.conn.origin(), ?err, "transport interrupted");
        if let Some(err) = err {
            let err = Arc::new(err);
            self.conn.set_last_error(Error::Transport(err.clone()));
            self.last_transport_error = Some(err);
        }
        self.drop_transport();
        abort(self.heartbeat.take());
        self.disarm_watchdog();
        self.conn.set_state(ConnectionState::Interrupted);

        if self.deadline.is_none() {
            if let Some(timeout) = self.closing_timeout() {
                self.deadline = Some(self.schedule(timeout, Command::ReconnectDeadline));
            }
        }
        abort(self.reconnect.take());
        let delay = self.conn.config.reconnect_delay;
        self.reconnect = Some(self.schedule(delay, Command::ReconnectTimer));
    }

    fn closing_timeout(&self) -> Option<Duration> {
        self.conn.session.get().and_then(|s| s.closing_timeout)
    }

    fn schedule(&self, delay: Duration, cmd: Command) -> JoinHandle<()> {
        let tx = self.conn.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(cmd);
        })
    }

    fn arm_heartbeat(&mut self) {
        abort(self.heartbeat.take());
        let Some(period) = self.conn.session.get().and_then(|s| s.heartbeat_timeout) else {
            return;
        };
        let tx = self.conn.cmd_tx.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                if tx.send(Command::Heartbeat).is_err() {
                    return;
                }
            }
        }));
    }

    fn arm_watchdog(&mut self) {
        self.disarm_watchdog();
        let Some(window) = self.conn.session.get().and_then(|s| s.heartbeat_window()) else {
            return;
        };
        let (reset, mut reset_rx) = mpsc::channel(1);
        let tx = self.conn.cmd_tx.clone();
        let generation = self.generation;
        let task = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(window, reset_rx.recv()).await {
                    Ok(Some(())) => (),
                    Ok(None) => return,
                    Err(_) => {
                        let _ = tx.send(Command::WatchdogExpired(generation));
                        return;
                    }
                }
            }
        });
        self.watchdog = Some(Watchdog {
            task,
            reset,
            window,
        });
    }

    fn reset_watchdog(&self) {
        if let Some(watchdog) = &self.watchdog {
            // a full channel already holds a pending reset
            let _ = watchdog.reset.try_send(());
        }
    }

    fn disarm_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.task.abort();
        }
    }

    /// Detach the current transport, its pending events become stale.
    fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.invalidate();
            self.generation += 1;
        }
    }

    /// A fatal error: report it to every socket then tear down.
    fn fatal(&mut self, err: Error) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        tracing::error!(origin = self.conn.origin(), "connection failed: {err}");
        self.conn.set_last_error(err.clone());
        for socket in self.conn.sockets.all() {
            socket.deliver_error(&err);
        }
        self.teardown(false)
    }

    /// Release everything held by the connection. Runs once, the engine stops afterwards.
    fn teardown(&mut self, notify: bool) -> ControlFlow<()> {
        if !self.conn.set_state(ConnectionState::Invalid) {
            return ControlFlow::Break(());
        }
        for task in [
            self.handshake.take(),
            self.heartbeat.take(),
            self.reconnect.take(),
            self.deadline.take(),
        ] {
            abort(task);
        }
        self.disarm_watchdog();
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
            self.generation += 1;
        }

        for socket in self.conn.sockets.drain() {
            if socket.mark_dead() && notify {
                socket.deliver_disconnect();
            }
        }
        self.conn.acks.clear();
        self.conn.detach();
        self.rx.close();
        ControlFlow::Break(())
    }
}

fn abort(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
    }
}
