//! Websocket transport built on [`tokio_tungstenite`].
use futures_util::{SinkExt, StreamExt};
use http::HeaderMap;
use socketioxide_client_core::{ProtocolVersion, Str};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};

use super::{Transport, TransportContext, TransportEvents, TransportFactory};
use crate::errors::TransportError;

const NAME: &str = "websocket";

/// Creates [`WebsocketTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketFactory;

impl TransportFactory for WebsocketFactory {
    fn name(&self, _version: ProtocolVersion) -> &'static str {
        NAME
    }

    fn create(&self, ctx: &TransportContext) -> Box<dyn Transport> {
        Box::new(WebsocketTransport::new(ctx.ws_url(NAME), ctx.headers.clone()))
    }
}

/// A full-duplex websocket transport.
///
/// Every frame is sent in its own websocket message so bulk send is not supported.
#[derive(Debug)]
pub struct WebsocketTransport {
    url: String,
    headers: HeaderMap,
    tx: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl WebsocketTransport {
    /// Create a transport for the given `ws://` url.
    pub fn new(url: String, headers: HeaderMap) -> Self {
        Self {
            url,
            headers,
            tx: None,
            task: None,
        }
    }
}

impl Transport for WebsocketTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn connect(&mut self, events: TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        let url = self.url.clone();
        let headers = self.headers.clone();
        self.task = Some(tokio::spawn(async move {
            if let Err(err) = run(url, headers, rx, &events).await {
                events.error(err);
            }
        }));
    }

    fn send(&mut self, frame: Str) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(Message::text(String::from(frame)))
            .map_err(|_| TransportError::NotConnected)
    }

    fn disconnect(&mut self) {
        // The writer closes the socket once every queued frame is sent.
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Message::Close(None));
        }
    }

    fn invalidate(&mut self) {
        self.tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    url: String,
    headers: HeaderMap,
    mut rx: mpsc::UnboundedReceiver<Message>,
    events: &TransportEvents,
) -> Result<(), TransportError> {
    let mut req = url.into_client_request()?;
    req.headers_mut().extend(headers);

    #[cfg(feature = "tracing")]
    tracing::debug!(url = %req.uri(), "connecting websocket");
    let (ws, _) = tokio_tungstenite::connect_async(req).await?;
    events.connected();

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg @ Message::Close(_)) => {
                    sink.send(msg).await?;
                    return Ok(());
                }
                Some(msg) => sink.send(msg).await?,
                None => return Ok(()),
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => events.message(Str::copy_from_slice(text.as_str())),
                Some(Ok(Message::Close(_))) | None => {
                    events.closed();
                    return Ok(());
                }
                Some(Ok(_)) => (),
                Some(Err(err)) => return Err(err.into()),
            },
        }
    }
}
