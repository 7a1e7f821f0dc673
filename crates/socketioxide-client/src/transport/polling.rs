//! Long-polling transport built on the [`hyper_util`] legacy client.
//!
//! Two tasks drive a session:
//! * the poll loop issues one `GET` at a time and reports every body as a multi-frame payload;
//! * the post loop sends queued frames, coalescing everything queued at the time of the request
//!   in a single `POST` body. Frames of a failed `POST` are given back to the engine.
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use socketioxide_client_core::{ProtocolVersion, Str, payload::encode_payload};
use tokio::{sync::mpsc, task::JoinHandle};

use super::{Transport, TransportContext, TransportEvents, TransportFactory};
use crate::errors::TransportError;

pub(crate) type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub(crate) fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Creates [`PollingTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollingFactory;

impl TransportFactory for PollingFactory {
    fn name(&self, version: ProtocolVersion) -> &'static str {
        match version {
            ProtocolVersion::V1 => "xhr-polling",
            ProtocolVersion::V2 => "polling",
        }
    }

    fn create(&self, ctx: &TransportContext) -> Box<dyn Transport> {
        Box::new(PollingTransport::new(ctx.clone(), self.name(ctx.version)))
    }
}

/// A long-polling transport. It supports bulk send.
#[derive(Debug)]
pub struct PollingTransport {
    ctx: TransportContext,
    name: &'static str,
    post_tx: Option<mpsc::UnboundedSender<Vec<Str>>>,
    poll_task: Option<JoinHandle<()>>,
    post_task: Option<JoinHandle<()>>,
}

impl PollingTransport {
    /// Create a transport for the given session.
    pub fn new(ctx: TransportContext, name: &'static str) -> Self {
        Self {
            ctx,
            name,
            post_tx: None,
            poll_task: None,
            post_task: None,
        }
    }

    fn queue(&self, frames: Vec<Str>) -> Result<(), TransportError> {
        let tx = self.post_tx.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(frames).map_err(|_| TransportError::NotConnected)
    }
}

impl Transport for PollingTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn connect(&mut self, events: TransportEvents) {
        let client = http_client();
        let (post_tx, post_rx) = mpsc::unbounded_channel();
        self.post_tx = Some(post_tx);

        // Polling is usable right away, the first GET confirms the session.
        events.connected();

        self.poll_task = Some(tokio::spawn(poll_loop(
            client.clone(),
            self.ctx.clone(),
            self.name,
            events.clone(),
        )));
        self.post_task = Some(tokio::spawn(post_loop(
            client,
            self.ctx.clone(),
            self.name,
            post_rx,
            events,
        )));
    }

    fn send(&mut self, frame: Str) -> Result<(), TransportError> {
        self.queue(vec![frame])
    }

    fn can_send_bulk(&self) -> bool {
        true
    }

    fn send_bulk(&mut self, frames: &[Str]) -> Result<(), TransportError> {
        self.queue(frames.to_vec())
    }

    fn disconnect(&mut self) {
        // The post loop ends once the frames already queued are sent.
        self.post_tx = None;
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn invalidate(&mut self) {
        self.post_tx = None;
        for task in [self.poll_task.take(), self.post_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

async fn poll_loop(
    client: HttpClient,
    ctx: TransportContext,
    name: &'static str,
    events: TransportEvents,
) {
    loop {
        match request(&client, &ctx, name, Method::GET, Bytes::new()).await {
            Ok(body) if body.is_empty() => (),
            Ok(body) => events.payload(body),
            Err(err) => {
                events.error(err);
                return;
            }
        }
        if events.is_closed() {
            return;
        }
    }
}

async fn post_loop(
    client: HttpClient,
    ctx: TransportContext,
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<Vec<Str>>,
    events: TransportEvents,
) {
    while let Some(mut frames) = rx.recv().await {
        while let Ok(more) = rx.try_recv() {
            frames.extend(more);
        }
        let body = encode_payload(ctx.version, &frames);
        #[cfg(feature = "tracing")]
        tracing::trace!(?body, "posting payload");
        if let Err(err) = request(&client, &ctx, name, Method::POST, body.into()).await {
            while let Ok(more) = rx.try_recv() {
                frames.extend(more);
            }
            events.unsent(frames);
            events.error(err);
            return;
        }
    }
}

async fn request(
    client: &HttpClient,
    ctx: &TransportContext,
    name: &str,
    method: Method,
    body: Bytes,
) -> Result<Str, TransportError> {
    let mut req = Request::builder()
        .method(method)
        .uri(ctx.polling_url(name))
        .header(http::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(Full::new(body))?;
    req.headers_mut().extend(ctx.headers.clone());

    let res = client.request(req).await?;
    if res.status() != StatusCode::OK {
        return Err(TransportError::Status(res.status()));
    }
    let body = res.into_body().collect().await?.to_bytes();
    Ok(Str::from_utf8(body)?)
}
