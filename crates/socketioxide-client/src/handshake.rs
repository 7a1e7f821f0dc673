//! The handshake request collaborator.
use std::fmt;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};

use crate::{
    errors::TransportError,
    transport::polling::{HttpClient, http_client},
};

/// A handshake request.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// The full handshake url
    pub url: String,
    /// Custom headers to attach
    pub headers: HeaderMap,
}

/// Performs the handshake request and returns the raw response body.
///
/// The connection bounds the returned future with [`ClientConfig::connect_timeout`](crate::ClientConfig::connect_timeout).
pub trait Handshaker: Send + Sync + 'static {
    /// Issue the request.
    fn handshake(&self, req: HandshakeRequest) -> BoxFuture<'static, Result<String, TransportError>>;
}

/// A [`Handshaker`] issuing a `GET` with the [`hyper_util`] client.
///
/// The client is created lazily so the config can be built outside of a tokio runtime.
#[derive(Default)]
pub struct HttpHandshaker {
    client: std::sync::OnceLock<HttpClient>,
}

impl HttpHandshaker {
    fn client(&self) -> HttpClient {
        self.client.get_or_init(http_client).clone()
    }
}

impl fmt::Debug for HttpHandshaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHandshaker").finish()
    }
}

impl Handshaker for HttpHandshaker {
    fn handshake(&self, req: HandshakeRequest) -> BoxFuture<'static, Result<String, TransportError>> {
        let client = self.client();
        Box::pin(async move {
            let HandshakeRequest { url, headers } = req;
            let mut req = Request::get(url).body(Full::new(Bytes::new()))?;
            req.headers_mut().extend(headers);

            let res = client.request(req).await?;
            if res.status() != StatusCode::OK {
                return Err(TransportError::Status(res.status()));
            }
            let body = res.into_body().collect().await?.to_bytes();
            Ok(std::str::from_utf8(&body)?.to_string())
        })
    }
}
