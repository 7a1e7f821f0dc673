#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
//! A socket.io client connection engine for the 0.9.x and 1.0.x protocols, built on [`tokio`].
//!
//! ## Table of contents
//! * [Overview](#overview)
//! * [Usage](#usage)
//! * [Connection lifecycle](#connection-lifecycle)
//! * [Acknowledgements](#acknowledgements)
//! * [Transports](#transports)
//! * [Feature flags](#feature-flags)
//!
//! ## Overview
//! A [`ConnectionRegistry`] maps server origins to [`Connection`]s. Every connection carries
//! a single session with the server and multiplexes several [`NsSocket`]s over it, one per namespace.
//! Applications receive the frames of a namespace by implementing [`SocketCallback`].
//!
//! ## Usage
//! ```no_run
//! use serde_json::{Value, json};
//! use socketioxide_client::{
//!     ClientConfig, ConnectionRegistry, RemoteAck, SocketCallback, CallbackResult,
//! };
//!
//! struct Chat;
//! impl SocketCallback for Chat {
//!     fn on_connect(&self) -> CallbackResult {
//!         println!("connected");
//!         Ok(())
//!     }
//!     fn on_event(&self, name: &str, ack: Option<RemoteAck>, args: Vec<Value>) -> CallbackResult {
//!         println!("received {name}: {args:?}");
//!         if let Some(ack) = ack {
//!             ack.ack(vec![json!("ok")])?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(ClientConfig::default());
//!     let socket = registry.connect("http://localhost:3000/chat", Chat)?;
//!     socket.emit_with_ack("hello", vec![json!("world")], |args| {
//!         println!("server answered {args:?}");
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection lifecycle
//! A connection first issues a handshake request, then connects the first configured transport
//! advertised by the server. Frames sent before the transport is ready are buffered and flushed
//! in order once it is.
//!
//! When the transport fails the session is kept: a new transport is connected after
//! [`ClientConfig::reconnect_delay`], until the closing timeout negotiated with the server elapses.
//! Only then is the connection torn down and [`Error::ReconnectTimeout`] reported.
//!
//! Every error reaches the application through [`SocketCallback::on_error`], a failing callback
//! never affects the connection.
//!
//! ## Acknowledgements
//! * [`NsSocket::emit_with_ack`] and friends register a callback called with the arguments
//!   of the server acknowledgement.
//! * When the server requests an acknowledgement, the callback receives a [`RemoteAck`].
//!   With the 0.9.x protocol, frames requesting an acknowledgement without data are
//!   acknowledged automatically.
//!
//! ## Transports
//! The [`websocket`](transport::WebsocketFactory) and [`polling`](transport::PollingFactory) transports
//! are available by default. Custom transports implement [`Transport`](transport::Transport)
//! and are plugged with [`ClientConfigBuilder::transports`].
//!
//! ## Feature flags
//! * `tracing`: enable logs with the [`tracing`](https://docs.rs/tracing) crate.
pub mod transport;

pub use ack::{AckCallback, RemoteAck};
pub use callback::{CallbackResult, SocketCallback};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection::{Connection, ConnectionState};
pub use errors::{
    CallbackError, Error, ProtocolError, RegisterError, SendError, TransportError, UrlError,
};
pub use handshake::{HandshakeRequest, Handshaker, HttpHandshaker};
pub use ns::NsSocket;
pub use registry::{ConnectionRegistry, SocketUrl};
pub use socketioxide_client_core::{
    CorrelationId, DEFAULT_NS, Frame, FrameData, HandshakeData, ProtocolVersion, Str,
};

mod ack;
mod buffer;
mod callback;
mod config;
mod connection;
mod engine;
mod errors;
mod handshake;
mod ns;
mod registry;
