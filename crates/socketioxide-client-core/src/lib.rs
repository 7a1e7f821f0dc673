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
//! Core types of the socket.io client: frames, codecs, transport payloads and handshakes
//! for the 0.9.x ([`ProtocolVersion::V1`]) and 1.0.x ([`ProtocolVersion::V2`]) protocols.
//!
//! Everything in this crate is pure and synchronous, the connection engine lives in
//! the `socketioxide-client` crate.

pub mod codec;
pub mod errors;
pub mod frame;
pub mod handshake;
pub mod payload;
mod str;

pub use codec::ProtocolVersion;
pub use frame::{CorrelationId, DEFAULT_NS, Frame, FrameData, Probe};
pub use handshake::HandshakeData;
pub use str::Str;
