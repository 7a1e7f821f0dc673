//! The [`SocketCallback`] trait implemented by applications to receive
//! the frames addressed to a namespace socket.
use serde_json::Value;
use socketioxide_client_core::Str;

use crate::{
    ack::RemoteAck,
    errors::{CallbackError, Error},
};

/// The result returned by every fallible callback.
///
/// An error is wrapped in [`Error::Callback`] and delivered to [`SocketCallback::on_error`]
/// of the same socket, it never affects the connection.
pub type CallbackResult = Result<(), CallbackError>;

/// Application callbacks of a namespace socket.
///
/// Callbacks are called from the connection task, they should not block.
/// Every method has a default no-op implementation.
///
/// When the server requests an acknowledgement, an [`RemoteAck`] is given to the callback.
/// Calling [`RemoteAck::ack`] sends the acknowledgement back.
pub trait SocketCallback: Send + Sync + 'static {
    /// The namespace is connected.
    fn on_connect(&self) -> CallbackResult {
        Ok(())
    }

    /// The namespace is disconnected, either by the server or by [`unregister`](crate::Connection::unregister).
    fn on_disconnect(&self) -> CallbackResult {
        Ok(())
    }

    /// A plain text message was received.
    fn on_message(&self, text: Str, ack: Option<RemoteAck>) -> CallbackResult {
        let _ = (text, ack);
        Ok(())
    }

    /// A structured message was received.
    fn on_json_message(&self, value: Value, ack: Option<RemoteAck>) -> CallbackResult {
        let _ = (value, ack);
        Ok(())
    }

    /// An event was received.
    fn on_event(&self, name: &str, ack: Option<RemoteAck>, args: Vec<Value>) -> CallbackResult {
        let _ = (name, ack, args);
        Ok(())
    }

    /// An error occurred.
    fn on_error(&self, err: &Error) {
        let _ = err;
    }
}
