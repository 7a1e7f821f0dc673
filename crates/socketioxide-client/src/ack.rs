//! Acknowledgement correlation.
//!
//! * [`AckTable`] stores the callbacks of the frames sent with an acknowledgement request,
//!   keyed by their correlation id.
//! * [`RemoteAck`] is handed to application callbacks when the server requested an
//!   acknowledgement for an inbound frame.
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Mutex,
        atomic::{AtomicI64, Ordering},
    },
};

use serde_json::Value;
use socketioxide_client_core::{Frame, ProtocolVersion, Str};

use crate::{
    connection::{Command, CommandTx},
    errors::SendError,
};

/// A callback invoked with the arguments of the server acknowledgement.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// Pending acknowledgements of a connection.
///
/// Ids start at 1 and are never reused during the lifetime of the connection.
pub(crate) struct AckTable {
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, AckCallback>>,
}

impl AckTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Store the callback and return the id to embed in the outgoing frame.
    pub fn request_ack(&self, callback: AckCallback) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(id, callback);
        id
    }

    /// Remove and call the callback registered for `id`.
    ///
    /// An unknown id is only logged, it may belong to a previous transport.
    /// Returns whether a callback was called.
    pub fn resolve(&self, id: i64, args: Vec<Value>) -> bool {
        // The lock is released before calling the callback so it can send new frames.
        let callback = self.pending.lock().unwrap().remove(&id);
        match callback {
            Some(callback) => {
                callback(args);
                true
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(id, "received ack for unknown id");
                false
            }
        }
    }

    /// Number of acknowledgements still pending.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Drop every pending callback.
    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
    }
}

/// A one-shot acknowledgement of an inbound frame.
///
/// Calling [`RemoteAck::ack`] sends an ack frame carrying the given arguments to the server.
/// Dropping it without calling [`RemoteAck::ack`] sends nothing.
pub struct RemoteAck {
    ns: Str,
    id: i64,
    version: ProtocolVersion,
    tx: CommandTx,
}

impl RemoteAck {
    /// Build a [`RemoteAck`] if the frame requested an acknowledgement with data.
    pub(crate) fn for_frame(frame: &Frame, version: ProtocolVersion, tx: &CommandTx) -> Option<Self> {
        let id = frame.id.filter(|id| id.wants_data)?;
        Some(Self {
            ns: frame.ns.clone(),
            id: id.id,
            version,
            tx: tx.clone(),
        })
    }

    /// The correlation id being acknowledged.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Send the acknowledgement with the given arguments.
    pub fn ack(self, args: Vec<Value>) -> Result<(), SendError> {
        let frame = Frame::ack(&self.ns, self.id, args);
        let raw = self.version.encode(&frame)?;
        self.tx
            .send(Command::Send(raw))
            .map_err(|_| SendError::ConnectionClosed)
    }
}

impl fmt::Debug for RemoteAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAck")
            .field("ns", &self.ns)
            .field("id", &self.id)
            .finish()
    }
}
