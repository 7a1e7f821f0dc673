use std::{collections::VecDeque, sync::Mutex};

use socketioxide_client_core::Str;

use crate::{errors::TransportError, transport::Transport};

/// Encoded frames waiting for a ready transport, in enqueue order.
#[derive(Debug, Default)]
pub(crate) struct OutputBuffer {
    queue: Mutex<VecDeque<Str>>,
}

impl OutputBuffer {
    pub fn enqueue(&self, frame: Str) {
        self.queue.lock().unwrap().push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the queue into the transport.
    ///
    /// A bulk send is attempted first when supported. Frames are then sent one by one,
    /// the first failure puts the remaining frames back at the front of the queue.
    pub fn flush(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        let snapshot: Vec<Str> = self.queue.lock().unwrap().drain(..).collect();
        if snapshot.is_empty() {
            return Ok(());
        }

        if transport.can_send_bulk() {
            match transport.send_bulk(&snapshot) {
                Ok(()) => return Ok(()),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?_err, "bulk send failed, falling back to sequential send");
                }
            }
        }

        let mut frames = snapshot.into_iter();
        while let Some(frame) = frames.next() {
            if let Err(err) = transport.send(frame.clone()) {
                self.restore(std::iter::once(frame).chain(frames));
                return Err(err);
            }
        }
        Ok(())
    }

    /// Put frames back at the front of the queue, keeping their order.
    pub fn restore(&self, frames: impl DoubleEndedIterator<Item = Str>) {
        let mut queue = self.queue.lock().unwrap();
        for frame in frames.rev() {
            queue.push_front(frame);
        }
    }
}
