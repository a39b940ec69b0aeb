//! Blocking sequence of read results.

use super::consumer::{ReadItem, ReadShared, ReadStreamConsumer};
use crate::connection::ConnectionSupervisor;
use crate::error::{ClientError, Result};
use crate::options::BackPressure;
use crate::streaming::{FlowState, ReadResponseObserver, StreamControl};
use crate::transport::{ReadRequest, ResponseObserver};
use crate::types::{ReadMessage, ResolvedEvent};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Result sequence of a one-shot read.
///
/// Finite and forward-only; to read again, issue a new read. Dropping the
/// stream cancels the underlying call.
///
/// Frames are queued as the transport delivers them, and the queue is
/// unbounded. The credit window limits how many frames are in flight on the
/// call, not how far the queue runs ahead of the caller: threshold refills
/// keep the call moving whether or not anyone iterates, so a slow reader of
/// a large stream ends up holding all of it in memory. Iterating does not
/// signal demand; [`ReadStream::request`] only sizes the next grant. Use
/// `max_count` to bound a read.
pub struct ReadStream {
    receiver: Receiver<ReadItem>,
    shared: Arc<ReadShared>,
    control: StreamControl,
}

impl ReadStream {
    /// Open a read through the supervisor. Returns immediately; results
    /// arrive as the call progresses.
    pub(crate) fn open(
        supervisor: &ConnectionSupervisor,
        request: ReadRequest,
        back_pressure: BackPressure,
    ) -> Self {
        let (stream, observer) = Self::pending(back_pressure);
        observer.start(supervisor, request);
        stream
    }

    /// A stream that already failed, without touching the network.
    pub(crate) fn failed(error: ClientError) -> Self {
        let (stream, observer) = Self::pending(BackPressure::default());
        observer.on_error(error);
        stream
    }

    fn pending(
        back_pressure: BackPressure,
    ) -> (Self, Arc<ReadResponseObserver<ReadStreamConsumer>>) {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(ReadShared::new(sender));
        let observer = Arc::new(ReadResponseObserver::new(
            back_pressure,
            ReadStreamConsumer::new(Arc::clone(&shared)),
        ));

        let stream = Self {
            receiver,
            shared,
            control: observer.control(),
        };
        (stream, observer)
    }

    /// Signal demand for `n` more messages.
    pub fn request(&self, n: u64) -> Result<()> {
        self.control.request(n)
    }

    /// Stop the read. The sequence ends without a further error.
    pub fn cancel(&self) {
        self.shared.mark_cancelled();
        self.control.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Next message (blocking). `None` once the read has finished.
    pub fn recv(&self) -> Option<Result<ReadMessage>> {
        if self.is_cancelled() {
            return None;
        }
        self.receiver.recv().ok()
    }

    /// Next message with a timeout. `Disconnected` means the read has
    /// finished.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Result<ReadMessage>, RecvTimeoutError> {
        if self.is_cancelled() {
            return Err(RecvTimeoutError::Disconnected);
        }
        self.receiver.recv_timeout(timeout)
    }

    /// Drain the read, keeping only events. Stops at the first error.
    pub fn into_events(self) -> Result<Vec<ResolvedEvent>> {
        let mut events = Vec::new();
        for message in self {
            if let Some(event) = message?.into_event() {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn flow_state(&self) -> FlowState {
        self.control.flow_state()
    }
}

impl Iterator for ReadStream {
    type Item = Result<ReadMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
