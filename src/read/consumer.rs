//! Consumer feeding a one-shot read into a queue.

use crate::error::{ClientError, Result};
use crate::streaming::StreamConsumer;
use crate::types::{Position, ReadMessage, ResolvedEvent};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) type ReadItem = Result<ReadMessage>;

/// State shared by a read consumer and its [`super::ReadStream`].
pub(crate) struct ReadShared {
    /// Dropped to end the sequence.
    sender: Mutex<Option<Sender<ReadItem>>>,
    cancelled: AtomicBool,
}

impl ReadShared {
    pub(crate) fn new(sender: Sender<ReadItem>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.close();
    }

    fn send(&self, item: ReadItem) {
        if let Some(sender) = self.sender.lock().as_ref() {
            // receiver gone means the caller dropped the stream
            let _ = sender.send(item);
        }
    }

    fn fail(&self, error: ClientError) {
        let sender = self.sender.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(Err(error));
        }
    }

    fn close(&self) {
        self.sender.lock().take();
    }
}

/// Maps frames of a one-shot read onto [`ReadMessage`]s.
pub struct ReadStreamConsumer {
    shared: Arc<ReadShared>,
}

impl ReadStreamConsumer {
    pub(crate) fn new(shared: Arc<ReadShared>) -> Self {
        Self { shared }
    }
}

impl StreamConsumer for ReadStreamConsumer {
    fn on_event(&self, event: ResolvedEvent) {
        self.shared.send(Ok(ReadMessage::Event(event)));
    }

    fn on_stream_not_found(&self, stream_name: String) {
        self.shared
            .fail(ClientError::StreamNotFound { stream_name });
    }

    fn on_first_stream_position(&self, revision: u64) {
        self.shared
            .send(Ok(ReadMessage::FirstStreamPosition(revision)));
    }

    fn on_last_stream_position(&self, revision: u64) {
        self.shared
            .send(Ok(ReadMessage::LastStreamPosition(revision)));
    }

    fn on_last_all_stream_position(&self, position: Position) {
        self.shared.send(Ok(ReadMessage::LastAllPosition(position)));
    }

    fn on_cancelled(&self, error: Option<ClientError>) {
        match error {
            Some(error) => self.shared.fail(error),
            None => self.shared.close(),
        }
    }

    fn on_complete(&self) {
        self.shared.close();
    }
}
