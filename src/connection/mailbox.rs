//! Serialized command queue of the connection supervisor.

use super::work_item::{ChannelId, WorkItem, WorkItemArgs};
use crate::error::{ClientError, Result};
use crate::future::ResultSender;
use crate::types::Endpoint;
use crossbeam_channel::{Receiver, SendError, Sender};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A queued work item. Reports `ConnectionShutdown` if dropped unanswered.
pub(crate) struct RunWorkItem {
    id: u64,
    item: Option<WorkItem>,
}

impl RunWorkItem {
    pub(crate) fn new(id: u64, item: WorkItem) -> Self {
        Self {
            id,
            item: Some(item),
        }
    }

    pub(crate) fn complete(mut self, args: WorkItemArgs) {
        if let Some(item) = self.item.take() {
            item(Ok(args));
        }
    }

    pub(crate) fn report_error(mut self, error: ClientError) {
        if let Some(item) = self.item.take() {
            item(Err(error));
        }
    }
}

impl Drop for RunWorkItem {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            debug!(id = self.id, "work item abandoned");
            item(Err(ClientError::ConnectionShutdown));
        }
    }
}

/// Commands applied by the supervisor worker, in arrival order.
pub(crate) enum Msg {
    RunWorkItem(RunWorkItem),
    CreateChannel {
        /// Channel the failure was observed on; stale requests are skipped.
        previous: Option<ChannelId>,
        preferred: Option<Endpoint>,
    },
    Shutdown(Option<ResultSender<()>>),
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::RunWorkItem(item) => write!(f, "RunWorkItem[{}]", item.id),
            Msg::CreateChannel {
                previous,
                preferred,
            } => write!(f, "CreateChannel[{previous:?}, {preferred:?}]"),
            Msg::Shutdown(_) => write!(f, "Shutdown"),
        }
    }
}

struct Shared {
    closed: AtomicBool,
    /// Pushes hold it shared; the worker takes it exclusively while closing
    /// so nothing is enqueued after the final drain.
    gate: RwLock<()>,
    sender: Sender<Msg>,
}

/// Sending side of the supervisor queue.
#[derive(Clone)]
pub(crate) struct Mailbox {
    shared: Arc<Shared>,
}

impl Mailbox {
    pub(crate) fn new(sender: Sender<Msg>) -> Self {
        Self {
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                gate: RwLock::new(()),
                sender,
            }),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub(crate) fn push(&self, msg: Msg) {
        if self.is_closed() {
            reject(msg);
            return;
        }

        let rejected = {
            let _gate = self.shared.gate.read();
            if self.is_closed() {
                Some(msg)
            } else {
                debug!(?msg, "scheduled msg");
                self.shared.sender.send(msg).err().map(|SendError(msg)| msg)
            }
        };

        if let Some(msg) = rejected {
            reject(msg);
        }
    }

    /// Mark the mailbox closed and hand back everything still queued.
    pub(crate) fn close(&self, receiver: &Receiver<Msg>) -> Vec<Msg> {
        let _gate = self.shared.gate.write();
        self.shared.closed.store(true, Ordering::Release);
        receiver.try_iter().collect()
    }
}

/// Answer a message without running it.
pub(crate) fn reject(msg: Msg) {
    match msg {
        Msg::RunWorkItem(item) => item.report_error(ClientError::ConnectionShutdown),
        Msg::Shutdown(ack) => acknowledge(ack),
        Msg::CreateChannel { .. } => debug!("connection is shut down, channel not recreated"),
    }
}

pub(crate) fn acknowledge(ack: Option<ResultSender<()>>) {
    if let Some(ack) = ack {
        ack.send(Ok(()));
    }
}

pub(crate) fn shutdown_fallback<T>() -> Result<T> {
    Err(ClientError::ConnectionShutdown)
}
