//! Channel-backed subscription listener.
//!
//! [`ChannelListener`] turns listener callbacks into [`SubscriptionEvent`]s on
//! a bounded queue, read through a [`SubscriptionReceiver`]. A consumer that
//! lets the queue fill up is dropped: the subscription is stopped and a final
//! `Dropped { reason: BufferOverflow }` is queued if there is room.

use super::types::{Checkpointer, Subscription, SubscriptionListener};
use crate::error::ClientError;
use crate::types::{Position, ResolvedEvent};
use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::time::Duration;
use tracing::warn;

/// Default queue capacity of a channel listener.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Events emitted by a channel-backed subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    Confirmed { subscription_id: String },
    Event(ResolvedEvent),
    Checkpoint(Position),
    /// Finished catching up, now streaming live.
    CaughtUp,
    FellBehind,
    Dropped { reason: DropReason },
}

/// Why a subscription stopped delivering.
#[derive(Clone, Debug, PartialEq)]
pub enum DropReason {
    /// The receiver did not keep up (slow consumer).
    BufferOverflow,
    /// The server cancelled the subscription.
    ServerCancelled,
    Error(ClientError),
}

/// Listener queueing every callback onto a bounded channel.
///
/// Also usable as the subscription's [`Checkpointer`], in which case
/// checkpoints are queued in order with the events.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    sender: Sender<SubscriptionEvent>,
}

/// Create a listener and the receiver draining it.
pub fn channel_listener(buffer_size: usize) -> (ChannelListener, SubscriptionReceiver) {
    let (sender, receiver) = bounded(buffer_size.max(1));
    (ChannelListener { sender }, SubscriptionReceiver { receiver })
}

impl ChannelListener {
    /// Try to queue an event. Returns false if the buffer is full or the
    /// receiver is gone.
    fn try_send(&self, event: SubscriptionEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn deliver(&self, subscription: &Subscription, event: SubscriptionEvent) {
        if self.try_send(event) {
            return;
        }

        warn!(
            id = subscription.subscription_id(),
            "dropping slow subscriber"
        );
        subscription.stop();
        let _ = self.sender.try_send(SubscriptionEvent::Dropped {
            reason: DropReason::BufferOverflow,
        });
    }
}

impl SubscriptionListener for ChannelListener {
    fn on_confirmation(&self, subscription: &Subscription) {
        self.deliver(
            subscription,
            SubscriptionEvent::Confirmed {
                subscription_id: subscription.subscription_id().to_string(),
            },
        );
    }

    fn on_event(&self, subscription: &Subscription, event: ResolvedEvent) {
        self.deliver(subscription, SubscriptionEvent::Event(event));
    }

    fn on_caught_up(&self, subscription: &Subscription) {
        self.deliver(subscription, SubscriptionEvent::CaughtUp);
    }

    fn on_fell_behind(&self, subscription: &Subscription) {
        self.deliver(subscription, SubscriptionEvent::FellBehind);
    }

    fn on_cancelled(&self, _subscription: Option<&Subscription>, error: Option<&ClientError>) {
        let reason = match error {
            Some(error) => DropReason::Error(error.clone()),
            None => DropReason::ServerCancelled,
        };
        let _ = self.sender.try_send(SubscriptionEvent::Dropped { reason });
    }
}

impl Checkpointer for ChannelListener {
    fn on_checkpoint(&self, subscription: &Subscription, position: Position) {
        self.deliver(subscription, SubscriptionEvent::Checkpoint(position));
    }
}

/// Receiving side of a [`ChannelListener`].
///
/// Disconnects once every clone of the listener has been dropped and the
/// queue is drained.
#[derive(Debug)]
pub struct SubscriptionReceiver {
    receiver: Receiver<SubscriptionEvent>,
}

impl SubscriptionReceiver {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SubscriptionEvent, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SubscriptionEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SubscriptionEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Events queued right now.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
