//! Subscription handle, lifecycle and listener contracts.

use crate::error::ClientError;
use crate::streaming::{FlowState, StreamControl};
use crate::types::{Position, ResolvedEvent};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// How a subscription ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Stopped locally, or cancelled by the server.
    Cancelled,
    /// The server ended the stream normally.
    Completed,
    Errored,
}

/// Lifecycle of a subscription.
///
/// Moves forward only: `Connecting -> Confirmed -> Live`, and from any state
/// to `Terminal`, which is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Confirmed,
    /// At least one event was delivered.
    Live,
    Terminal(Termination),
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Shared lifecycle cell of one subscription call.
pub(crate) struct StateCell {
    state: Mutex<SubscriptionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SubscriptionState::Connecting),
        }
    }

    pub(crate) fn get(&self) -> SubscriptionState {
        *self.state.lock()
    }

    pub(crate) fn confirm(&self) {
        let mut state = self.state.lock();
        if *state == SubscriptionState::Connecting {
            *state = SubscriptionState::Confirmed;
        }
    }

    pub(crate) fn go_live(&self) {
        let mut state = self.state.lock();
        if *state == SubscriptionState::Confirmed {
            *state = SubscriptionState::Live;
        }
    }

    /// First termination wins.
    pub(crate) fn terminate(&self, termination: Termination) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = SubscriptionState::Terminal(termination);
        }
    }
}

/// Receives the lifecycle of a subscription. Every method defaults to a
/// no-op.
///
/// Callbacks run on the transport's delivery thread, in arrival order. They
/// must not block for long; demand is only refilled once they return.
pub trait SubscriptionListener: Send + Sync {
    /// The server acknowledged the subscription.
    fn on_confirmation(&self, _subscription: &Subscription) {}

    fn on_event(&self, _subscription: &Subscription, _event: ResolvedEvent) {}

    fn on_caught_up(&self, _subscription: &Subscription) {}

    fn on_fell_behind(&self, _subscription: &Subscription) {}

    /// The subscription ended abnormally.
    ///
    /// `subscription` is `None` when the failure happened before
    /// confirmation. `error` is `None` when the server cancelled the call.
    fn on_cancelled(&self, _subscription: Option<&Subscription>, _error: Option<&ClientError>) {}
}

/// Receives the checkpoints of a subscription, in arrival order.
pub trait Checkpointer: Send + Sync {
    fn on_checkpoint(&self, subscription: &Subscription, position: Position);
}

struct Inner {
    id: String,
    control: StreamControl,
    state: Arc<StateCell>,
}

/// A confirmed subscription.
///
/// Cheap to clone; every clone refers to the same server-side subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    pub(crate) fn new(id: String, control: StreamControl, state: Arc<StateCell>) -> Self {
        Self {
            inner: Arc::new(Inner { id, control, state }),
        }
    }

    /// Identifier assigned by the server.
    pub fn subscription_id(&self) -> &str {
        &self.inner.id
    }

    /// Cancel the subscription. Idempotent, and the listener is not called
    /// back for it.
    pub fn stop(&self) {
        if self.inner.control.cancel() {
            self.inner.state.terminate(Termination::Cancelled);
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.state.get()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.control.is_completed()
    }

    pub fn flow_state(&self) -> FlowState {
        self.inner.control.flow_state()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_moves_forward_only() {
        let cell = StateCell::new();
        cell.go_live();
        assert_eq!(cell.get(), SubscriptionState::Connecting);

        cell.confirm();
        cell.go_live();
        cell.confirm();
        assert_eq!(cell.get(), SubscriptionState::Live);

        cell.terminate(Termination::Errored);
        cell.terminate(Termination::Completed);
        cell.go_live();
        assert_eq!(
            cell.get(),
            SubscriptionState::Terminal(Termination::Errored)
        );
    }

    #[test]
    fn test_terminal_from_connecting() {
        let cell = StateCell::new();
        cell.terminate(Termination::Cancelled);
        cell.confirm();
        assert!(cell.get().is_terminal());
    }
}
