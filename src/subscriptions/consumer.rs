//! Consumer driving a subscription's lifecycle.

use super::types::{Checkpointer, StateCell, Subscription, SubscriptionListener, Termination};
use crate::error::ClientError;
use crate::future::ResultSender;
use crate::streaming::{StreamConsumer, StreamControl};
use crate::types::{Position, ResolvedEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps frames of a subscription call onto a [`SubscriptionListener`] and
/// resolves the pending subscription future on confirmation.
pub struct SubscriptionStreamConsumer {
    listener: Arc<dyn SubscriptionListener>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    /// Taken on confirmation or termination, whichever comes first.
    resolver: Mutex<Option<ResultSender<Subscription>>>,
    control: Mutex<Option<StreamControl>>,
    subscription: Mutex<Option<Subscription>>,
    state: Arc<StateCell>,
}

impl SubscriptionStreamConsumer {
    pub(crate) fn new(
        listener: Arc<dyn SubscriptionListener>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        resolver: ResultSender<Subscription>,
    ) -> Self {
        Self {
            listener,
            checkpointer,
            resolver: Mutex::new(Some(resolver)),
            control: Mutex::new(None),
            subscription: Mutex::new(None),
            state: Arc::new(StateCell::new()),
        }
    }

    fn confirmed(&self) -> Option<Subscription> {
        self.subscription.lock().clone()
    }

    fn resolve(&self, result: Result<Subscription, ClientError>) {
        let resolver = self.resolver.lock().take();
        if let Some(resolver) = resolver {
            resolver.send(result);
        }
    }

    fn terminate(&self, termination: Termination, error: Option<ClientError>) {
        self.state.terminate(termination);

        let subscription = self.confirmed();
        self.listener
            .on_cancelled(subscription.as_ref(), error.as_ref());
        self.resolve(Err(error.unwrap_or(ClientError::SubscriptionDropped)));
    }
}

impl StreamConsumer for SubscriptionStreamConsumer {
    fn on_subscribe(&self, control: StreamControl) {
        *self.control.lock() = Some(control);
    }

    fn on_subscription_confirmation(&self, subscription_id: String) {
        let Some(control) = self.control.lock().clone() else {
            warn!(subscription_id, "confirmation arrived before the call started");
            return;
        };

        let subscription = {
            let mut slot = self.subscription.lock();
            if slot.is_some() {
                warn!(subscription_id, "duplicate subscription confirmation ignored");
                return;
            }
            let subscription = Subscription::new(subscription_id, control, Arc::clone(&self.state));
            *slot = Some(subscription.clone());
            subscription
        };

        debug!(id = subscription.subscription_id(), "subscription confirmed");
        self.state.confirm();
        self.listener.on_confirmation(&subscription);
        self.resolve(Ok(subscription));
    }

    fn on_event(&self, event: ResolvedEvent) {
        match self.confirmed() {
            Some(subscription) => {
                self.state.go_live();
                self.listener.on_event(&subscription, event);
            }
            None => warn!("event received before confirmation, dropped"),
        }
    }

    fn on_checkpoint(&self, position: Position) {
        let Some(checkpointer) = &self.checkpointer else {
            return;
        };
        match self.confirmed() {
            Some(subscription) => checkpointer.on_checkpoint(&subscription, position),
            None => warn!(?position, "checkpoint received before confirmation, dropped"),
        }
    }

    fn on_caught_up(&self) {
        if let Some(subscription) = self.confirmed() {
            self.listener.on_caught_up(&subscription);
        }
    }

    fn on_fell_behind(&self) {
        if let Some(subscription) = self.confirmed() {
            self.listener.on_fell_behind(&subscription);
        }
    }

    fn on_stream_not_found(&self, stream_name: String) {
        self.terminate(
            Termination::Errored,
            Some(ClientError::StreamNotFound { stream_name }),
        );
    }

    fn on_cancelled(&self, error: Option<ClientError>) {
        let termination = match error {
            Some(_) => Termination::Errored,
            None => Termination::Cancelled,
        };
        self.terminate(termination, error);
    }

    fn on_complete(&self) {
        self.state.terminate(Termination::Completed);
        debug!("subscription completed by the server");
        self.resolve(Err(ClientError::SubscriptionDropped));
    }
}
