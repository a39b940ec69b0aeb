//! Live subscriptions.
//!
//! A subscription is a streaming read that never completes on its own. The
//! server first confirms it, then pushes events, checkpoints and catch-up
//! notifications until either side cancels:
//! - [`SubscriptionListener`] receives the lifecycle as callbacks
//! - [`Checkpointer`] receives checkpoints, when one is configured
//! - [`ChannelListener`] queues both onto a bounded channel instead

mod channel;
mod consumer;
mod types;

pub use channel::{
    channel_listener, ChannelListener, DropReason, SubscriptionEvent, SubscriptionReceiver,
    DEFAULT_BUFFER_SIZE,
};
pub use consumer::SubscriptionStreamConsumer;
pub use types::{Checkpointer, Subscription, SubscriptionListener, SubscriptionState, Termination};
