//! Consumer side of a streaming read.

use super::StreamControl;
use crate::error::ClientError;
use crate::types::{Position, ResolvedEvent};

/// Receives the demultiplexed frames of one streaming call.
///
/// Exactly one of `on_cancelled`, `on_stream_not_found` or `on_complete` is
/// invoked per call, and nothing is invoked after it.
pub trait StreamConsumer: Send + Sync {
    /// The call is established; `control` grants demand and cancels.
    fn on_subscribe(&self, _control: StreamControl) {}

    fn on_event(&self, event: ResolvedEvent);

    fn on_subscription_confirmation(&self, _subscription_id: String) {}

    fn on_checkpoint(&self, _position: Position) {}

    fn on_stream_not_found(&self, stream_name: String);

    fn on_first_stream_position(&self, _revision: u64) {}

    fn on_last_stream_position(&self, _revision: u64) {}

    fn on_last_all_stream_position(&self, _position: Position) {}

    fn on_caught_up(&self) {}

    fn on_fell_behind(&self) {}

    /// The call failed. `None` means the transport reported a cancellation
    /// that was not requested locally.
    fn on_cancelled(&self, error: Option<ClientError>);

    fn on_complete(&self);
}
