//! Flow-controlled streaming reads.
//!
//! A [`ReadResponseObserver`] drives one server-streaming call. It turns the
//! demand of its [`StreamConsumer`] into credit grants on the transport:
//!
//! - the call starts with a full batch of credit;
//! - every delivered frame consumes one credit;
//! - after every frame, explicit demand is honoured up to the number of
//!   consumed credits, and without demand the window is refilled once the
//!   consumed share reaches the threshold.
//!
//! Termination is single-fire: local cancellation, a transport error and
//! completion race for the same flag and only the winner notifies the
//! consumer.

mod consumer;
mod observer;

pub use consumer::StreamConsumer;
pub use observer::{FlowState, ReadResponseObserver, StreamControl};
