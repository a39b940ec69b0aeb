//! # Tributary
//!
//! Client-side streaming core for an event-store database: flow-controlled
//! reads and live subscriptions over server-streaming calls, behind a
//! supervisor that serializes access to a single connection and follows
//! leader changes.
//!
//! ## Core Concepts
//!
//! - **Supervisor**: one mailbox worker owns the active channel; callers get
//!   immutable snapshots of it and report leader changes back
//! - **Flow control**: every call receives a batch of credits up front and
//!   refills them as frames are consumed or demand is signalled
//! - **Reads**: finite, blocking sequences of events and stream positions,
//!   buffered ahead of the caller as the transport delivers them
//! - **Subscriptions**: confirmed, long-lived pushes of events, checkpoints
//!   and catch-up notifications
//!
//! ## Example
//!
//! ```ignore
//! use tributary::{ReadOptions, StreamClient};
//!
//! let client = StreamClient::with_defaults(provider)?;
//!
//! // Read a stream from the start
//! for message in client.read_stream("orders-42", ReadOptions::default()) {
//!     println!("{:?}", message?);
//! }
//!
//! // Follow it live through a bounded queue
//! let (subscription, events) =
//!     client.subscribe_to_stream_channel("orders-42", Default::default());
//! let subscription = subscription.wait()?;
//! while let Ok(event) = events.recv() {
//!     println!("{event:?}");
//! }
//! subscription.stop();
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod future;
pub mod options;
pub mod read;
pub mod settings;
pub mod streaming;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use client::StreamClient;
pub use connection::{
    ChannelId, Connection, ConnectionProvider, ConnectionSupervisor, LeaderReporter, WorkItemArgs,
};
pub use error::{ClientError, Result};
pub use future::{ResultFuture, ResultSender};
pub use options::{BackPressure, ReadOptions, SubscribeOptions};
pub use read::ReadStream;
pub use settings::ClientSettings;
pub use streaming::{FlowState, ReadResponseObserver, StreamConsumer, StreamControl};
pub use subscriptions::{
    channel_listener, ChannelListener, Checkpointer, DropReason, Subscription, SubscriptionEvent,
    SubscriptionListener, SubscriptionReceiver, SubscriptionState, Termination,
};
pub use transport::{Code, ReadRequest, ReadResponse, Status};
pub use types::{
    Direction, Endpoint, Position, ReadMessage, RecordedEvent, ResolvedEvent, ServerVersion,
    StartPosition, StreamTarget, ALL_STREAM,
};
