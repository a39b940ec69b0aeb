//! Transport contracts for server-streaming read calls.
//!
//! The client never encodes or decodes wire messages itself. A [`Channel`]
//! implementation turns a [`ReadRequest`] into a server-streaming call, hands
//! the call handle to the [`ResponseObserver`] before any frame is delivered,
//! and then pushes decoded [`ReadResponse`] frames followed by exactly one
//! terminal event (`on_error` or `on_completed`).
//!
//! Frames are only delivered against credit: the observer disables automatic
//! flow control with an initial grant and issues further grants through
//! [`ClientCall::request`].

pub mod memory;
mod status;

pub use status::{Code, Metadata, Status, LEADER_ENDPOINT_HOST, LEADER_ENDPOINT_PORT};

use crate::error::ClientError;
use crate::types::{Direction, Position, ResolvedEvent, StartPosition, StreamTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Whether a read ends once history is exhausted or keeps following the
/// stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    OneShot { max_count: u64 },
    Subscription,
}

/// Immutable descriptor sent to the server to open a read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub target: StreamTarget,
    pub direction: Direction,
    pub start: StartPosition,
    pub resolve_link_tos: bool,
    pub mode: ReadMode,
}

impl ReadRequest {
    pub fn is_subscription(&self) -> bool {
        matches!(self.mode, ReadMode::Subscription)
    }
}

/// A decoded response frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadResponse {
    StreamNotFound { stream_name: String },
    Event(ResolvedEvent),
    Confirmation { subscription_id: String },
    Checkpoint(Position),
    FirstStreamPosition(u64),
    LastStreamPosition(u64),
    LastAllStreamPosition(Position),
    CaughtUp,
    FellBehind,
    /// A frame whose variant the decoder did not recognise.
    Unknown,
}

/// A network channel able to open read calls.
pub trait Channel: Send + Sync {
    /// Open a server-streaming read. Must call `observer.before_start`
    /// before delivering any frame, and must return without delivering
    /// frames on the calling thread.
    fn read(&self, request: ReadRequest, observer: Arc<dyn ResponseObserver>);
}

/// Client-side handle of an in-flight call.
pub trait ClientCall: Send + Sync {
    /// Switch to manual flow control, granting `count` credits up front.
    fn disable_auto_request_with_initial(&self, count: usize);

    /// Grant `count` more credits.
    fn request(&self, count: usize);

    /// Cancel the call. The transport reports a `Cancelled` status
    /// afterwards.
    fn cancel(&self, reason: &str, cause: Option<&ClientError>);
}

/// Receives the events of one call.
pub trait ResponseObserver: Send + Sync {
    fn before_start(&self, call: Arc<dyn ClientCall>);

    fn on_next(&self, frame: ReadResponse);

    fn on_error(&self, error: ClientError);

    fn on_completed(&self);
}
