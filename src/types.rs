//! Core types shared by reads and subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the virtual stream holding every event in the store.
pub const ALL_STREAM: &str = "$all";

/// Position of an event in the global log.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub commit: u64,
    pub prepare: u64,
}

impl Position {
    pub fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position(C:{}, P:{})", self.commit, self.prepare)
    }
}

/// Network address of a cluster node.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({}:{})", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Version reported by the server at channel creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Which stream a read or subscription targets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamTarget {
    Stream(String),
    All,
}

impl StreamTarget {
    pub fn name(&self) -> &str {
        match self {
            StreamTarget::Stream(name) => name,
            StreamTarget::All => ALL_STREAM,
        }
    }
}

/// Read direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Forwards,
    Backwards,
}

/// Where a read or subscription starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StartPosition {
    #[default]
    Start,
    End,
    /// Stream revision (named streams only).
    Revision(u64),
    /// Global log position (`$all` only).
    Position(Position),
}

/// An event as written to a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordedEvent {
    pub stream_id: String,
    pub revision: u64,
    pub event_id: String,
    pub event_type: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub position: Position,
    /// Microseconds since Unix epoch.
    pub created: i64,
}

/// An event together with the link that pointed to it, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub event: Option<RecordedEvent>,
    pub link: Option<RecordedEvent>,
    pub commit_position: Option<u64>,
}

impl ResolvedEvent {
    /// An event that was read directly (no link resolution involved).
    pub fn from_event(event: RecordedEvent) -> Self {
        let commit_position = Some(event.position.commit);
        Self {
            event: Some(event),
            link: None,
            commit_position,
        }
    }

    /// The event as it was read from the stream: the link if one was
    /// followed, otherwise the event itself.
    pub fn original_event(&self) -> Option<&RecordedEvent> {
        self.link.as_ref().or(self.event.as_ref())
    }
}

/// Item produced by a one-shot read.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadMessage {
    Event(ResolvedEvent),
    FirstStreamPosition(u64),
    LastStreamPosition(u64),
    LastAllPosition(Position),
}

impl ReadMessage {
    pub fn event(&self) -> Option<&ResolvedEvent> {
        match self {
            ReadMessage::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<ResolvedEvent> {
        match self {
            ReadMessage::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn first_stream_position(&self) -> Option<u64> {
        match self {
            ReadMessage::FirstStreamPosition(revision) => Some(*revision),
            _ => None,
        }
    }

    pub fn last_stream_position(&self) -> Option<u64> {
        match self {
            ReadMessage::LastStreamPosition(revision) => Some(*revision),
            _ => None,
        }
    }

    pub fn last_all_position(&self) -> Option<Position> {
        match self {
            ReadMessage::LastAllPosition(position) => Some(*position),
            _ => None,
        }
    }
}
