//! Transport-level call status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trailer naming the host of the current leader node.
pub const LEADER_ENDPOINT_HOST: &str = "leader-endpoint-host";

/// Trailer naming the port (decimal) of the current leader node.
pub const LEADER_ENDPOINT_PORT: &str = "leader-endpoint-port";

/// Status code of a finished call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unavailable,
    Internal,
    Unauthenticated,
}

/// String-valued trailers attached to a status.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Terminal status reported by the transport for a failed call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    code: Code,
    message: String,
    metadata: Metadata,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// A "not leader" status carrying redirect trailers.
    pub fn not_leader(host: &str, port: u16) -> Self {
        Self::new(Code::NotFound, "leader info available")
            .with_trailer(LEADER_ENDPOINT_HOST, host)
            .with_trailer(LEADER_ENDPOINT_PORT, port.to_string())
    }

    pub fn with_trailer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
