//! Error types for the streaming client.

use crate::transport::Status;
use crate::types::Endpoint;
use thiserror::Error;

/// Main error type for client operations.
///
/// Errors are `Clone` because a single terminal failure can be observed by
/// both a subscription listener and the caller awaiting confirmation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ClientError {
    #[error("Stream not found: {stream_name}")]
    StreamNotFound { stream_name: String },

    #[error("Connection is shut down")]
    ConnectionShutdown,

    #[error("Not leader, leader is at {leader}")]
    NotLeader { leader: Endpoint },

    #[error("Transport error: {0}")]
    Transport(Status),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Non-positive subscription request: {0}")]
    InvalidDemand(u64),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Subscription ended before it was confirmed")]
    SubscriptionDropped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True if this is a transport status with the given code.
    pub fn is_status(&self, code: crate::transport::Code) -> bool {
        matches!(self, ClientError::Transport(status) if status.code() == code)
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Transport(status)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
