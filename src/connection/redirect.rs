//! Classification of failed operations for leader redirection.

use crate::error::ClientError;
use crate::transport::{Code, Metadata, LEADER_ENDPOINT_HOST, LEADER_ENDPOINT_PORT};
use crate::types::Endpoint;
use tracing::warn;

/// What the supervisor should do about a failed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// The node is not the leader; reconnect to the given one.
    Leader(Endpoint),
    /// The node is unreachable; reconnect without a preference.
    Rediscover,
    /// Nothing to do.
    None,
}

/// Read the leader endpoint out of redirect trailers. Both trailers must be
/// present and the port must be a valid decimal port number.
pub fn leader_from_trailers(metadata: &Metadata) -> Option<Endpoint> {
    let host = metadata.get(LEADER_ENDPOINT_HOST)?;
    let port = metadata.get(LEADER_ENDPOINT_PORT)?;

    match port.parse::<u16>() {
        Ok(port) => Some(Endpoint::new(host, port)),
        Err(_) => {
            warn!(host, port, "ignoring leader redirect with an invalid port");
            None
        }
    }
}

/// Leader endpoint carried by an error, either already typed or still in
/// transport trailers.
pub fn leader_from_error(error: &ClientError) -> Option<Endpoint> {
    match error {
        ClientError::NotLeader { leader } => Some(leader.clone()),
        ClientError::Transport(status) => leader_from_trailers(status.metadata()),
        _ => None,
    }
}

/// Decide whether a failed operation calls for a new channel.
pub fn classify(error: &ClientError) -> Redirect {
    if let Some(leader) = leader_from_error(error) {
        return Redirect::Leader(leader);
    }
    if error.is_status(Code::Unavailable) {
        return Redirect::Rediscover;
    }
    Redirect::None
}
