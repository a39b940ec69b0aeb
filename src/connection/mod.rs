//! Connection supervision and leader redirection.
//!
//! The [`ConnectionSupervisor`] owns at most one channel at a time and
//! applies commands (acquire, create channel, shutdown) strictly in arrival
//! order on a single worker. Establishing a channel is delegated to a
//! [`ConnectionProvider`].

mod mailbox;
pub mod redirect;
mod supervisor;
mod work_item;

pub use redirect::Redirect;
pub use supervisor::{ConnectionSupervisor, DEFAULT_WORKER_NAME};
pub use work_item::{ChannelId, LeaderReporter, WorkItem, WorkItemArgs};

use crate::error::Result;
use crate::transport::Channel;
use crate::types::{Endpoint, ServerVersion};
use std::sync::Arc;

/// A freshly established channel.
#[derive(Clone)]
pub struct Connection {
    pub channel: Arc<dyn Channel>,
    pub server_version: Option<ServerVersion>,
}

/// Establishes channels on behalf of the supervisor.
///
/// Only ever called from the supervisor worker, one call at a time.
pub trait ConnectionProvider: Send + Sync {
    /// Create a new channel, towards `preferred_leader` if given, otherwise
    /// to whichever node discovery selects.
    fn connect(&self, preferred_leader: Option<&Endpoint>) -> Result<Connection>;

    /// Release every resource. Must be idempotent.
    fn shutdown(&self);
}
