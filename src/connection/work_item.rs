//! Work items and the connection facts handed to them.

use super::mailbox::{Mailbox, Msg};
use crate::error::Result;
use crate::transport::Channel;
use crate::types::{Endpoint, ServerVersion};
use std::fmt;
use std::sync::Arc;

/// Identifier of a channel created by the supervisor. Increases with every
/// recreation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Continuation run with the connection facts, or the reason they could not
/// be obtained. Invoked exactly once.
pub type WorkItem = Box<dyn FnOnce(Result<WorkItemArgs>) + Send + 'static>;

/// Reports a newly observed leader back to the supervisor.
#[derive(Clone)]
pub struct LeaderReporter {
    mailbox: Mailbox,
    channel: ChannelId,
}

impl LeaderReporter {
    pub(crate) fn new(mailbox: Mailbox, channel: ChannelId) -> Self {
        Self { mailbox, channel }
    }

    /// Ask for the channel to be recreated towards `leader`. Ignored if the
    /// channel has already been replaced.
    pub fn report(&self, leader: Endpoint) {
        self.mailbox.push(Msg::CreateChannel {
            previous: Some(self.channel),
            preferred: Some(leader),
        });
    }
}

/// Snapshot of the current connection. Valid until the supervisor replaces
/// the channel; re-acquire after a failure instead of reusing it.
#[derive(Clone)]
pub struct WorkItemArgs {
    id: ChannelId,
    channel: Arc<dyn Channel>,
    server_version: Option<ServerVersion>,
    reporter: LeaderReporter,
}

impl WorkItemArgs {
    pub(crate) fn new(
        id: ChannelId,
        channel: Arc<dyn Channel>,
        server_version: Option<ServerVersion>,
        reporter: LeaderReporter,
    ) -> Self {
        Self {
            id,
            channel,
            server_version,
            reporter,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn server_version(&self) -> Option<ServerVersion> {
        self.server_version
    }

    pub fn report_new_leader(&self, leader: Endpoint) {
        self.reporter.report(leader);
    }
}

impl fmt::Debug for WorkItemArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemArgs")
            .field("id", &self.id)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}
