//! The connection supervisor.
//!
//! All channel mutations go through a single mailbox drained by one worker
//! thread, so concurrent callers never race to create channels. Callers get
//! immutable [`WorkItemArgs`] snapshots of the current channel.

use super::mailbox::{self, shutdown_fallback, Mailbox, Msg, RunWorkItem};
use super::redirect::{self, Redirect};
use super::work_item::{ChannelId, LeaderReporter, WorkItemArgs};
use super::{Connection, ConnectionProvider};
use crate::error::{ClientError, Result};
use crate::future::{self, ResultFuture, ResultSender};
use crate::transport::Channel;
use crate::types::{Endpoint, ServerVersion};
use crossbeam_channel::{unbounded, Receiver};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Default name of the mailbox worker thread.
pub const DEFAULT_WORKER_NAME: &str = "tributary-supervisor";

struct Current {
    id: ChannelId,
    connection: Connection,
}

/// Mailbox consumer. Owns the current channel.
struct Worker {
    provider: Arc<dyn ConnectionProvider>,
    mailbox: Mailbox,
    receiver: Receiver<Msg>,
    current: Option<Current>,
    next_channel: u64,
}

impl Worker {
    fn run(mut self) {
        while let Ok(msg) = self.receiver.recv() {
            match msg {
                Msg::RunWorkItem(item) => self.process_work_item(item),
                Msg::CreateChannel {
                    previous,
                    preferred,
                } => self.process_create_channel(previous, preferred),
                Msg::Shutdown(ack) => {
                    self.process_shutdown(ack);
                    return;
                }
            }
        }
    }

    fn process_work_item(&mut self, item: RunWorkItem) {
        if self.current.is_none() {
            if let Err(error) = self.connect(None) {
                warn!(%error, "failed to create channel");
                item.report_error(error);
                return;
            }
        }

        match self.args() {
            Some(args) => item.complete(args),
            None => item.report_error(ClientError::Connection("no channel available".into())),
        }
    }

    fn process_create_channel(&mut self, previous: Option<ChannelId>, preferred: Option<Endpoint>) {
        if let (Some(previous), Some(current)) = (previous, &self.current) {
            if current.id != previous {
                debug!(
                    %previous,
                    current = %current.id,
                    "skipping channel recreation, channel already replaced"
                );
                return;
            }
        }

        if let Err(error) = self.connect(preferred.as_ref()) {
            warn!(%error, ?preferred, "failed to recreate channel");
        }
    }

    fn process_shutdown(&mut self, ack: Option<ResultSender<()>>) {
        for msg in self.mailbox.close(&self.receiver) {
            mailbox::reject(msg);
        }
        self.current = None;
        self.provider.shutdown();
        debug!("connection supervisor shut down");
        mailbox::acknowledge(ack);
    }

    /// Replace the current channel. The old one is dropped first.
    fn connect(&mut self, preferred: Option<&Endpoint>) -> Result<()> {
        self.current = None;
        let connection = self.provider.connect(preferred)?;

        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        debug!(channel = %id, ?preferred, version = ?connection.server_version, "channel created");
        self.current = Some(Current { id, connection });
        Ok(())
    }

    fn args(&self) -> Option<WorkItemArgs> {
        self.current.as_ref().map(|current| {
            WorkItemArgs::new(
                current.id,
                Arc::clone(&current.connection.channel),
                current.connection.server_version,
                LeaderReporter::new(self.mailbox.clone(), current.id),
            )
        })
    }
}

/// Serializes access to the active channel.
pub struct ConnectionSupervisor {
    mailbox: Mailbox,
    next_item: AtomicU64,
}

impl ConnectionSupervisor {
    /// Start a supervisor with its worker thread.
    pub fn start(provider: Arc<dyn ConnectionProvider>) -> Result<Self> {
        Self::with_worker_name(provider, DEFAULT_WORKER_NAME)
    }

    pub fn with_worker_name(provider: Arc<dyn ConnectionProvider>, name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let mailbox = Mailbox::new(sender);

        let worker = Worker {
            provider,
            mailbox: mailbox.clone(),
            receiver,
            current: None,
            next_channel: 0,
        };

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker.run())
            .map_err(|e| ClientError::Connection(format!("failed to start supervisor: {e}")))?;

        Ok(Self {
            mailbox,
            next_item: AtomicU64::new(1),
        })
    }

    pub fn is_shutdown(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Queue a work item. It runs on the worker once every earlier command
    /// has been applied, or fails with `ConnectionShutdown`.
    pub fn submit<F>(&self, item: F)
    where
        F: FnOnce(Result<WorkItemArgs>) + Send + 'static,
    {
        let id = self.next_item.fetch_add(1, Ordering::Relaxed);
        self.mailbox
            .push(Msg::RunWorkItem(RunWorkItem::new(id, Box::new(item))));
    }

    /// Resolve the current connection facts.
    pub fn acquire_args(&self) -> ResultFuture<WorkItemArgs> {
        if self.is_shutdown() {
            return ResultFuture::ready(
                Err(ClientError::ConnectionShutdown),
                shutdown_fallback::<WorkItemArgs>,
            );
        }

        let (sender, future) = future::channel(shutdown_fallback::<WorkItemArgs>);
        self.submit(move |result| {
            sender.send(result);
        });
        future
    }

    /// Run `action` against the current channel. See [`Self::run_with_args`].
    pub async fn run<A, F, Fut>(&self, action: F) -> Result<A>
    where
        F: FnOnce(Arc<dyn Channel>) -> Fut,
        Fut: Future<Output = Result<A>>,
    {
        self.run_with_args(|args| action(Arc::clone(args.channel())))
            .await
    }

    /// Run `action` against the current connection facts.
    ///
    /// A failure that names a new leader or reports the node unavailable
    /// queues a channel recreation. The failure itself is returned unchanged
    /// and the action is not retried.
    pub async fn run_with_args<A, F, Fut>(&self, action: F) -> Result<A>
    where
        F: FnOnce(WorkItemArgs) -> Fut,
        Fut: Future<Output = Result<A>>,
    {
        let args = self.acquire_args().await?;
        let channel = args.id();

        let outcome = action(args).await;
        if let Err(error) = &outcome {
            self.redirect(channel, error);
            debug!(%channel, %error, "work item completed exceptionally");
        }
        outcome
    }

    /// Version reported by the server behind the current channel.
    pub async fn server_version(&self) -> Result<Option<ServerVersion>> {
        self.run_with_args(|args| async move { Ok(args.server_version()) })
            .await
    }

    /// Ask for a new channel, optionally towards a known leader.
    pub fn recreate_channel(&self, preferred: Option<Endpoint>) {
        self.mailbox.push(Msg::CreateChannel {
            previous: None,
            preferred,
        });
    }

    /// Shut the supervisor down. Work queued before this is answered; work
    /// submitted after the acknowledgement fails immediately.
    pub fn shutdown(&self) -> ResultFuture<()> {
        let (sender, future) = future::channel(|| Ok(()));
        self.mailbox.push(Msg::Shutdown(Some(sender)));
        future
    }

    fn redirect(&self, channel: ChannelId, error: &ClientError) {
        let preferred = match redirect::classify(error) {
            Redirect::Leader(leader) => Some(leader),
            Redirect::Rediscover => None,
            Redirect::None => return,
        };
        self.mailbox.push(Msg::CreateChannel {
            previous: Some(channel),
            preferred,
        });
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if !self.mailbox.is_closed() {
            self.mailbox.push(Msg::Shutdown(None));
        }
    }
}
