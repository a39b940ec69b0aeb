//! Client facade: reads, subscriptions and connection lifecycle.

use crate::connection::{ConnectionProvider, ConnectionSupervisor};
use crate::error::{ClientError, Result};
use crate::future::{self, ResultFuture};
use crate::options::{validate_start, BackPressure, ReadOptions, SubscribeOptions};
use crate::read::ReadStream;
use crate::settings::ClientSettings;
use crate::streaming::ReadResponseObserver;
use crate::subscriptions::{
    channel_listener, Checkpointer, Subscription, SubscriptionListener, SubscriptionReceiver,
    SubscriptionStreamConsumer,
};
use crate::transport::{ReadMode, ReadRequest};
use crate::types::{Direction, ServerVersion, StartPosition, StreamTarget};
use std::sync::Arc;
use tracing::debug;

fn subscription_dropped() -> Result<Subscription> {
    Err(ClientError::SubscriptionDropped)
}

/// Entry point for reading and subscribing.
///
/// Every call goes through one [`ConnectionSupervisor`]; the first call
/// connects lazily. Dropping the client shuts the supervisor down.
pub struct StreamClient {
    supervisor: ConnectionSupervisor,
    settings: ClientSettings,
}

impl StreamClient {
    pub fn new(provider: Arc<dyn ConnectionProvider>, settings: ClientSettings) -> Result<Self> {
        settings.validate()?;
        let supervisor = ConnectionSupervisor::with_worker_name(provider, &settings.worker_thread_name)?;
        Ok(Self {
            supervisor,
            settings,
        })
    }

    pub fn with_defaults(provider: Arc<dyn ConnectionProvider>) -> Result<Self> {
        Self::new(provider, ClientSettings::default())
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Read a named stream.
    pub fn read_stream(&self, stream_name: &str, options: ReadOptions) -> ReadStream {
        self.read(StreamTarget::Stream(stream_name.to_string()), options)
    }

    /// Read the global `$all` stream.
    pub fn read_all(&self, options: ReadOptions) -> ReadStream {
        self.read(StreamTarget::All, options)
    }

    fn read(&self, target: StreamTarget, options: ReadOptions) -> ReadStream {
        let back_pressure = match self.prepare(&target, options.start, options.back_pressure) {
            Ok(back_pressure) => back_pressure,
            Err(error) => return ReadStream::failed(error),
        };

        let request = ReadRequest {
            target,
            direction: options.direction,
            start: options.start,
            resolve_link_tos: options.resolve_link_tos,
            mode: ReadMode::OneShot {
                max_count: options.max_count,
            },
        };
        debug!(stream = request.target.name(), "starting read");
        ReadStream::open(&self.supervisor, request, back_pressure)
    }

    /// Subscribe to a named stream. Resolves once the server confirms the
    /// subscription, or fails with the error that ended it first.
    pub fn subscribe_to_stream(
        &self,
        stream_name: &str,
        listener: Arc<dyn SubscriptionListener>,
        options: SubscribeOptions,
    ) -> ResultFuture<Subscription> {
        self.subscribe(StreamTarget::Stream(stream_name.to_string()), listener, options)
    }

    /// Subscribe to the global `$all` stream.
    pub fn subscribe_to_all(
        &self,
        listener: Arc<dyn SubscriptionListener>,
        options: SubscribeOptions,
    ) -> ResultFuture<Subscription> {
        self.subscribe(StreamTarget::All, listener, options)
    }

    /// Subscribe to a named stream through a bounded queue of
    /// `settings.subscription_buffer` events.
    ///
    /// Checkpoints are queued with the events unless `options` already
    /// carries a checkpointer.
    pub fn subscribe_to_stream_channel(
        &self,
        stream_name: &str,
        options: SubscribeOptions,
    ) -> (ResultFuture<Subscription>, SubscriptionReceiver) {
        self.subscribe_channel(StreamTarget::Stream(stream_name.to_string()), options)
    }

    pub fn subscribe_to_all_channel(
        &self,
        options: SubscribeOptions,
    ) -> (ResultFuture<Subscription>, SubscriptionReceiver) {
        self.subscribe_channel(StreamTarget::All, options)
    }

    fn subscribe_channel(
        &self,
        target: StreamTarget,
        mut options: SubscribeOptions,
    ) -> (ResultFuture<Subscription>, SubscriptionReceiver) {
        let (listener, receiver) = channel_listener(self.settings.subscription_buffer);
        let listener = Arc::new(listener);
        if options.checkpointer.is_none() {
            options.checkpointer = Some(Arc::clone(&listener) as Arc<dyn Checkpointer>);
        }
        (self.subscribe(target, listener, options), receiver)
    }

    fn subscribe(
        &self,
        target: StreamTarget,
        listener: Arc<dyn SubscriptionListener>,
        options: SubscribeOptions,
    ) -> ResultFuture<Subscription> {
        let back_pressure = match self.prepare(&target, options.start, options.back_pressure) {
            Ok(back_pressure) => back_pressure,
            Err(error) => return ResultFuture::ready(Err(error), subscription_dropped),
        };

        let request = ReadRequest {
            target,
            direction: Direction::Forwards,
            start: options.start,
            resolve_link_tos: options.resolve_link_tos,
            mode: ReadMode::Subscription,
        };
        debug!(stream = request.target.name(), "starting subscription");

        let (sender, future) = future::channel(subscription_dropped);
        let consumer = SubscriptionStreamConsumer::new(listener, options.checkpointer, sender);
        Arc::new(ReadResponseObserver::new(back_pressure, consumer)).start(&self.supervisor, request);
        future
    }

    /// Resolve the per-call credit window and validate the call before it
    /// reaches the supervisor.
    fn prepare(
        &self,
        target: &StreamTarget,
        start: StartPosition,
        back_pressure: Option<BackPressure>,
    ) -> Result<BackPressure> {
        let back_pressure = back_pressure.unwrap_or(self.settings.back_pressure);
        back_pressure.validate()?;
        validate_start(target, start)?;
        Ok(back_pressure)
    }

    /// Version reported by the server behind the current channel.
    pub async fn server_version(&self) -> Result<Option<ServerVersion>> {
        self.supervisor.server_version().await
    }

    /// Shut the connection down. Reads and subscriptions started afterwards
    /// fail with `ConnectionShutdown`.
    pub fn shutdown(&self) -> ResultFuture<()> {
        self.supervisor.shutdown()
    }

    pub fn is_shutdown(&self) -> bool {
        self.supervisor.is_shutdown()
    }
}
