//! Shared fixtures for integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tributary::transport::memory::{MemoryChannel, MemoryProvider, Step};
use tributary::{
    ClientError, ClientSettings, Position, ReadResponse, RecordedEvent, ResolvedEvent,
    StreamClient, Subscription, SubscriptionListener,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn recorded(stream: &str, revision: u64) -> RecordedEvent {
    RecordedEvent {
        stream_id: stream.to_string(),
        revision,
        event_id: format!("{stream}-{revision}"),
        event_type: "OrderPlaced".to_string(),
        content_type: "application/json".to_string(),
        data: format!(r#"{{"revision":{revision}}}"#).into_bytes(),
        metadata: Vec::new(),
        position: Position::new(revision * 100, revision * 100),
        created: 1_700_000_000_000_000 + revision as i64,
    }
}

pub fn event(stream: &str, revision: u64) -> Step {
    Step::Frame(ReadResponse::Event(ResolvedEvent::from_event(recorded(
        stream, revision,
    ))))
}

pub fn events(stream: &str, count: u64) -> Vec<Step> {
    (0..count).map(|revision| event(stream, revision)).collect()
}

pub fn confirmation(id: &str) -> Step {
    Step::Frame(ReadResponse::Confirmation {
        subscription_id: id.to_string(),
    })
}

pub fn checkpoint(commit: u64) -> Step {
    Step::Frame(ReadResponse::Checkpoint(Position::new(commit, commit)))
}

pub struct Fixture {
    pub channel: Arc<MemoryChannel>,
    pub provider: Arc<MemoryProvider>,
    pub client: StreamClient,
}

pub fn fixture(channel: MemoryChannel) -> Fixture {
    fixture_with(channel, ClientSettings::default())
}

pub fn fixture_with(channel: MemoryChannel, settings: ClientSettings) -> Fixture {
    init_tracing();
    let channel = Arc::new(channel);
    let provider = Arc::new(MemoryProvider::new(Arc::clone(&channel)));
    let client = StreamClient::new(Arc::clone(&provider) as _, settings).unwrap();
    Fixture {
        channel,
        provider,
        client,
    }
}

/// Listener logging every callback as a line on a channel.
pub struct Recorder {
    sender: Sender<String>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<String>) {
        let (sender, receiver) = unbounded();
        (Arc::new(Self { sender }), receiver)
    }

    fn log(&self, line: String) {
        let _ = self.sender.send(line);
    }
}

impl SubscriptionListener for Recorder {
    fn on_confirmation(&self, subscription: &Subscription) {
        self.log(format!("confirmed {}", subscription.subscription_id()));
    }

    fn on_event(&self, _subscription: &Subscription, event: ResolvedEvent) {
        let event = event.original_event().unwrap();
        self.log(format!("event {}@{}", event.stream_id, event.revision));
    }

    fn on_caught_up(&self, _subscription: &Subscription) {
        self.log("caught up".to_string());
    }

    fn on_fell_behind(&self, _subscription: &Subscription) {
        self.log("fell behind".to_string());
    }

    fn on_cancelled(&self, subscription: Option<&Subscription>, error: Option<&ClientError>) {
        self.log(format!(
            "cancelled confirmed={} error={:?}",
            subscription.is_some(),
            error
        ));
    }
}

impl tributary::Checkpointer for Recorder {
    fn on_checkpoint(&self, _subscription: &Subscription, position: Position) {
        self.log(format!("checkpoint {}", position.commit));
    }
}

/// Receive exactly `count` lines.
pub fn expect_lines(receiver: &Receiver<String>, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| receiver.recv_timeout(TIMEOUT).expect("listener callback"))
        .collect()
}

/// Client over an existing provider, with default settings.
pub fn client_for(provider: &Arc<MemoryProvider>) -> StreamClient {
    init_tracing();
    StreamClient::with_defaults(Arc::clone(provider) as _).unwrap()
}
