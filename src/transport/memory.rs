//! In-process transport serving scripted streams.
//!
//! [`MemoryChannel`] answers reads from per-stream scripts and honours the
//! credit protocol: frames are only delivered while the call has credit,
//! terminal steps are delivered as soon as they are reached.
//!
//! Opening a call never delivers anything: the initial frames go out on a
//! delivery thread owned by the call, so the caller of [`Channel::read`] is
//! free again immediately. Afterwards, whichever thread grants credit or
//! pushes a step drives delivery while no other thread is. Tests that need
//! synchronous pushes wait for [`MemoryCall::wait_idle`] first.

use super::{Channel, ClientCall, ReadMode, ReadRequest, ReadResponse, ResponseObserver, Status};
use crate::connection::{Connection, ConnectionProvider};
use crate::error::{ClientError, Result};
use crate::types::{Endpoint, ServerVersion, StreamTarget};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// One scripted step of a call.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Frame(ReadResponse),
    Fail(Status),
    Complete,
}

/// A channel backed by in-memory scripts.
#[derive(Default)]
pub struct MemoryChannel {
    streams: RwLock<HashMap<String, Vec<Step>>>,
    calls: Mutex<Vec<Arc<MemoryCall>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryChannel::set_stream`].
    pub fn with_stream(self, name: impl Into<String>, steps: Vec<Step>) -> Self {
        self.set_stream(name, steps);
        self
    }

    /// Script the steps served for reads of `name` (`"$all"` for the global
    /// log). Unscripted streams are answered with a not-found frame.
    pub fn set_stream(&self, name: impl Into<String>, steps: Vec<Step>) {
        self.streams.write().insert(name.into(), steps);
    }

    /// All calls opened on this channel, oldest first.
    pub fn calls(&self) -> Vec<Arc<MemoryCall>> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<Arc<MemoryCall>> {
        self.calls.lock().last().cloned()
    }

    /// One-shot reads end once their script is exhausted; subscriptions
    /// stay open for pushed steps.
    fn script_for(&self, request: &ReadRequest) -> Vec<Step> {
        let scripted = self.streams.read().get(request.target.name()).cloned();
        let mut steps = match (scripted, &request.target) {
            (Some(steps), _) => steps,
            (None, StreamTarget::Stream(name)) => {
                vec![Step::Frame(ReadResponse::StreamNotFound {
                    stream_name: name.clone(),
                })]
            }
            (None, StreamTarget::All) => Vec::new(),
        };

        let terminated = matches!(
            steps.last(),
            Some(Step::Fail(_) | Step::Complete | Step::Frame(ReadResponse::StreamNotFound { .. }))
        );
        if !request.is_subscription() && !terminated {
            steps.push(Step::Complete);
        }
        steps
    }
}

impl Channel for MemoryChannel {
    fn read(&self, request: ReadRequest, observer: Arc<dyn ResponseObserver>) {
        let steps = self.script_for(&request);
        let call = Arc::new(MemoryCall::new(request, steps, Arc::clone(&observer)));
        self.calls.lock().push(Arc::clone(&call));

        observer.before_start(Arc::clone(&call) as Arc<dyn ClientCall>);
        MemoryCall::start(&call);
    }
}

#[derive(Default)]
struct CallState {
    queue: VecDeque<Step>,
    manual: bool,
    credits: usize,
    grants: Vec<usize>,
    started: bool,
    pumping: bool,
    terminated: bool,
    delivered_events: u64,
    cancel_reason: Option<String>,
    cancel_cause: Option<ClientError>,
}

/// Server side of one in-memory call.
pub struct MemoryCall {
    request: ReadRequest,
    observer: Mutex<Option<Arc<dyn ResponseObserver>>>,
    state: Mutex<CallState>,
    idle: Condvar,
}

enum Action {
    Deliver(ReadResponse),
    Fail(Status),
    Complete,
}

impl MemoryCall {
    fn new(request: ReadRequest, steps: Vec<Step>, observer: Arc<dyn ResponseObserver>) -> Self {
        Self {
            request,
            observer: Mutex::new(Some(observer)),
            state: Mutex::new(CallState {
                queue: steps.into(),
                ..Default::default()
            }),
            idle: Condvar::new(),
        }
    }

    pub fn read_request(&self) -> &ReadRequest {
        &self.request
    }

    /// Every credit grant, the initial one first.
    pub fn grants(&self) -> Vec<usize> {
        self.state.lock().grants.clone()
    }

    pub fn total_granted(&self) -> usize {
        self.state.lock().grants.iter().sum()
    }

    /// Credits granted but not yet used.
    pub fn credits(&self) -> usize {
        self.state.lock().credits
    }

    /// Frames still waiting for credit.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancel_reason.is_some()
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.state.lock().cancel_reason.clone()
    }

    /// Typed cause the client passed along with its cancellation.
    pub fn cancel_cause(&self) -> Option<ClientError> {
        self.state.lock().cancel_cause.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Append a step to a live call and deliver what credit allows.
    pub fn push(&self, step: Step) {
        self.state.lock().queue.push_back(step);
        self.pump();
    }

    /// Block until no thread is delivering frames of this call. Returns
    /// false if delivery is still running after `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pumping {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.pumping;
            }
        }
        true
    }

    /// Hand the initial delivery to a thread of its own.
    fn start(call: &Arc<Self>) {
        {
            let mut state = call.state.lock();
            state.started = true;
            state.pumping = true;
        }

        let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let delivery = Arc::clone(call);
        let spawned = thread::Builder::new()
            .name(format!("memory-call-{id}"))
            .spawn(move || delivery.drain());

        if let Err(error) = spawned {
            warn!(%error, "failed to spawn delivery thread");
            call.abort(Status::unavailable(format!(
                "delivery thread unavailable: {error}"
            )));
        }
    }

    fn abort(&self, status: Status) {
        {
            let mut state = self.state.lock();
            state.terminated = true;
            state.queue.clear();
            state.pumping = false;
        }
        self.idle.notify_all();

        let observer = self.observer.lock().take();
        if let Some(observer) = observer {
            observer.on_error(ClientError::Transport(status));
        }
    }

    fn next_action(&self, state: &mut CallState) -> Option<Action> {
        if state.terminated {
            return None;
        }
        if let ReadMode::OneShot { max_count } = self.request.mode {
            if state.delivered_events >= max_count {
                state.queue.clear();
                state.terminated = true;
                return Some(Action::Complete);
            }
        }
        match state.queue.front()? {
            Step::Frame(_) => {
                if state.manual && state.credits == 0 {
                    return None;
                }
                if state.manual {
                    state.credits -= 1;
                }
                match state.queue.pop_front() {
                    Some(Step::Frame(frame)) => {
                        if matches!(frame, ReadResponse::Event(_)) {
                            state.delivered_events += 1;
                        }
                        Some(Action::Deliver(frame))
                    }
                    _ => None,
                }
            }
            Step::Fail(_) | Step::Complete => {
                state.terminated = true;
                match state.queue.pop_front() {
                    Some(Step::Fail(status)) => Some(Action::Fail(status)),
                    _ => Some(Action::Complete),
                }
            }
        }
    }

    fn pump(&self) {
        {
            let mut state = self.state.lock();
            if state.pumping || !state.started {
                return;
            }
            state.pumping = true;
        }
        self.drain();
    }

    /// Deliver until credit or steps run out. The caller owns the pumping
    /// flag.
    fn drain(&self) {
        loop {
            let action = {
                let mut state = self.state.lock();
                match self.next_action(&mut state) {
                    Some(action) => action,
                    None => {
                        state.pumping = false;
                        self.idle.notify_all();
                        return;
                    }
                }
            };

            match action {
                Action::Deliver(frame) => {
                    let observer = self.observer.lock().clone();
                    if let Some(observer) = observer {
                        observer.on_next(frame);
                    }
                }
                Action::Fail(status) => {
                    let observer = self.observer.lock().take();
                    if let Some(observer) = observer {
                        observer.on_error(ClientError::Transport(status));
                    }
                }
                Action::Complete => {
                    let observer = self.observer.lock().take();
                    if let Some(observer) = observer {
                        observer.on_completed();
                    }
                }
            }
        }
    }
}

impl ClientCall for MemoryCall {
    fn disable_auto_request_with_initial(&self, count: usize) {
        let mut state = self.state.lock();
        state.manual = true;
        state.credits = count;
        state.grants.push(count);
    }

    fn request(&self, count: usize) {
        {
            let mut state = self.state.lock();
            state.credits += count;
            state.grants.push(count);
        }
        self.pump();
    }

    fn cancel(&self, reason: &str, cause: Option<&ClientError>) {
        {
            let mut state = self.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.queue.clear();
            state.cancel_reason = Some(reason.to_string());
            state.cancel_cause = cause.cloned();
        }
        trace!(reason, "memory call cancelled");
        let observer = self.observer.lock().take();
        if let Some(observer) = observer {
            observer.on_error(ClientError::Transport(Status::cancelled(reason)));
        }
    }
}

#[derive(Default)]
struct ProviderState {
    connects: Vec<Option<Endpoint>>,
    failures_left: usize,
    shutdowns: usize,
    shut_down: bool,
}

/// Connection provider handing out in-memory channels.
///
/// Connections preferring a registered leader get that leader's channel;
/// everything else gets the default channel.
pub struct MemoryProvider {
    default_channel: Arc<MemoryChannel>,
    leaders: RwLock<HashMap<Endpoint, Arc<MemoryChannel>>>,
    server_version: Option<ServerVersion>,
    state: Mutex<ProviderState>,
}

impl MemoryProvider {
    pub fn new(default_channel: Arc<MemoryChannel>) -> Self {
        Self {
            default_channel,
            leaders: RwLock::new(HashMap::new()),
            server_version: Some(ServerVersion {
                major: 24,
                minor: 10,
                patch: 0,
            }),
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub fn with_leader(self, endpoint: Endpoint, channel: Arc<MemoryChannel>) -> Self {
        self.leaders.write().insert(endpoint, channel);
        self
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().failures_left = count;
    }

    /// Preferred leader of every connection attempt, in order.
    pub fn connects(&self) -> Vec<Option<Endpoint>> {
        self.state.lock().connects.clone()
    }

    /// Number of times shutdown actually released resources.
    pub fn shutdowns(&self) -> usize {
        self.state.lock().shutdowns
    }

    pub fn server_version(&self) -> Option<ServerVersion> {
        self.server_version
    }
}

impl ConnectionProvider for MemoryProvider {
    fn connect(&self, preferred_leader: Option<&Endpoint>) -> Result<Connection> {
        {
            let mut state = self.state.lock();
            state.connects.push(preferred_leader.cloned());
            if state.shut_down {
                return Err(ClientError::ConnectionShutdown);
            }
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(ClientError::Connection("connection refused".into()));
            }
        }

        let channel = preferred_leader
            .and_then(|leader| self.leaders.read().get(leader).cloned())
            .unwrap_or_else(|| Arc::clone(&self.default_channel));

        Ok(Connection {
            channel,
            server_version: self.server_version,
        })
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shut_down {
            state.shut_down = true;
            state.shutdowns += 1;
        }
    }
}
