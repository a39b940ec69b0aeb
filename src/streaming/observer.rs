//! Credit-based observer for server-streaming read calls.

use super::StreamConsumer;
use crate::connection::{redirect, ConnectionSupervisor, WorkItemArgs};
use crate::error::{ClientError, Result};
use crate::options::BackPressure;
use crate::transport::{ClientCall, Code, ReadRequest, ReadResponse, ResponseObserver};
use parking_lot::Mutex;
use std::cmp::min;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const MANUAL_CANCEL_REASON: &str = "the streaming operation was cancelled manually";

fn manual_cancel_cause() -> ClientError {
    ClientError::Cancelled {
        reason: MANUAL_CANCEL_REASON.to_string(),
    }
}

/// Snapshot of the flow-control counters of one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowState {
    /// Demand recorded since the last flow-control step.
    pub requested: u64,
    /// Credits granted to the transport and not yet used.
    pub outstanding: usize,
    pub completed: bool,
}

/// State shared between the delivery path and every [`StreamControl`].
struct FlowCore {
    batch_size: usize,
    threshold: usize,
    /// Written by `request()` callers, drained by the delivery path.
    requested: AtomicU64,
    /// Only the delivery path writes this.
    outstanding: Mutex<usize>,
    completed: AtomicBool,
    call: Mutex<Option<Arc<dyn ClientCall>>>,
}

impl FlowCore {
    fn new(back_pressure: BackPressure) -> Self {
        Self {
            batch_size: back_pressure.batch_size,
            threshold: back_pressure.request_threshold(),
            requested: AtomicU64::new(0),
            outstanding: Mutex::new(0),
            completed: AtomicBool::new(false),
            call: Mutex::new(None),
        }
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Flip the terminal flag. Returns true for the single winner.
    fn complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn add_demand(&self, n: u64) {
        self.requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            })
            .ok();
    }

    fn consume_credit(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
    }

    /// Returns true if this call won the terminal flag.
    fn cancel(&self, reason: &str, cause: Option<&ClientError>) -> bool {
        if !self.complete() {
            return false;
        }

        let call = self.call.lock().clone();
        match call {
            Some(call) => call.cancel(reason, cause),
            // Replayed by `before_start` once the call exists.
            None => debug!(reason, "stream cancelled before the call started"),
        }
        true
    }

    fn manage_flow_control(&self) {
        let requested = self.requested.swap(0, Ordering::AcqRel);

        let grant = {
            let mut outstanding = self.outstanding.lock();
            let received = self.batch_size.saturating_sub(*outstanding);

            let grant = if requested > 0 {
                min(requested, received as u64) as usize
            } else if received >= self.threshold {
                received
            } else {
                0
            };

            *outstanding += grant;
            grant
        };

        if grant == 0 {
            return;
        }

        let call = self.call.lock().clone();
        if let Some(call) = call {
            trace!(grant, requested, "granting credits");
            call.request(grant);
        }
    }

    fn state(&self) -> FlowState {
        FlowState {
            requested: self.requested.load(Ordering::Acquire),
            outstanding: *self.outstanding.lock(),
            completed: self.is_completed(),
        }
    }
}

/// Demand and cancellation handle of a streaming call.
///
/// Cheap to clone; every clone controls the same call.
#[derive(Clone)]
pub struct StreamControl {
    core: Arc<FlowCore>,
}

impl StreamControl {
    /// Record demand for `n` more frames, honoured on the next flow-control
    /// step. Demand accumulates until then.
    pub fn request(&self, n: u64) -> Result<()> {
        if n == 0 {
            return Err(ClientError::InvalidDemand(n));
        }
        self.core.add_demand(n);
        Ok(())
    }

    /// Cancel the call. Idempotent; the consumer is not notified. Returns
    /// true if this cancellation ended the call.
    pub fn cancel(&self) -> bool {
        self.core
            .cancel(MANUAL_CANCEL_REASON, Some(&manual_cancel_cause()))
    }

    pub fn is_completed(&self) -> bool {
        self.core.is_completed()
    }

    pub fn flow_state(&self) -> FlowState {
        self.core.state()
    }
}

/// Drives one streaming call and feeds its consumer.
pub struct ReadResponseObserver<C> {
    core: Arc<FlowCore>,
    consumer: C,
    args: Mutex<Option<WorkItemArgs>>,
}

impl<C: StreamConsumer> ReadResponseObserver<C> {
    pub fn new(back_pressure: BackPressure, consumer: C) -> Self {
        Self {
            core: Arc::new(FlowCore::new(back_pressure)),
            consumer,
            args: Mutex::new(None),
        }
    }

    pub fn control(&self) -> StreamControl {
        StreamControl {
            core: Arc::clone(&self.core),
        }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Remember the connection the call runs on, used to report leader
    /// changes.
    pub fn on_connected(&self, args: WorkItemArgs) {
        *self.args.lock() = Some(args);
    }

    /// Cancel the call with a typed cause. Returns true if this cancellation
    /// terminated the stream.
    pub fn cancel(&self, reason: &str, cause: Option<&ClientError>) -> bool {
        self.core.cancel(reason, cause)
    }

    pub fn flow_state(&self) -> FlowState {
        self.core.state()
    }

    /// Submit the call to the supervisor. The read is issued on the worker
    /// once a channel is available; a supervisor failure terminates the
    /// observer instead.
    pub(crate) fn start(self: Arc<Self>, supervisor: &ConnectionSupervisor, request: ReadRequest)
    where
        C: 'static,
    {
        supervisor.submit(move |result| match result {
            Ok(args) => {
                self.on_connected(args.clone());
                args.channel().read(request, self);
            }
            Err(error) => self.on_error(error),
        });
    }

    /// Hand one frame to the consumer. Returns false if the frame ended the
    /// stream.
    fn dispatch(&self, frame: ReadResponse) -> bool {
        match frame {
            ReadResponse::StreamNotFound { stream_name } => {
                let cause = ClientError::StreamNotFound {
                    stream_name: stream_name.clone(),
                };
                let reason = format!("stream '{stream_name}' is not found");
                if self.core.cancel(&reason, Some(&cause)) {
                    self.consumer.on_stream_not_found(stream_name);
                }
                return false;
            }
            ReadResponse::Event(event) => self.consumer.on_event(event),
            ReadResponse::Confirmation { subscription_id } => {
                self.consumer.on_subscription_confirmation(subscription_id)
            }
            ReadResponse::Checkpoint(position) => self.consumer.on_checkpoint(position),
            ReadResponse::FirstStreamPosition(revision) => {
                self.consumer.on_first_stream_position(revision)
            }
            ReadResponse::LastStreamPosition(revision) => {
                self.consumer.on_last_stream_position(revision)
            }
            ReadResponse::LastAllStreamPosition(position) => {
                self.consumer.on_last_all_stream_position(position)
            }
            ReadResponse::CaughtUp => self.consumer.on_caught_up(),
            ReadResponse::FellBehind => self.consumer.on_fell_behind(),
            ReadResponse::Unknown => warn!("received unknown message variant"),
        }
        true
    }
}

impl<C: StreamConsumer> ResponseObserver for ReadResponseObserver<C> {
    fn before_start(&self, call: Arc<dyn ClientCall>) {
        {
            let mut slot = self.core.call.lock();
            if self.core.is_completed() {
                call.cancel(MANUAL_CANCEL_REASON, Some(&manual_cancel_cause()));
                return;
            }
            *slot = Some(Arc::clone(&call));
        }

        *self.core.outstanding.lock() = self.core.batch_size;
        call.disable_auto_request_with_initial(self.core.batch_size);
        self.consumer.on_subscribe(self.control());
    }

    fn on_next(&self, frame: ReadResponse) {
        if self.core.is_completed() {
            return;
        }

        self.core.consume_credit();

        if self.dispatch(frame) {
            self.core.manage_flow_control();
        }
    }

    fn on_error(&self, error: ClientError) {
        if !self.core.complete() {
            return;
        }

        if error.is_status(Code::Cancelled) {
            debug!(%error, "call cancelled by the transport");
            self.consumer.on_cancelled(None);
            return;
        }

        let error = match redirect::leader_from_error(&error) {
            Some(leader) => {
                let args = self.args.lock().clone();
                if let Some(args) = args {
                    args.report_new_leader(leader.clone());
                }
                ClientError::NotLeader { leader }
            }
            None => error,
        };

        self.consumer.on_cancelled(Some(error));
    }

    fn on_completed(&self) {
        if !self.core.complete() {
            return;
        }

        self.consumer.on_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Status;
    use crate::types::{Position, RecordedEvent, ResolvedEvent};

    #[derive(Default)]
    struct RecordingCall {
        grants: Mutex<Vec<usize>>,
        cancels: Mutex<Vec<String>>,
        causes: Mutex<Vec<Option<ClientError>>>,
    }

    impl ClientCall for RecordingCall {
        fn disable_auto_request_with_initial(&self, count: usize) {
            self.grants.lock().push(count);
        }

        fn request(&self, count: usize) {
            self.grants.lock().push(count);
        }

        fn cancel(&self, reason: &str, cause: Option<&ClientError>) {
            self.cancels.lock().push(reason.to_string());
            self.causes.lock().push(cause.cloned());
        }
    }

    #[derive(Default)]
    struct RecordingConsumer {
        calls: Mutex<Vec<String>>,
        control: Mutex<Option<StreamControl>>,
        errors: Mutex<Vec<Option<ClientError>>>,
    }

    impl RecordingConsumer {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn terminal_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c.as_str(), "not_found" | "cancelled" | "complete"))
                .count()
        }
    }

    impl StreamConsumer for RecordingConsumer {
        fn on_subscribe(&self, control: StreamControl) {
            self.calls.lock().push("subscribe".into());
            *self.control.lock() = Some(control);
        }

        fn on_event(&self, event: ResolvedEvent) {
            let revision = event.event.map(|e| e.revision).unwrap_or_default();
            self.calls.lock().push(format!("event:{revision}"));
        }

        fn on_checkpoint(&self, position: Position) {
            self.calls.lock().push(format!("checkpoint:{}", position.commit));
        }

        fn on_stream_not_found(&self, stream_name: String) {
            self.calls.lock().push("not_found".into());
            self.calls.lock().push(stream_name);
        }

        fn on_caught_up(&self) {
            self.calls.lock().push("caught_up".into());
        }

        fn on_cancelled(&self, error: Option<ClientError>) {
            self.calls.lock().push("cancelled".into());
            self.errors.lock().push(error);
        }

        fn on_complete(&self) {
            self.calls.lock().push("complete".into());
        }
    }

    fn event(revision: u64) -> ReadResponse {
        ReadResponse::Event(ResolvedEvent::from_event(RecordedEvent {
            stream_id: "orders".into(),
            revision,
            event_id: revision.to_string(),
            event_type: "placed".into(),
            content_type: "application/json".into(),
            data: vec![],
            metadata: vec![],
            position: Position::new(revision, revision),
            created: 0,
        }))
    }

    fn started(
        batch_size: usize,
        ratio: f32,
    ) -> (
        Arc<ReadResponseObserver<RecordingConsumer>>,
        Arc<RecordingCall>,
    ) {
        let observer = Arc::new(ReadResponseObserver::new(
            BackPressure::new(batch_size, ratio),
            RecordingConsumer::default(),
        ));
        let call = Arc::new(RecordingCall::default());
        observer.before_start(Arc::clone(&call) as Arc<dyn ClientCall>);
        (observer, call)
    }

    #[test]
    fn test_start_grants_initial_batch() {
        let (observer, call) = started(512, 0.25);

        assert_eq!(*call.grants.lock(), vec![512]);
        assert_eq!(observer.flow_state().outstanding, 512);
        assert_eq!(observer.consumer().calls(), vec!["subscribe"]);
    }

    #[test]
    fn test_threshold_refill_without_demand() {
        let (observer, call) = started(512, 0.25);

        for _ in 0..400 {
            observer.core.consume_credit();
        }
        assert_eq!(observer.flow_state().outstanding, 112);

        observer.core.manage_flow_control();

        assert_eq!(*call.grants.lock(), vec![512, 400]);
        assert_eq!(observer.flow_state().outstanding, 512);
    }

    #[test]
    fn test_delivery_refills_at_threshold() {
        let (observer, call) = started(512, 0.25);

        for revision in 0..127 {
            observer.on_next(event(revision));
        }
        assert_eq!(*call.grants.lock(), vec![512]);

        observer.on_next(event(127));
        assert_eq!(*call.grants.lock(), vec![512, 128]);
        assert_eq!(observer.flow_state().outstanding, 512);
    }

    #[test]
    fn test_demand_is_capped_by_consumed_credit() {
        let (observer, call) = started(16, 0.5);
        let control = observer.control();

        control.request(10).unwrap();
        observer.on_next(event(0));
        assert_eq!(*call.grants.lock(), vec![16, 1]);

        for revision in 1..4 {
            observer.on_next(event(revision));
        }
        control.request(2).unwrap();
        control.request(3).unwrap();
        observer.on_next(event(4));

        // demand 5 accumulated, only 4 credits consumed since the last grant
        assert_eq!(*call.grants.lock(), vec![16, 1, 4]);
        assert_eq!(observer.flow_state().requested, 0);
        assert_eq!(observer.flow_state().outstanding, 16);
    }

    #[test]
    fn test_pull_bounded_read_grants_within_demand() {
        let (observer, call) = started(512, 0.25);
        observer.control().request(10).unwrap();

        for revision in 0..10 {
            observer.on_next(event(revision));
        }
        observer.on_completed();

        let grants = call.grants.lock().clone();
        assert_eq!(grants, vec![512, 1]);
        assert!(grants[1..].iter().sum::<usize>() <= 10);

        let calls = observer.consumer().calls();
        assert_eq!(calls.len(), 12);
        assert_eq!(calls[1], "event:0");
        assert_eq!(calls[10], "event:9");
        assert_eq!(calls[11], "complete");
    }

    #[test]
    fn test_zero_demand_rejected() {
        let (observer, _call) = started(16, 0.25);
        assert_eq!(
            observer.control().request(0),
            Err(ClientError::InvalidDemand(0))
        );
        assert_eq!(observer.flow_state().requested, 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (observer, call) = started(16, 0.25);
        let control = observer.control();

        control.cancel();
        control.cancel();
        control.clone().cancel();

        assert_eq!(call.cancels.lock().len(), 1);
        assert_eq!(
            *call.causes.lock(),
            vec![Some(ClientError::Cancelled {
                reason: MANUAL_CANCEL_REASON.to_string()
            })]
        );
        assert!(control.is_completed());

        // transport reports the cancellation back; nobody hears about it
        observer.on_error(ClientError::Transport(Status::cancelled("cancelled")));
        observer.on_completed();
        assert_eq!(observer.consumer().calls(), vec!["subscribe"]);
    }

    #[test]
    fn test_cancel_before_start_is_replayed() {
        let observer = Arc::new(ReadResponseObserver::new(
            BackPressure::default(),
            RecordingConsumer::default(),
        ));
        observer.control().cancel();

        let call = Arc::new(RecordingCall::default());
        observer.before_start(Arc::clone(&call) as Arc<dyn ClientCall>);

        assert_eq!(*call.cancels.lock(), vec![MANUAL_CANCEL_REASON.to_string()]);
        assert!(matches!(
            call.causes.lock()[0],
            Some(ClientError::Cancelled { .. })
        ));
        assert!(call.grants.lock().is_empty());
        assert!(observer.consumer().calls().is_empty());
    }

    #[test]
    fn test_stream_not_found_terminates_once() {
        let (observer, call) = started(16, 0.25);

        observer.on_next(ReadResponse::StreamNotFound {
            stream_name: "orders-42".into(),
        });
        observer.on_error(ClientError::Transport(Status::cancelled("not found")));
        observer.on_next(event(1));

        assert_eq!(
            observer.consumer().calls(),
            vec!["subscribe", "not_found", "orders-42"]
        );
        assert_eq!(
            *call.cancels.lock(),
            vec!["stream 'orders-42' is not found".to_string()]
        );
        assert_eq!(*call.grants.lock(), vec![16]);
    }

    #[test]
    fn test_completion_and_error_race() {
        let (observer, _call) = started(16, 0.25);

        observer.on_completed();
        observer.on_error(ClientError::Transport(Status::unavailable("gone")));
        observer.control().cancel();

        assert_eq!(observer.consumer().terminal_count(), 1);
        assert_eq!(observer.consumer().calls().last().unwrap(), "complete");
    }

    #[test]
    fn test_concurrent_terminal_paths_fire_once() {
        for _ in 0..50 {
            let (observer, _call) = started(16, 0.25);
            let handles: Vec<_> = (0..3)
                .map(|i| {
                    let observer = Arc::clone(&observer);
                    std::thread::spawn(move || match i {
                        0 => observer.on_completed(),
                        1 => observer.on_error(ClientError::Transport(Status::unavailable("x"))),
                        _ => {
                            observer.control().cancel();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert!(observer.consumer().terminal_count() <= 1);
            assert!(observer.flow_state().completed);
        }
    }

    #[test]
    fn test_remote_cancellation_reported_without_error() {
        let (observer, _call) = started(16, 0.25);

        observer.on_error(ClientError::Transport(Status::cancelled("server shutdown")));

        assert_eq!(observer.consumer().calls(), vec!["subscribe", "cancelled"]);
        assert_eq!(*observer.consumer().errors.lock(), vec![None]);
    }

    #[test]
    fn test_leader_trailers_become_not_leader() {
        let (observer, _call) = started(16, 0.25);

        observer.on_error(ClientError::Transport(Status::not_leader("node2", 2114)));

        let errors = observer.consumer().errors.lock().clone();
        assert_eq!(
            errors,
            vec![Some(ClientError::NotLeader {
                leader: crate::types::Endpoint::new("node2", 2114)
            })]
        );
    }

    #[test]
    fn test_unknown_frame_is_ignored_but_counted() {
        let (observer, _call) = started(16, 0.25);

        observer.on_next(ReadResponse::Unknown);
        observer.on_next(ReadResponse::Checkpoint(Position::new(9, 9)));
        observer.on_next(ReadResponse::CaughtUp);

        assert_eq!(
            observer.consumer().calls(),
            vec!["subscribe", "checkpoint:9", "caught_up"]
        );
        assert_eq!(observer.flow_state().outstanding, 13);
    }
}
