//! One-shot read tests against the in-memory transport.

mod common;

use common::{event, events, fixture, fixture_with};
use tributary::transport::memory::{MemoryChannel, Step};
use tributary::{
    BackPressure, ClientError, ClientSettings, Position, ReadMessage, ReadOptions, ReadResponse,
    StartPosition,
};

// --- Delivery ---

#[test]
fn test_read_delivers_events_then_ends() {
    let mut script = events("orders", 10);
    script.push(Step::Complete);
    let f = fixture(MemoryChannel::new().with_stream("orders", script));

    let events = f
        .client
        .read_stream("orders", ReadOptions::default())
        .into_events()
        .unwrap();

    let revisions: Vec<u64> = events
        .iter()
        .map(|e| e.original_event().unwrap().revision)
        .collect();
    assert_eq!(revisions, (0..10).collect::<Vec<_>>());

    // ten frames never cross the refill threshold of a 512 window
    let call = f.channel.last_call().unwrap();
    assert_eq!(call.grants(), vec![512]);
    assert!(!call.is_cancelled());
}

#[test]
fn test_small_window_refills_at_threshold() {
    let f = fixture(MemoryChannel::new().with_stream("orders", events("orders", 10)));

    let options = ReadOptions::default().batch_size(4).threshold_ratio(0.5);
    let events = f.client.read_stream("orders", options).into_events().unwrap();
    assert_eq!(events.len(), 10);

    let call = f.channel.last_call().unwrap();
    assert_eq!(call.grants(), vec![4, 2, 2, 2, 2, 2]);
}

#[test]
fn test_client_default_window_applies() {
    let settings = ClientSettings {
        back_pressure: BackPressure::new(8, 0.25),
        ..Default::default()
    };
    let f = fixture_with(
        MemoryChannel::new().with_stream("orders", events("orders", 3)),
        settings,
    );

    f.client
        .read_stream("orders", ReadOptions::default())
        .into_events()
        .unwrap();
    assert_eq!(f.channel.last_call().unwrap().grants(), vec![8]);
}

#[test]
fn test_max_count_limits_events() {
    let f = fixture(MemoryChannel::new().with_stream("orders", events("orders", 10)));

    let events = f
        .client
        .read_stream("orders", ReadOptions::default().max_count(3))
        .into_events()
        .unwrap();
    assert_eq!(events.len(), 3);
}

#[test]
fn test_positions_are_reported_in_order() {
    let script = vec![
        Step::Frame(ReadResponse::FirstStreamPosition(0)),
        event("orders", 0),
        event("orders", 1),
        Step::Frame(ReadResponse::LastStreamPosition(1)),
        Step::Complete,
    ];
    let f = fixture(MemoryChannel::new().with_stream("orders", script));

    let messages: Vec<ReadMessage> = f
        .client
        .read_stream("orders", ReadOptions::default())
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].first_stream_position(), Some(0));
    assert_eq!(messages[1].event().unwrap().original_event().unwrap().revision, 0);
    assert_eq!(messages[3].last_stream_position(), Some(1));
}

#[test]
fn test_read_all_reports_last_position() {
    let script = vec![
        event("orders", 0),
        Step::Frame(ReadResponse::LastAllStreamPosition(Position::new(900, 900))),
    ];
    let f = fixture(MemoryChannel::new().with_stream("$all", script));

    let messages: Vec<ReadMessage> = f
        .client
        .read_all(ReadOptions::default().backwards())
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].last_all_position(), Some(Position::new(900, 900)));

    let request = f.channel.last_call().unwrap().read_request().clone();
    assert_eq!(request.direction, tributary::Direction::Backwards);
    assert!(!request.is_subscription());
}

// --- Errors ---

#[test]
fn test_missing_stream_fails_read() {
    let f = fixture(MemoryChannel::new());

    let mut stream = f.client.read_stream("orders-42", ReadOptions::default());
    assert_eq!(
        stream.next().unwrap().unwrap_err(),
        ClientError::StreamNotFound {
            stream_name: "orders-42".to_string()
        }
    );
    assert!(stream.next().is_none());

    // the call is torn down after the not-found frame
    assert!(f.channel.last_call().unwrap().is_cancelled());
}

#[test]
fn test_transport_failure_ends_read() {
    let mut script = events("orders", 2);
    script.push(Step::Fail(tributary::Status::new(
        tributary::Code::Internal,
        "disk on fire",
    )));
    let f = fixture(MemoryChannel::new().with_stream("orders", script));

    let results: Vec<_> = f
        .client
        .read_stream("orders", ReadOptions::default())
        .collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(results[2]
        .as_ref()
        .unwrap_err()
        .is_status(tributary::Code::Internal));
}

#[test]
fn test_invalid_options_fail_without_connecting() {
    let f = fixture(MemoryChannel::new());

    let result = f
        .client
        .read_all(ReadOptions::default().from(StartPosition::Revision(5)))
        .into_events();
    assert!(matches!(result, Err(ClientError::InvalidOptions(_))));

    let result = f
        .client
        .read_stream("orders", ReadOptions::default().batch_size(0))
        .into_events();
    assert!(matches!(result, Err(ClientError::InvalidOptions(_))));

    let result = f
        .client
        .read_stream(
            "orders",
            ReadOptions::default().from(StartPosition::Position(Position::new(1, 1))),
        )
        .into_events();
    assert!(matches!(result, Err(ClientError::InvalidOptions(_))));

    assert!(f.provider.connects().is_empty());
}

#[test]
fn test_zero_demand_is_rejected() {
    let f = fixture(MemoryChannel::new().with_stream("orders", events("orders", 1)));

    let stream = f.client.read_stream("orders", ReadOptions::default());
    assert_eq!(stream.request(0), Err(ClientError::InvalidDemand(0)));
    assert!(stream.request(3).is_ok());
}

// --- Cancellation ---

#[test]
fn test_cancelled_read_ends_quietly() {
    let f = fixture(MemoryChannel::new().with_stream("orders", events("orders", 50)));

    let mut stream = f.client.read_stream("orders", ReadOptions::default());
    assert!(stream.next().unwrap().is_ok());

    stream.cancel();
    stream.cancel();

    assert!(stream.is_cancelled());
    assert!(stream.next().is_none());
    assert!(stream.flow_state().completed);
}

#[test]
fn test_read_after_shutdown_fails() {
    let f = fixture(MemoryChannel::new().with_stream("orders", events("orders", 1)));
    f.client.shutdown().wait().unwrap();

    let result = f
        .client
        .read_stream("orders", ReadOptions::default())
        .into_events();
    assert_eq!(result.unwrap_err(), ClientError::ConnectionShutdown);
}
