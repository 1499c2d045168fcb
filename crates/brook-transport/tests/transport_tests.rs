//! Transport lifecycle tests — dispatch routing, finish idempotence, and
//! the idle monitor under paused time.

use std::sync::Arc;
use std::time::Duration;

use brook_protocol::error::{
    CODE_CONNECTION_DISCONNECTED, CODE_INTERNAL,
};
use brook_protocol::{Action, ConnectionDetails, ErrorInfo, ProtocolMessage};
use brook_transport::{
    ActivityClock, AuthCallback, AuthProvider, ChannelSink, ContractViolation, LinkCommand,
    TransportCore, TransportError, TransportEvent, TransportParams,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};

// ─────────────────────────────────────────────────────────────────────────
// Recording doubles
// ─────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<ProtocolMessage>>,
}

impl ChannelSink for RecordingSink {
    fn on_channel_message(&self, message: ProtocolMessage) {
        self.messages.lock().push(message);
    }
}

#[derive(Default)]
struct RecordingAuth {
    calls: Mutex<u32>,
    failure: Mutex<Option<ErrorInfo>>,
}

impl AuthProvider for RecordingAuth {
    fn reauthorize(&self, done: AuthCallback) {
        *self.calls.lock() += 1;
        match self.failure.lock().clone() {
            Some(error) => done(Err(error)),
            None => done(Ok(())),
        }
    }
}

struct Harness {
    core: Arc<TransportCore>,
    events: UnboundedReceiver<TransportEvent>,
    sink: Arc<RecordingSink>,
    auth: Arc<RecordingAuth>,
    link: UnboundedReceiver<LinkCommand>,
    clock: Arc<ActivityClock>,
}

fn harness() -> Harness {
    let params = TransportParams::default();
    let sink = Arc::new(RecordingSink::default());
    let auth = Arc::new(RecordingAuth::default());
    let clock = Arc::new(ActivityClock::new());
    let (core, events) = TransportCore::new(params, sink.clone(), auth.clone(), clock.clone());
    let (tx, link) = mpsc::unbounded_channel();
    core.install_link("test", tx);
    Harness {
        core,
        events,
        sink,
        auth,
        link,
        clock,
    }
}

fn connected_message(max_idle_interval: u64) -> ProtocolMessage {
    ProtocolMessage {
        action: Action::Connected,
        connection_id: Some("conn-1".into()),
        connection_details: Some(ConnectionDetails {
            connection_key: Some("key-1".into()),
            client_id: None,
            max_idle_interval,
        }),
        ..Default::default()
    }
}

fn drain(events: &mut UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Let spawned tasks (idle timer, auth callbacks) run to quiescence.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn outbound_action(link: &mut UnboundedReceiver<LinkCommand>) -> Option<Action> {
    match link.try_recv() {
        Ok(LinkCommand::Send(message)) => Some(message.action),
        Err(_) => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Connection establishment
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connected_message_marks_connected_and_emits() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    assert!(h.core.is_connected());
    assert!(!h.core.is_finished());
    match h.events.try_recv().unwrap() {
        TransportEvent::Connected {
            error,
            connection_id,
            connection_details,
            ..
        } => {
            assert!(error.is_none());
            assert_eq!(connection_id.as_deref(), Some("conn-1"));
            assert_eq!(connection_details.connection_key.as_deref(), Some("key-1"));
        }
        other => panic!("expected Connected, got {other:?}"),
    }
    assert!(matches!(h.events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn connected_without_details_is_a_contract_violation() {
    let mut h = harness();
    let result = h
        .core
        .on_protocol_message(ProtocolMessage::new(Action::Connected));
    assert_eq!(result, Err(ContractViolation::MissingConnectionDetails));
    assert!(!h.core.is_finished());

    // The physical medium surfaces the breach by failing the transport;
    // the fault is the distinct internal classification, not a network error.
    let violation = result.unwrap_err();
    h.core.fail(Some(violation.to_error_info()));
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Failed { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, CODE_INTERNAL);
            assert_eq!(error.status_code, 500);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Local terminal operations
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_sends_close_frame_and_finishes() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    h.core.close();
    assert_eq!(outbound_action(&mut h.link), Some(Action::Close));
    assert!(h.core.is_finished());
    assert!(h.core.is_disposed());
    assert!(!h.core.is_connected());
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Closed { error: None }, TransportEvent::Disposed] => {}
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn close_before_connected_sends_no_frame() {
    let mut h = harness();
    h.core.close();
    assert_eq!(outbound_action(&mut h.link), None);
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Closed { error: None }, TransportEvent::Disposed] => {}
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_carries_given_or_generic_error() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    h.core.disconnect(None);
    assert_eq!(outbound_action(&mut h.link), Some(Action::Disconnect));
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Disconnected { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, CODE_CONNECTION_DISCONNECTED);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn fail_finishes_with_failed_outcome() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    h.core.fail(Some(ErrorInfo::new(40_400, 404, "no such endpoint")));
    // Best-effort DISCONNECT notification goes out first
    assert_eq!(outbound_action(&mut h.link), Some(Action::Disconnect));
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Failed { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, 40_400);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn finish_is_idempotent_across_all_triggers() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    h.core.close();
    // Every further terminal trigger is a silent no-op
    h.core.disconnect(None);
    h.core.fail(None);
    h.core.close();
    h.core
        .on_protocol_message(ProtocolMessage::new(Action::Closed))
        .unwrap();
    h.core
        .on_protocol_message(ProtocolMessage::new(Action::Disconnected))
        .unwrap();
    h.core
        .on_protocol_message(ProtocolMessage::new(Action::Error))
        .unwrap();

    match drain(&mut h.events).as_slice() {
        [TransportEvent::Closed { .. }, TransportEvent::Disposed] => {}
        other => panic!("expected a single terminal sequence, got {other:?}"),
    }
    // Listener detach happened exactly once: the channel is now closed
    assert!(matches!(
        h.events.try_recv(),
        Err(TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn send_after_finish_is_rejected() {
    let h = harness();
    h.core.close();
    let result = h.core.send(ProtocolMessage::new(Action::Message));
    assert!(matches!(result, Err(TransportError::Finished)));
}

#[tokio::test]
async fn ping_sends_heartbeat_frame() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    h.core.ping(Some("ping-7".into())).unwrap();
    match h.link.try_recv().unwrap() {
        LinkCommand::Send(message) => {
            assert_eq!(message.action, Action::Heartbeat);
            assert_eq!(message.id.as_deref(), Some("ping-7"));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Peer-initiated terminations
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn peer_closed_finishes_with_closed_outcome() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut closed = ProtocolMessage::new(Action::Closed);
    closed.error = Some(ErrorInfo::new(10_000, 400, "going away"));
    h.core.on_protocol_message(closed).unwrap();
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Closed { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, 10_000);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn peer_disconnected_is_recoverable_not_failed() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    h.core
        .on_protocol_message(ProtocolMessage::new(Action::Disconnected))
        .unwrap();
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Disconnected { .. }, TransportEvent::Disposed] => {}
        other => panic!("unexpected events: {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Dispatch routing
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_without_channel_fails_the_transport() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut error_message = ProtocolMessage::new(Action::Error);
    error_message.error = Some(ErrorInfo::new(40_140, 401, "token expired"));
    h.core.on_protocol_message(error_message).unwrap();

    assert!(h.sink.messages.lock().is_empty());
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Failed { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, 40_140);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn error_with_channel_is_forwarded_not_fatal() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut error_message = ProtocolMessage::new(Action::Error);
    error_message.channel = Some("orders".into());
    error_message.error = Some(ErrorInfo::new(90_000, 400, "channel problem"));
    h.core.on_protocol_message(error_message).unwrap();

    assert!(!h.core.is_finished());
    assert!(drain(&mut h.events).is_empty());
    let forwarded = h.sink.messages.lock();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].channel.as_deref(), Some("orders"));
}

#[tokio::test]
async fn sync_with_connection_id_emits_sync_event() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut sync = ProtocolMessage::new(Action::Sync);
    sync.connection_id = Some("conn-1".into());
    h.core.on_protocol_message(sync).unwrap();

    assert!(h.sink.messages.lock().is_empty());
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Sync { connection_id, .. }] => assert_eq!(connection_id, "conn-1"),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn sync_without_connection_id_is_channel_scoped() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut sync = ProtocolMessage::new(Action::Sync);
    sync.channel = Some("orders".into());
    h.core.on_protocol_message(sync).unwrap();

    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.sink.messages.lock().len(), 1);
}

#[tokio::test]
async fn ack_nack_and_heartbeat_notifications() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut ack = ProtocolMessage::new(Action::Ack);
    ack.msg_serial = Some(5);
    ack.count = Some(2);
    h.core.on_protocol_message(ack).unwrap();

    let mut nack = ProtocolMessage::new(Action::Nack);
    nack.msg_serial = Some(7);
    nack.error = Some(ErrorInfo::new(50_000, 500, "rejected"));
    h.core.on_protocol_message(nack).unwrap();

    h.core
        .on_protocol_message(ProtocolMessage::heartbeat(Some("hb-1".into())))
        .unwrap();

    match drain(&mut h.events).as_slice() {
        [
            TransportEvent::Ack { serial, count },
            TransportEvent::Nack {
                serial: nack_serial,
                count: nack_count,
                error: Some(error),
            },
            TransportEvent::Heartbeat { id },
        ] => {
            assert_eq!(*serial, Some(5));
            assert_eq!(*count, 2);
            assert_eq!(*nack_serial, Some(7));
            assert_eq!(*nack_count, 1);
            assert_eq!(error.code, 50_000);
            assert_eq!(id.as_deref(), Some("hb-1"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn channel_traffic_is_forwarded_unmodified() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    let mut message = ProtocolMessage::new(Action::Message);
    message.channel = Some("orders".into());
    message.msg_serial = Some(9);
    h.core.on_protocol_message(message.clone()).unwrap();

    let forwarded = h.sink.messages.lock();
    assert_eq!(forwarded.as_slice(), std::slice::from_ref(&message));
}

#[tokio::test]
async fn auth_triggers_reauthorize_and_failures_stay_local() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    *h.auth.failure.lock() = Some(ErrorInfo::new(40_170, 403, "renewal refused"));
    h.core
        .on_protocol_message(ProtocolMessage::new(Action::Auth))
        .unwrap();
    settle().await;

    assert_eq!(*h.auth.calls.lock(), 1);
    // Renewal failure is logged only: no lifecycle event, no termination
    assert!(drain(&mut h.events).is_empty());
    assert!(!h.core.is_finished());
}

#[tokio::test]
async fn messages_after_finish_are_ignored() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    h.core.close();
    drain(&mut h.events);

    h.core.on_protocol_message(connected_message(0)).unwrap();
    let mut message = ProtocolMessage::new(Action::Message);
    message.channel = Some("orders".into());
    h.core.on_protocol_message(message).unwrap();

    assert!(!h.core.is_connected());
    assert!(h.sink.messages.lock().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// Idle monitor (paused time)
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_connection_is_dropped_within_slack_of_deadline() {
    // maxIdleInterval 15000 + 10000 margin → deadline 25000, slack 100
    let mut h = harness();
    h.core.on_protocol_message(connected_message(15_000)).unwrap();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_millis(24_900)).await;
    settle().await;
    assert!(drain(&mut h.events).is_empty());
    assert!(!h.core.is_finished());

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle().await;
    match drain(&mut h.events).as_slice() {
        [TransportEvent::Disconnected { error: Some(error) }, TransportEvent::Disposed] => {
            assert_eq!(error.code, CODE_CONNECTION_DISCONNECTED);
            assert_eq!(error.status_code, 408);
            assert!(error.message.contains("No activity"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn inbound_activity_rearms_the_idle_timer() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(15_000)).unwrap();

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    h.core
        .on_protocol_message(ProtocolMessage::heartbeat(None))
        .unwrap();

    // 40s in, but only 20s since the heartbeat — still alive
    tokio::time::sleep(Duration::from_millis(20_000)).await;
    settle().await;
    assert!(!h.core.is_finished());

    // 25.1s after the heartbeat the re-armed timer expires
    tokio::time::sleep(Duration::from_millis(5_300)).await;
    settle().await;
    assert!(h.core.is_finished());
    let events = drain(&mut h.events);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TransportEvent::Disconnected { .. })),
        "expected a Disconnected event, got {events:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn zero_idle_interval_disables_the_monitor() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(0)).unwrap();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_secs(600)).await;
    settle().await;
    assert!(!h.core.is_finished());
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_timer_survives_finish() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(15_000)).unwrap();
    h.core.close();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    assert!(matches!(
        h.events.try_recv(),
        Err(TryRecvError::Disconnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn activity_is_mirrored_into_the_shared_clock() {
    let mut h = harness();
    h.core.on_protocol_message(connected_message(15_000)).unwrap();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    h.core
        .on_protocol_message(ProtocolMessage::heartbeat(None))
        .unwrap();
    assert_eq!(h.clock.last_activity_ms(), 1_000);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.clock.since_last_activity(), Duration::from_millis(500));
}
