//! REST poll flow: health gate, snapshots, stale tokens, timeouts, reset.

use std::sync::Arc;

use bandwatch::adapters::io_task::spawn_poll_worker;
use bandwatch::adapters::time::ManualClock;
use bandwatch::app::commands::SessionCommand;
use bandwatch::app::events::AppEvent;
use bandwatch::app::service::Session;
use bandwatch::config::{AlertPolicy, SessionConfig};
use bandwatch::events::{Inbound, TransportBridge, TransportRequest};
use bandwatch::fsm::{LinkEvent, LinkState};
use bandwatch::runtime::ControlLoop;
use bandwatch::scheduler::PollToken;
use bandwatch::telemetry::Mode;
use bandwatch::{Error, TransportError};
use chrono::{DateTime, Utc};

use crate::mock_ports::{RecordingSink, ScriptedPollPort, snapshot_body, snapshot_with_alert, t};

fn open(config: SessionConfig) -> (Session, RecordingSink) {
    let mut sink = RecordingSink::new();
    let session = Session::open(config, t(0), &mut sink).unwrap();
    (session, sink)
}

fn connect(session: &mut Session, sink: &mut RecordingSink, now: DateTime<Utc>) {
    let Some(TransportRequest::Health(token)) =
        session.handle_command(SessionCommand::Connect, now, sink).unwrap()
    else {
        panic!("connect must probe health");
    };
    session.apply(Inbound::Health { token, result: Ok(()) }, now, sink);
}

fn poll(
    session: &mut Session,
    sink: &mut RecordingSink,
    now: DateTime<Utc>,
    body: Result<String, TransportError>,
) -> PollToken {
    let Some(TransportRequest::Snapshot(token)) = session.tick(now, sink) else {
        panic!("expected a snapshot request at {now}");
    };
    session.apply(Inbound::Snapshot { token, result: body }, now, sink);
    token
}

// ── Snapshot accumulation ─────────────────────────────────────

#[test]
fn snapshot_totals_project_to_fractions() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("WorkOFF", [10.0, 5.0, 0.0], true)));

    let frame = sink.last_frame().unwrap();
    let fractions: Vec<f64> = frame.slices.iter().map(|sl| sl.fraction).collect();
    assert_eq!(fractions.len(), 3);
    assert!((fractions[0] - 2.0 / 3.0).abs() < 1e-9);
    assert!((fractions[1] - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(fractions[2], 0.0);
    assert_eq!(frame.sample.as_ref().map(|x| x.mode), Some(Mode::WorkOff));
}

#[test]
fn regression_is_adopted_as_reset() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [10.0, 5.0, 0.0], true)));
    poll(&mut s, &mut sink, t(1000), Ok(snapshot_body("Working", [4.0, 2.0, 0.0], true)));

    let acc = s.accumulator().current();
    assert_eq!(acc.get(Mode::WorkOff), 4.0);
    assert_eq!(acc.get(Mode::WorkOn), 2.0);
    assert_eq!(s.accumulator().resets_detected(), 1);
}

#[test]
fn repeated_snapshot_changes_nothing() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    let body = snapshot_body("Working", [3.0, 3.0, 3.0], true);
    poll(&mut s, &mut sink, t(0), Ok(body.clone()));
    let before = s.accumulator().current();
    poll(&mut s, &mut sink, t(1000), Ok(body));
    assert_eq!(s.accumulator().current(), before);
}

// ── Link lifecycle ────────────────────────────────────────────

#[test]
fn three_successes_announce_connected_once() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    for i in 0..3 {
        poll(&mut s, &mut sink, t(i * 1000), Ok(snapshot_body("WorkON", [1.0, 1.0, 1.0], true)));
    }
    assert_eq!(sink.link_events(), vec![LinkEvent::Connecting, LinkEvent::Connected]);
}

#[test]
fn failed_health_leaves_link_down() {
    let (mut s, mut sink) = open(SessionConfig::default());
    let Some(TransportRequest::Health(token)) =
        s.handle_command(SessionCommand::Connect, t(0), &mut sink).unwrap()
    else {
        panic!("connect must probe health");
    };
    s.apply(
        Inbound::Health { token, result: Err(TransportError::Status(503)) },
        t(100),
        &mut sink,
    );
    assert_eq!(s.status().state, LinkState::Disconnected);
    assert_eq!(s.tick(t(2000), &mut sink), None, "no polling before the link is up");
    assert!(s.frame().last_error.is_some());
}

#[test]
fn server_reported_disconnect_then_recovery() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [1.0, 0.0, 0.0], true)));
    poll(&mut s, &mut sink, t(1000), Ok(snapshot_body("Working", [2.0, 0.0, 0.0], false)));
    assert_eq!(s.status().state, LinkState::Disconnected);

    poll(&mut s, &mut sink, t(2000), Ok(snapshot_body("Working", [3.0, 0.0, 0.0], true)));
    assert_eq!(
        sink.link_events(),
        vec![
            LinkEvent::Connecting,
            LinkEvent::Connected,
            LinkEvent::Disconnected,
            LinkEvent::Connected,
        ]
    );
}

#[test]
fn malformed_snapshot_changes_nothing() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [5.0, 5.0, 5.0], true)));
    let before = s.frame();

    let missing_hr = r#"{"current_state":{"mode":"Working","distance_cm":30},"time_accumulation":{"WorkOFF":9,"WorkON":9,"Working":9},"alerts":[],"is_connected":true}"#;
    poll(&mut s, &mut sink, t(1000), Ok(missing_hr.to_owned()));

    let after = s.frame();
    assert_eq!(after.accumulation, before.accumulation);
    assert_eq!(after.sample, before.sample);
    assert_eq!(after.status.state, LinkState::Connected);
    assert!(after.last_error.as_deref().unwrap_or("").contains("heart_rate"));
    assert_eq!(sink.count(|e| matches!(e, AppEvent::DecodeFailed(_))), 1);

    // The next good snapshot clears the transient error.
    poll(&mut s, &mut sink, t(2000), Ok(snapshot_body("Working", [6.0, 5.0, 5.0], true)));
    assert_eq!(s.frame().last_error, None);
}

// ── In-flight bookkeeping ─────────────────────────────────────

#[test]
fn timed_out_request_disconnects_and_late_answer_is_dropped() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    let Some(TransportRequest::Snapshot(late)) = s.tick(t(0), &mut sink) else {
        panic!("expected a snapshot request");
    };

    assert_eq!(s.tick(t(1000), &mut sink), None, "one request in flight");
    assert_eq!(s.tick(t(5000), &mut sink), None);
    assert_eq!(s.status().state, LinkState::Disconnected);

    s.apply(
        Inbound::Snapshot { token: late, result: Ok(snapshot_body("Working", [9.0, 9.0, 9.0], true)) },
        t(5100),
        &mut sink,
    );
    assert_eq!(s.stats().stale_responses, 1);
    assert!(s.accumulator().current().is_zero());
    assert_eq!(s.status().state, LinkState::Disconnected);

    // Polling continues on an established session and recovers the link.
    poll(&mut s, &mut sink, t(6000), Ok(snapshot_body("Working", [1.0, 0.0, 0.0], true)));
    assert_eq!(s.status().state, LinkState::Connected);
}

#[test]
fn reset_discards_in_flight_snapshot() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [10.0, 5.0, 0.0], true)));

    let Some(TransportRequest::Snapshot(old)) = s.tick(t(1000), &mut sink) else {
        panic!("expected a snapshot request");
    };
    let Some(TransportRequest::Reset(reset)) =
        s.handle_command(SessionCommand::Reset, t(1100), &mut sink).unwrap()
    else {
        panic!("reset must be mirrored to the server");
    };
    assert!(s.accumulator().current().is_zero());
    assert_eq!(s.frame().slices.len(), 1, "placeholder only");

    s.apply(
        Inbound::Snapshot { token: old, result: Ok(snapshot_body("Working", [10.0, 5.0, 0.0], true)) },
        t(1200),
        &mut sink,
    );
    assert!(s.accumulator().current().is_zero(), "pre-reset totals must not return");

    s.apply(Inbound::ResetAck { token: reset, result: Ok(()) }, t(1300), &mut sink);
    assert_eq!(s.stats().stale_responses, 1);
}

#[test]
fn reset_reaches_server_while_band_disconnected() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [10.0, 5.0, 0.0], false)));
    assert_eq!(s.status().state, LinkState::Disconnected);

    let Some(TransportRequest::Reset(reset)) =
        s.handle_command(SessionCommand::Reset, t(500), &mut sink).unwrap()
    else {
        panic!("reset must go out even with the band offline");
    };
    assert!(s.pending_server_reset());

    // The reset occupies the single request slot until it is settled.
    assert_eq!(s.tick(t(1_000), &mut sink), None);
    assert!(s.accumulator().current().is_zero());

    s.apply(Inbound::ResetAck { token: reset, result: Ok(()) }, t(1_100), &mut sink);
    assert!(!s.pending_server_reset());
    poll(&mut s, &mut sink, t(2_000), Ok(snapshot_body("Working", [0.0, 1.0, 0.0], true)));
    assert_eq!(s.accumulator().current().get(Mode::WorkOn), 1.0);
    assert_eq!(s.accumulator().current().get(Mode::WorkOff), 0.0);
}

#[test]
fn failed_server_reset_is_retried_before_snapshots() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));
    poll(&mut s, &mut sink, t(0), Ok(snapshot_body("Working", [10.0, 5.0, 0.0], true)));

    let Some(TransportRequest::Reset(reset)) =
        s.handle_command(SessionCommand::Reset, t(100), &mut sink).unwrap()
    else {
        panic!("reset must be mirrored to the server");
    };
    s.apply(
        Inbound::ResetAck { token: reset, result: Err(TransportError::Status(503)) },
        t(200),
        &mut sink,
    );
    assert!(s.pending_server_reset());
    assert_eq!(s.status().state, LinkState::Disconnected);

    let Some(TransportRequest::Reset(retry)) = s.tick(t(1_000), &mut sink) else {
        panic!("failed reset must be retried instead of polling");
    };
    assert!(s.accumulator().current().is_zero());

    s.apply(Inbound::ResetAck { token: retry, result: Ok(()) }, t(1_100), &mut sink);
    assert!(!s.pending_server_reset());
    poll(&mut s, &mut sink, t(2_000), Ok(snapshot_body("Working", [0.0, 0.0, 2.0], true)));
    assert_eq!(s.accumulator().current().get(Mode::Working), 2.0);
}

#[test]
fn reset_before_connect_is_sent_once_polling_starts() {
    let (mut s, mut sink) = open(SessionConfig::default());
    assert_eq!(s.handle_command(SessionCommand::Reset, t(0), &mut sink).unwrap(), None);
    assert!(s.pending_server_reset());

    connect(&mut s, &mut sink, t(10));
    let Some(TransportRequest::Reset(reset)) = s.tick(t(10), &mut sink) else {
        panic!("pending reset goes out in the first poll slot");
    };
    s.apply(Inbound::ResetAck { token: reset, result: Ok(()) }, t(20), &mut sink);
    poll(&mut s, &mut sink, t(1_010), Ok(snapshot_body("Working", [1.0, 0.0, 0.0], true)));
    assert_eq!(s.accumulator().current().get(Mode::WorkOff), 1.0);
}

#[test]
fn reconfigure_only_while_disconnected() {
    let (mut s, mut sink) = open(SessionConfig::default());
    connect(&mut s, &mut sink, t(0));

    let next = SessionConfig { alert_policy: AlertPolicy::replace_most_recent(), ..SessionConfig::default() };
    let err = s
        .handle_command(SessionCommand::UpdateConfig(next.clone()), t(10), &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    s.handle_command(SessionCommand::Disconnect, t(20), &mut sink).unwrap();
    s.handle_command(SessionCommand::UpdateConfig(next), t(30), &mut sink).unwrap();
    assert_eq!(s.config().alert_policy, AlertPolicy::replace_most_recent());
}

// ── Alerts ────────────────────────────────────────────────────

#[test]
fn most_recent_alert_expires_and_is_not_resurrected() {
    let config = SessionConfig { alert_policy: AlertPolicy::replace_most_recent(), ..SessionConfig::default() };
    let (mut s, mut sink) = open(config);
    connect(&mut s, &mut sink, t(0));

    let body = snapshot_with_alert([1.0, 1.0, 1.0], "overworking", "2025-03-01T08:59:00Z");
    poll(&mut s, &mut sink, t(0), Ok(body.clone()));
    assert_eq!(s.alerts().visible().len(), 1);
    assert_eq!(s.alerts().expires_at(), Some(t(10_000)));

    poll(&mut s, &mut sink, t(10_000), Ok(body));
    assert!(s.alerts().visible().is_empty());
    assert!(sink.events.iter().any(|e| matches!(e, AppEvent::AlertsChanged(a) if a.is_empty())));
}

#[test]
fn newer_alert_replaces_visible_one() {
    let config = SessionConfig { alert_policy: AlertPolicy::replace_most_recent(), ..SessionConfig::default() };
    let (mut s, mut sink) = open(config);
    connect(&mut s, &mut sink, t(0));

    poll(&mut s, &mut sink, t(0), Ok(snapshot_with_alert([1.0, 1.0, 1.0], "overworking", "2025-03-01T08:59:00Z")));
    poll(&mut s, &mut sink, t(1000), Ok(snapshot_with_alert([1.0, 1.0, 1.0], "idle", "2025-03-01T08:59:30Z")));

    let visible = s.alerts().visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].kind, "idle");
    assert_eq!(s.alerts().expires_at(), Some(t(11_000)));
}

// ── Full pipeline through the I/O worker ──────────────────────

#[test]
fn control_loop_drives_worker_thread() {
    let config = SessionConfig { tick_interval_ms: 200, ..SessionConfig::default() };
    let mut sink = RecordingSink::new();
    let clock = ManualClock::new(t(0));
    let session = Session::open(config, t(0), &mut sink).unwrap();

    let bridge = Arc::new(TransportBridge::new());
    let port = ScriptedPollPort::new([Ok(snapshot_body("Working", [2.0, 1.0, 1.0], true))]);
    let worker = spawn_poll_worker(port, bridge.clone()).unwrap();

    let mut lp = ControlLoop::new(session, bridge, clock);
    lp.command(SessionCommand::Connect, &mut sink).unwrap();
    for _ in 0..50 {
        if lp.session().stats().snapshots > 0 {
            break;
        }
        lp.step(&mut sink);
    }

    assert_eq!(lp.session().status().state, LinkState::Connected);
    assert_eq!(lp.session().accumulator().current().get(Mode::WorkOff), 2.0);

    lp.shutdown(&mut sink);
    worker.join().unwrap();
}
