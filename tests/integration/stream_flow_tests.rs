//! Topic stream flow: liveness from messages, raw topics, alert topic,
//! event accumulation and local rules.

use std::io::Cursor;

use bandwatch::adapters::io_task::run_stream_reader;
use bandwatch::adapters::line_stream::LineMessageSource;
use bandwatch::alerts::rules::OVERWORKING_KIND;
use bandwatch::app::commands::SessionCommand;
use bandwatch::app::events::AppEvent;
use bandwatch::app::service::Session;
use bandwatch::config::{
    AccumulationStrategy, AlertPolicy, AlertRules, EventUnit, SessionConfig, StreamConfig,
    TransportConfig,
};
use bandwatch::events::{Inbound, StreamMessage, TransportBridge};
use bandwatch::fsm::{LinkEvent, LinkState};
use bandwatch::telemetry::Mode;

use crate::mock_ports::{RecordingSink, sample_payload, t};

const DATA: &str = "TEF/device023/attrs/d";
const ALERTS: &str = "TEF/device023/attrs/a";
const HEART_RATE: &str = "band/heart_rate";
const DISTANCE: &str = "band/distance";

fn stream_config(unit: EventUnit) -> SessionConfig {
    SessionConfig {
        transport: TransportConfig::Stream(StreamConfig::default()),
        accumulation: AccumulationStrategy::Event(unit),
        ..SessionConfig::default()
    }
}

/// Band build that also publishes bare heart-rate and distance readings.
fn raw_stream_config() -> SessionConfig {
    SessionConfig {
        transport: TransportConfig::Stream(StreamConfig {
            heart_rate_topic: Some(HEART_RATE.into()),
            distance_topic: Some(DISTANCE.into()),
            ..StreamConfig::default()
        }),
        ..stream_config(EventUnit::Duration)
    }
}

fn connected(config: SessionConfig) -> (Session, RecordingSink) {
    let mut sink = RecordingSink::new();
    let mut s = Session::open(config, t(0), &mut sink).unwrap();
    let request = s.handle_command(SessionCommand::Connect, t(0), &mut sink).unwrap();
    assert_eq!(request, None, "stream mode has nothing to request");
    (s, sink)
}

fn msg(topic: &str, payload: &str) -> Inbound {
    Inbound::Message(StreamMessage {
        topic: topic.into(),
        payload: payload.into(),
    })
}

#[test]
fn first_sample_connects_and_counts_accumulate() {
    let (mut s, mut sink) = connected(stream_config(EventUnit::Count));
    assert_eq!(s.status().state, LinkState::Connecting);

    s.apply(msg(DATA, &sample_payload("WorkON", "2025-03-01T09:00:01Z")), t(1000), &mut sink);
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:02Z")), t(2000), &mut sink);
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:03Z")), t(3000), &mut sink);

    let acc = s.accumulator().current();
    assert_eq!(acc.get(Mode::WorkOff), 0.0);
    assert_eq!(acc.get(Mode::WorkOn), 1.0);
    assert_eq!(acc.get(Mode::Working), 2.0);
    assert_eq!(sink.link_events(), vec![LinkEvent::Connecting, LinkEvent::Connected]);
}

#[test]
fn redelivered_sample_is_counted_once() {
    let (mut s, mut sink) = connected(stream_config(EventUnit::Count));
    let payload = sample_payload("Working", "2025-03-01T09:00:01Z");
    s.apply(msg(DATA, &payload), t(1000), &mut sink);
    s.apply(msg(DATA, &payload), t(1100), &mut sink);
    assert_eq!(s.accumulator().current().get(Mode::Working), 1.0);
    assert_eq!(s.stats().samples, 1);
}

#[test]
fn raw_topics_derive_the_mode() {
    let (mut s, mut sink) = connected(raw_stream_config());

    s.apply(msg(HEART_RATE, "72"), t(1000), &mut sink);
    assert_eq!(s.frame().sample.map(|x| x.mode), Some(Mode::Working));

    // Distance arrives in metres.
    s.apply(msg(DISTANCE, "1.2"), t(2000), &mut sink);
    let sample = s.frame().sample.unwrap();
    assert_eq!(sample.mode, Mode::WorkOn);
    assert_eq!(sample.distance_cm, 120.0);

    s.apply(msg(HEART_RATE, "0"), t(3000), &mut sink);
    assert_eq!(s.frame().sample.map(|x| x.mode), Some(Mode::WorkOff));

    let acc = s.accumulator().current();
    assert_eq!([acc.get(Mode::WorkOff), acc.get(Mode::WorkOn), acc.get(Mode::Working)], [1.0, 1.0, 0.0]);
}

#[test]
fn raw_reading_cycle_is_credited_once() {
    let (mut s, mut sink) = connected(raw_stream_config());
    s.apply(msg(HEART_RATE, "72"), t(1000), &mut sink);
    s.apply(msg(DISTANCE, "0.2"), t(1000), &mut sink);

    // Next cycle: both topics again, one second later.
    s.apply(msg(HEART_RATE, "74"), t(2000), &mut sink);
    s.apply(msg(DISTANCE, "0.3"), t(2000), &mut sink);

    assert_eq!(s.stats().samples, 4);
    assert_eq!(s.accumulator().current().get(Mode::Working), 1.0);
    assert_eq!(s.accumulator().current().total(), 1.0);
}

#[test]
fn bad_payload_keeps_link_and_state() {
    let (mut s, mut sink) = connected(stream_config(EventUnit::Count));
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:01Z")), t(1000), &mut sink);
    let before = s.frame();

    s.apply(msg(DATA, r#"{"mode":"Working","distance_cm":20}"#), t(2000), &mut sink);
    s.apply(msg(DATA, r#"{"mode":"Sleeping","heart_rate":60,"distance_cm":20}"#), t(2100), &mut sink);
    s.apply(msg(HEART_RATE, "n/a"), t(2200), &mut sink);

    let after = s.frame();
    assert_eq!(after.status.state, LinkState::Connected);
    assert_eq!(after.accumulation, before.accumulation);
    assert_eq!(after.sample, before.sample);
    assert_eq!(s.stats().decode_failures, 3);
    assert!(after.last_error.is_some());

    s.apply(msg(DATA, &sample_payload("WorkOFF", "2025-03-01T09:00:03Z")), t(3000), &mut sink);
    assert_eq!(s.frame().last_error, None);
}

#[test]
fn messages_before_connect_are_dropped() {
    let mut sink = RecordingSink::new();
    let mut s = Session::open(stream_config(EventUnit::Count), t(0), &mut sink).unwrap();
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:01Z")), t(1000), &mut sink);
    assert_eq!(s.status().state, LinkState::Disconnected);
    assert!(s.accumulator().current().is_zero());
    assert!(sink.link_events().is_empty());
}

#[test]
fn free_text_alert_is_shown_then_expires() {
    let config = SessionConfig {
        alert_policy: AlertPolicy::replace_most_recent(),
        ..stream_config(EventUnit::Count)
    };
    let (mut s, mut sink) = connected(config);

    s.apply(msg(ALERTS, "Stand up and stretch"), t(1000), &mut sink);
    let visible = s.alerts().visible().to_vec();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].message, "Stand up and stretch");
    assert_eq!(s.status().state, LinkState::Connected, "alert traffic is liveness too");

    assert_eq!(s.tick(t(10_999), &mut sink), None);
    assert_eq!(s.alerts().visible().len(), 1);
    s.tick(t(11_000), &mut sink);
    assert!(s.alerts().visible().is_empty());
}

#[test]
fn duration_rules_raise_overworking() {
    let config = SessionConfig {
        alert_rules: Some(AlertRules {
            overworking_secs: 60.0,
            ..AlertRules::default()
        }),
        ..stream_config(EventUnit::Duration)
    };
    let (mut s, mut sink) = connected(config);

    for (i, secs) in [0, 20, 40, 60].into_iter().enumerate() {
        let at = format!("2025-03-01T09:00:{secs:02}Z");
        s.apply(msg(DATA, &sample_payload("Working", &at)), t(i as i64 * 1000), &mut sink);
    }
    assert_eq!(s.accumulator().current().get(Mode::Working), 60.0);
    assert!(s.alerts().visible().is_empty(), "threshold not yet exceeded");

    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:01:20Z")), t(5000), &mut sink);
    let visible = s.alerts().visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].kind, OVERWORKING_KIND);

    // Still over the threshold: the latched alert is not re-announced.
    let announced = sink.count(|e| matches!(e, AppEvent::AlertsChanged(_)));
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:01:40Z")), t(6000), &mut sink);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::AlertsChanged(_))), announced);
}

#[test]
fn duration_gap_after_disconnect_is_not_credited() {
    let (mut s, mut sink) = connected(stream_config(EventUnit::Duration));
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:00Z")), t(0), &mut sink);
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:10Z")), t(10_000), &mut sink);
    assert_eq!(s.accumulator().current().get(Mode::Working), 10.0);

    s.apply(Inbound::StreamClosed(bandwatch::TransportError::Closed), t(11_000), &mut sink);
    assert_eq!(s.status().state, LinkState::Disconnected);

    // Reconnects on the next message; the outage is not credited.
    s.apply(msg(DATA, &sample_payload("Working", "2025-03-01T09:00:20Z")), t(20_000), &mut sink);
    assert_eq!(s.status().state, LinkState::Connected);
    assert_eq!(s.accumulator().current().get(Mode::Working), 10.0);
}

#[test]
fn line_reader_feeds_the_session() {
    let input = format!(
        "{DATA} {}\n{HEART_RATE} 70\ngarbage-without-payload\n{ALERTS} {{\"kind\":\"idle\",\"message\":\"move\"}}\n",
        sample_payload("WorkON", "2025-03-01T09:00:01Z")
    );
    let bridge = TransportBridge::new();
    run_stream_reader(&mut LineMessageSource::new(Cursor::new(input)), &bridge);

    let (mut s, mut sink) = connected(raw_stream_config());
    while let Some(inbound) = bridge.try_inbound() {
        s.apply(inbound, t(1000), &mut sink);
    }

    assert_eq!(s.stats().samples, 2);
    assert_eq!(s.alerts().visible().len(), 1);
    assert_eq!(s.status().state, LinkState::Disconnected, "EOF closes the stream");
    assert!(sink.events.iter().any(|e| matches!(e, AppEvent::TransportFailed(_))));
}
