//! Fuzz target: stream lines through a live session.
//!
//! Each input line is parsed as `topic payload` and applied to a connected
//! stream session.  The session must never panic and never report a
//! negative total.
//!
//! cargo fuzz run fuzz_stream_line

#![no_main]

use bandwatch::adapters::line_stream::parse_line;
use bandwatch::app::commands::SessionCommand;
use bandwatch::app::events::AppEvent;
use bandwatch::app::ports::EventSink;
use bandwatch::app::service::Session;
use bandwatch::config::{
    AccumulationStrategy, AlertRules, EventUnit, SessionConfig, StreamConfig, TransportConfig,
};
use bandwatch::events::Inbound;
use bandwatch::telemetry::Mode;
use chrono::{Duration, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let config = SessionConfig {
        transport: TransportConfig::Stream(StreamConfig {
            heart_rate_topic: Some("hr".into()),
            distance_topic: Some("d".into()),
            ..StreamConfig::default()
        }),
        accumulation: AccumulationStrategy::Event(EventUnit::Duration),
        alert_rules: Some(AlertRules::default()),
        ..SessionConfig::default()
    };
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let Ok(mut session) = Session::open(config, t0, &mut NullSink) else {
        return;
    };
    let _ = session.handle_command(SessionCommand::Connect, t0, &mut NullSink);

    for (i, line) in text.lines().enumerate() {
        if let Some(msg) = parse_line(line) {
            let now = t0 + Duration::seconds(i as i64);
            session.apply(Inbound::Message(msg), now, &mut NullSink);
            session.tick(now, &mut NullSink);
        }
    }

    let acc = session.accumulator().current();
    for mode in Mode::ALL {
        assert!(acc.get(mode) >= 0.0);
    }
});
