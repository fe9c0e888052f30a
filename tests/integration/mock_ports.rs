//! Mock ports for integration tests.
//!
//! Records every emitted event and scripts transport responses so tests
//! can assert on the full session history.

use std::collections::VecDeque;

use bandwatch::TransportError;
use bandwatch::app::events::{AppEvent, RenderFrame};
use bandwatch::app::ports::{EventSink, PollPort};
use bandwatch::fsm::LinkEvent;
use chrono::{DateTime, Duration, TimeZone, Utc};

// ── Time ──────────────────────────────────────────────────────

pub fn t(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
}

// ── Payload builders ──────────────────────────────────────────

pub fn snapshot_body(mode: &str, totals: [f64; 3], connected: bool) -> String {
    format!(
        r#"{{"current_state":{{"mode":"{mode}","heart_rate":72,"distance_cm":30}},"time_accumulation":{{"WorkOFF":{},"WorkON":{},"Working":{}}},"alerts":[],"is_connected":{connected}}}"#,
        totals[0], totals[1], totals[2]
    )
}

pub fn snapshot_with_alert(totals: [f64; 3], kind: &str, at: &str) -> String {
    format!(
        r#"{{"current_state":{{"mode":"Working","heart_rate":72,"distance_cm":30}},"time_accumulation":{{"WorkOFF":{},"WorkON":{},"Working":{}}},"alerts":[{{"kind":"{kind}","message":"take a break","severity":"high","timestamp":"{at}"}}],"is_connected":true}}"#,
        totals[0], totals[1], totals[2]
    )
}

pub fn sample_payload(mode: &str, at: &str) -> String {
    format!(r#"{{"mode":"{mode}","heart_rate":80,"distance_cm":25,"timestamp":"{at}"}}"#)
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_events(&self) -> Vec<LinkEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Link(l) => Some(*l),
                _ => None,
            })
            .collect()
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.events.iter().rev().find_map(|e| match e {
            AppEvent::Frame(f) | AppEvent::Started(f) => Some(f),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── ScriptedPollPort ──────────────────────────────────────────

/// Answers health/reset with `Ok` and serves snapshot bodies in order,
/// repeating the last one once the script runs out.
pub struct ScriptedPollPort {
    bodies: VecDeque<Result<String, TransportError>>,
    last: Option<Result<String, TransportError>>,
    pub healthy: bool,
    pub resets: u32,
}

#[allow(dead_code)]
impl ScriptedPollPort {
    pub fn new(bodies: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            bodies: bodies.into_iter().collect(),
            last: None,
            healthy: true,
            resets: 0,
        }
    }
}

impl PollPort for ScriptedPollPort {
    fn health(&mut self) -> Result<(), TransportError> {
        if self.healthy {
            Ok(())
        } else {
            Err(TransportError::Status(503))
        }
    }

    fn fetch_current(&mut self) -> Result<String, TransportError> {
        if let Some(next) = self.bodies.pop_front() {
            self.last = Some(next);
        }
        self.last.clone().unwrap_or(Err(TransportError::Closed))
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.resets += 1;
        Ok(())
    }
}
