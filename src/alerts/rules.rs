//! Locally evaluated alert rules.
//!
//! With the event strategy there is no server computing alerts, so the
//! session evaluates the same two rules the band API applies:
//!
//! | kind               | severity | fires when                              |
//! |--------------------|----------|-----------------------------------------|
//! | `overworking`      | `high`   | `Working > overworking_secs`            |
//! | `low_productivity` | `medium` | `Working > 0` and `WorkON / Working > r` |
//!
//! A rule's alert is built once, when its condition becomes true, and
//! reused while the condition holds.  Re-evaluating therefore yields the
//! same alert and the reconciler sees no change.

use chrono::{DateTime, Utc};

use crate::accumulator::ModeAccumulation;
use crate::config::AlertRules;
use crate::telemetry::{Alert, Mode};

pub const OVERWORKING_KIND: &str = "overworking";
pub const LOW_PRODUCTIVITY_KIND: &str = "low_productivity";

pub struct RuleEvaluator {
    rules: AlertRules,
    overworking: Option<Alert>,
    low_productivity: Option<Alert>,
}

impl RuleEvaluator {
    pub fn new(rules: AlertRules) -> Self {
        Self {
            rules,
            overworking: None,
            low_productivity: None,
        }
    }

    /// Alerts whose condition holds for `totals`, oldest rule first.
    pub fn evaluate(&mut self, totals: &ModeAccumulation, now: DateTime<Utc>) -> Vec<Alert> {
        let working = totals.get(Mode::Working);
        let work_on = totals.get(Mode::WorkOn);

        let threshold = self.rules.overworking_secs;
        let overworking = working > threshold;
        latch(&mut self.overworking, overworking, || Alert {
            kind: OVERWORKING_KIND.into(),
            message: format!(
                "Overworking detected: {working:.0}s in Working exceeds {threshold:.0}s"
            ),
            severity: "high".into(),
            timestamp: now,
        });

        let ratio = if working > 0.0 { work_on / working } else { 0.0 };
        let low_productivity = ratio > self.rules.low_productivity_ratio;
        latch(&mut self.low_productivity, low_productivity, || Alert {
            kind: LOW_PRODUCTIVITY_KIND.into(),
            message: format!(
                "Low productivity detected: WorkON ({work_on:.0}s) is {ratio:.1}x Working ({working:.0}s)"
            ),
            severity: "medium".into(),
            timestamp: now,
        });

        self.overworking
            .iter()
            .chain(self.low_productivity.iter())
            .cloned()
            .collect()
    }

    /// Drop latched alerts (session reset).
    pub fn reset(&mut self) {
        self.overworking = None;
        self.low_productivity = None;
    }
}

fn latch(slot: &mut Option<Alert>, active: bool, build: impl FnOnce() -> Alert) {
    match (active, slot.is_some()) {
        (true, false) => *slot = Some(build()),
        (false, true) => *slot = None,
        _ => {}
    }
}
