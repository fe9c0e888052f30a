//! Mode accumulator: per-mode totals that only move forward.
//!
//! Two strategies, chosen once per session:
//!
//! ```text
//!  Snapshot:  server totals ──▶ replace (regression ⇒ adopt as reset)
//!  Event:     one sample    ──▶ totals[sample.mode] += 1 | Δt
//! ```
//!
//! The accumulator is the only writer of [`ModeAccumulation`]; everyone
//! else reads copies via [`ModeAccumulator::current`].

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::config::{AccumulationStrategy, EventUnit};
use crate::error::MonotonicityViolation;
use crate::telemetry::{Mode, Sample};

// ---------------------------------------------------------------------------
// ModeAccumulation (value type)
// ---------------------------------------------------------------------------

/// Seconds-or-count spent in each mode.  Every entry is ≥ 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModeAccumulation {
    values: [f64; Mode::COUNT],
}

impl ModeAccumulation {
    pub const ZERO: Self = Self {
        values: [0.0; Mode::COUNT],
    };

    /// Build from values in [`Mode::ALL`] order.  Negative and NaN entries
    /// become zero.
    pub fn from_values(values: [f64; Mode::COUNT]) -> Self {
        Self {
            values: values.map(|v| if v > 0.0 { v } else { 0.0 }),
        }
    }

    pub fn get(&self, mode: Mode) -> f64 {
        self.values[mode.index()]
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Share of the total per mode as fractions summing to 1, or `None`
    /// when nothing has accumulated.
    ///
    /// Values are scaled by the largest one first so the sum stays finite
    /// even when the raw total would overflow.
    pub fn shares(&self) -> Option<[f64; Mode::COUNT]> {
        let max = self.values.iter().copied().fold(0.0_f64, f64::max);
        if !(max > 0.0) {
            return None;
        }
        let scaled = if max.is_finite() {
            self.values.map(|v| v / max)
        } else {
            self.values.map(|v| if v.is_infinite() { 1.0 } else { 0.0 })
        };
        let sum: f64 = scaled.iter().sum();
        Some(scaled.map(|v| v / sum))
    }

    /// Share of the total per mode, in percent.  All zero when empty.
    pub fn percentages(&self) -> [f64; Mode::COUNT] {
        self.shares()
            .map_or([0.0; Mode::COUNT], |shares| shares.map(|f| f * 100.0))
    }

    /// `(mode, value)` pairs in the fixed iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (Mode, f64)> + '_ {
        Mode::ALL.into_iter().map(|m| (m, self.get(m)))
    }

    fn add(&mut self, mode: Mode, amount: f64) {
        if amount > 0.0 {
            self.values[mode.index()] += amount;
        }
    }

    /// First mode where `next` is smaller than `self`, if any.
    fn first_regression(&self, next: &Self) -> Option<MonotonicityViolation> {
        self.iter()
            .zip(next.iter())
            .find(|((_, stored), (_, incoming))| incoming < stored)
            .map(|((mode, stored), (_, incoming))| MonotonicityViolation {
                mode,
                stored,
                incoming,
            })
    }
}

/// Serialises as `{"WorkOFF": .., "WorkON": .., "Working": ..}`, the shape
/// the API and dashboards use.
impl Serialize for ModeAccumulation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Mode::COUNT))?;
        for (mode, value) in self.iter() {
            map.serialize_entry(mode.as_str(), &value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Accumulator (engine)
// ---------------------------------------------------------------------------

/// What a single ingest did to the totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccumulationOutcome {
    /// Totals are exactly as before.
    Unchanged,
    /// At least one total grew.
    Advanced,
    /// A snapshot regressed and was adopted as a post-reset baseline.
    ResetDetected(MonotonicityViolation),
    /// Input does not match the session's strategy and was not applied.
    Ignored,
}

impl AccumulationOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Advanced | Self::ResetDetected(_))
    }
}

/// Owns the session's [`ModeAccumulation`].
#[derive(Debug, Clone)]
pub struct ModeAccumulator {
    strategy: AccumulationStrategy,
    totals: ModeAccumulation,
    /// Timestamp of the last sample folded in (event/duration only).
    last_sample_at: Option<DateTime<Utc>>,
    /// Longest inter-sample gap still credited, in seconds.
    max_gap_secs: f64,
    resets_detected: u64,
}

impl ModeAccumulator {
    pub fn new(strategy: AccumulationStrategy, max_gap_secs: f64) -> Self {
        Self {
            strategy,
            totals: ModeAccumulation::ZERO,
            last_sample_at: None,
            max_gap_secs,
            resets_detected: 0,
        }
    }

    pub fn strategy(&self) -> AccumulationStrategy {
        self.strategy
    }

    /// Immutable copy of the current totals.
    pub fn current(&self) -> ModeAccumulation {
        self.totals
    }

    /// Snapshots adopted because they regressed, since construction.
    pub fn resets_detected(&self) -> u64 {
        self.resets_detected
    }

    // ── Snapshot strategy ─────────────────────────────────────

    /// Replace the totals with server-side `snapshot`.
    ///
    /// A snapshot that is smaller than the stored totals in any mode means
    /// the server was reset; it is adopted verbatim.
    pub fn apply_snapshot(&mut self, snapshot: ModeAccumulation) -> AccumulationOutcome {
        if self.strategy != AccumulationStrategy::Snapshot {
            warn!("Accumulator: snapshot ignored under {:?} strategy", self.strategy);
            return AccumulationOutcome::Ignored;
        }

        if snapshot == self.totals {
            return AccumulationOutcome::Unchanged;
        }

        let regression = self.totals.first_regression(&snapshot);
        self.totals = snapshot;

        match regression {
            Some(violation) => {
                self.resets_detected += 1;
                warn!("Accumulator: {}, adopting snapshot as reset", violation);
                AccumulationOutcome::ResetDetected(violation)
            }
            None => AccumulationOutcome::Advanced,
        }
    }

    // ── Event strategy ────────────────────────────────────────

    /// Fold one sample into the totals.
    ///
    /// Duration mode credits `sample.mode` with the time since the previous
    /// sample.  Out-of-order samples and gaps above the configured maximum
    /// credit nothing.
    pub fn record_sample(&mut self, sample: &Sample) -> AccumulationOutcome {
        let unit = match self.strategy {
            AccumulationStrategy::Event(unit) => unit,
            AccumulationStrategy::Snapshot => {
                warn!("Accumulator: sample ignored under snapshot strategy");
                return AccumulationOutcome::Ignored;
            }
        };

        let amount = match unit {
            EventUnit::Count => 1.0,
            EventUnit::Duration => self.elapsed_since_last(sample.timestamp),
        };

        if amount > 0.0 {
            self.totals.add(sample.mode, amount);
            AccumulationOutcome::Advanced
        } else {
            AccumulationOutcome::Unchanged
        }
    }

    fn elapsed_since_last(&mut self, at: DateTime<Utc>) -> f64 {
        let Some(prev) = self.last_sample_at else {
            self.last_sample_at = Some(at);
            return 0.0;
        };
        if at <= prev {
            return 0.0;
        }
        self.last_sample_at = Some(at);

        let secs = (at - prev).num_milliseconds() as f64 / 1000.0;
        if secs > self.max_gap_secs {
            info!(
                "Accumulator: {:.1}s gap exceeds {:.1}s, not credited",
                secs, self.max_gap_secs
            );
            return 0.0;
        }
        secs
    }

    /// Forget the previous sample time so the next sample starts a fresh
    /// interval (called when the link drops).
    pub fn break_continuity(&mut self) {
        self.last_sample_at = None;
    }

    // ── Reset ─────────────────────────────────────────────────

    /// Zero every entry.  Idempotent.
    pub fn reset(&mut self) {
        self.totals = ModeAccumulation::ZERO;
        self.last_sample_at = None;
    }
}
