//! Telemetry records: the canonical shapes everything downstream consumes.
//!
//! The [`decode`] submodule turns inbound payloads into these; the
//! [`raw`] submodule assembles samples from devices that publish each
//! reading on its own topic.

pub mod decode;
pub mod raw;

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Distance the firmware reports when the ultrasonic echo times out.
/// Anything at or above [`OUT_OF_RANGE_CM`] is "nobody near the desk".
pub const OUT_OF_RANGE_CM: f64 = 999.0;
const OUT_OF_RANGE_FLOOR_CM: f64 = 900.0;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Operating mode of the wearer at an instant.  Closed and exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    /// No heartbeat detected: off shift.
    #[serde(rename = "WorkOFF")]
    WorkOff,
    /// On shift but away from the workstation.
    #[serde(rename = "WorkON")]
    WorkOn,
    /// On shift and at the workstation.
    #[serde(rename = "Working")]
    Working,
}

impl Mode {
    /// Fixed iteration order used by accumulation and projection.
    pub const ALL: [Mode; 3] = [Mode::WorkOff, Mode::WorkOn, Mode::Working];

    pub const COUNT: usize = 3;

    /// Wire name, as the device and API spell it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkOff => "WorkOFF",
            Self::WorkOn => "WorkON",
            Self::Working => "Working",
        }
    }

    /// Parse a wire name.  Exact match only.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Position in [`Mode::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Derive the mode from raw readings, matching the band firmware:
    /// no pulse → `WorkOFF`; pulse and far (or out of range) → `WorkON`;
    /// pulse and within `threshold_cm` → `Working`.
    pub fn classify(heart_rate: f64, distance_cm: f64, threshold_cm: f64) -> Self {
        if heart_rate.round() <= 0.0 {
            Self::WorkOff
        } else if distance_cm >= OUT_OF_RANGE_FLOOR_CM || distance_cm > threshold_cm {
            Self::WorkOn
        } else {
            Self::Working
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// One decoded reading from the wearable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device identifier, when the payload carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub mode: Mode,
    /// Beats per minute, ≥ 0.
    pub heart_rate: f64,
    /// Proximity to the workstation in centimetres, ≥ 0, unrounded.
    pub distance_cm: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Distance rounded to whole centimetres for display.
    pub fn distance_display(&self) -> u32 {
        self.distance_cm.round() as u32
    }

    /// Heart rate rounded to whole beats for display.
    pub fn heart_rate_display(&self) -> u32 {
        self.heart_rate.round() as u32
    }

    /// True if the distance is the firmware's "no echo" sentinel.
    pub fn distance_out_of_range(&self) -> bool {
        self.distance_cm >= OUT_OF_RANGE_FLOOR_CM
    }
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// An alert record as surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Machine-readable category, e.g. `overworking`.
    pub kind: String,
    pub message: String,
    /// Free-form severity (`high`, `medium`, `info`, ...).
    pub severity: String,
    pub timestamp: DateTime<Utc>,
}

/// Identity used for de-duplication.
pub type AlertKey<'a> = (&'a str, &'a str, DateTime<Utc>);

impl Alert {
    pub fn key(&self) -> AlertKey<'_> {
        (&self.kind, &self.message, self.timestamp)
    }
}
