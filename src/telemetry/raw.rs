//! Raw-topic assembler.
//!
//! Some band builds publish heart rate and distance as bare numbers on two
//! separate topics (`.../b` in bpm, `.../d` in metres) and leave mode
//! derivation to the consumer.  The assembler keeps the latest value of
//! each and yields a full [`Sample`] whenever either one changes.

use chrono::{DateTime, Utc};

use super::{Mode, Sample};
use crate::error::DecodeError;

/// Which raw reading a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChannel {
    /// Beats per minute.
    HeartRate,
    /// Metres to the workstation.
    Distance,
}

/// Latest-value cache for the split-topic format.
#[derive(Debug, Clone)]
pub struct RawTopicAssembler {
    heart_rate: f64,
    distance_cm: f64,
    threshold_cm: f64,
}

impl RawTopicAssembler {
    pub fn new(threshold_cm: f64) -> Self {
        Self {
            heart_rate: 0.0,
            distance_cm: 0.0,
            threshold_cm,
        }
    }

    /// Apply one raw message and return the resulting sample.
    ///
    /// A payload that is not a finite number leaves the cache untouched.
    pub fn update(
        &mut self,
        channel: RawChannel,
        payload: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Sample, DecodeError> {
        let field = match channel {
            RawChannel::HeartRate => "heart_rate",
            RawChannel::Distance => "distance_cm",
        };
        let value = payload
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(DecodeError::NotNumeric(field))?
            .max(0.0);

        match channel {
            RawChannel::HeartRate => self.heart_rate = value,
            RawChannel::Distance => self.distance_cm = value * 100.0,
        }

        Ok(Sample {
            device: None,
            mode: Mode::classify(self.heart_rate, self.distance_cm, self.threshold_cm),
            heart_rate: self.heart_rate,
            distance_cm: self.distance_cm,
            timestamp: received_at,
        })
    }

    /// Forget cached readings (session reset or reconnect).
    pub fn clear(&mut self) {
        self.heart_rate = 0.0;
        self.distance_cm = 0.0;
    }
}
