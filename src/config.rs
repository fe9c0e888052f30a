//! Session configuration parameters
//!
//! Everything here is fixed for the lifetime of one session.  Changing a
//! value means disconnect, update, reconnect.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // --- Transport ---
    /// Where samples come from.
    pub transport: TransportConfig,

    // --- Aggregation ---
    /// How inbound data turns into per-mode totals.
    pub accumulation: AccumulationStrategy,
    /// Gaps between samples longer than this (seconds) add nothing in
    /// duration mode.
    pub max_sample_gap_secs: f64,
    /// Distance (cm) at or below which a live wearer counts as `Working`
    /// when the mode is derived from raw readings.
    pub distance_threshold_cm: f64,

    // --- Alerts ---
    /// Which alerts stay visible.
    pub alert_policy: AlertPolicy,
    /// Locally evaluated alert rules (event strategy only).
    pub alert_rules: Option<AlertRules>,

    // --- Timing ---
    /// Control loop tick (milliseconds); bounds alert expiry and timeout
    /// detection latency.
    pub tick_interval_ms: u32,

    // --- Output ---
    pub output: OutputFormat,
}

/// Transport variant and its addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Poll(PollConfig),
    Stream(StreamConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Base URL of the band API, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Polling period (milliseconds).
    pub interval_ms: u32,
    /// A request outstanding longer than this is a liveness failure.
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Topic carrying one JSON sample per message.
    pub data_topic: String,
    /// Topic carrying free-text or JSON alerts.
    pub alert_topic: String,
    /// Raw heart-rate topic (bare bpm value), if the device publishes one.
    pub heart_rate_topic: Option<String>,
    /// Raw distance topic (bare value in metres), if the device publishes one.
    ///
    /// Each raw message yields a sample, so either raw topic requires
    /// [`EventUnit::Duration`].
    pub distance_topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationStrategy {
    /// Each inbound snapshot carries server-side totals; replace.
    Snapshot,
    /// Each inbound sample adds one increment in the given unit.
    Event(EventUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventUnit {
    /// One per sample.
    Count,
    /// Seconds elapsed since the previous sample.
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Show only the newest alert; it disappears after `expiry_secs`.
    ReplaceMostRecent { expiry_secs: u32 },
    /// Show the latest batch verbatim; upstream owns expiry.
    ListAll,
}

/// Thresholds for locally generated alerts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRules {
    /// `Working` total (seconds) above which `overworking` fires.
    pub overworking_secs: f64,
    /// `WorkON / Working` ratio above which `low_productivity` fires.
    pub low_productivity_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Human-readable log lines.
    Log,
    /// One JSON render frame per line on stdout.
    JsonLines,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::Poll(PollConfig::default()),
            accumulation: AccumulationStrategy::Snapshot,
            max_sample_gap_secs: 30.0,
            distance_threshold_cm: 50.0,
            alert_policy: AlertPolicy::ListAll,
            alert_rules: None,
            tick_interval_ms: 250,
            output: OutputFormat::Log,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            interval_ms: 1000, // 1 Hz
            timeout_ms: 5000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            data_topic: "TEF/device023/attrs/d".into(),
            alert_topic: "TEF/device023/attrs/a".into(),
            heart_rate_topic: None,
            distance_topic: None,
        }
    }
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            overworking_secs: 3600.0, // 1 h in Working
            low_productivity_ratio: 2.0,
        }
    }
}

impl AlertPolicy {
    /// The dashboard's floating-alert behaviour: newest only, 10 s.
    pub const fn replace_most_recent() -> Self {
        Self::ReplaceMostRecent { expiry_secs: 10 }
    }
}

impl SessionConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.transport {
            TransportConfig::Poll(p) => {
                if p.base_url.trim().is_empty() {
                    return Err(ConfigError::ValidationFailed("poll base_url is empty"));
                }
                if p.interval_ms == 0 {
                    return Err(ConfigError::ValidationFailed("poll interval_ms must be > 0"));
                }
                if p.timeout_ms == 0 {
                    return Err(ConfigError::ValidationFailed("poll timeout_ms must be > 0"));
                }
            }
            TransportConfig::Stream(s) => {
                if s.data_topic.is_empty() || s.alert_topic.is_empty() {
                    return Err(ConfigError::ValidationFailed("stream topics must be set"));
                }
                if s.data_topic == s.alert_topic {
                    return Err(ConfigError::ValidationFailed(
                        "data and alert topics must differ",
                    ));
                }
                for raw in [&s.heart_rate_topic, &s.distance_topic].into_iter().flatten() {
                    if raw == &s.data_topic || raw == &s.alert_topic {
                        return Err(ConfigError::ValidationFailed(
                            "raw topics must differ from data and alert topics",
                        ));
                    }
                }
                if s.heart_rate_topic.is_some() && s.heart_rate_topic == s.distance_topic {
                    return Err(ConfigError::ValidationFailed(
                        "heart rate and distance topics must differ",
                    ));
                }
                if self.accumulation == AccumulationStrategy::Snapshot {
                    return Err(ConfigError::ValidationFailed(
                        "stream transport carries no totals; use the event strategy",
                    ));
                }
                // One device cycle publishes on both raw topics.
                let raw = s.heart_rate_topic.is_some() || s.distance_topic.is_some();
                if raw && self.accumulation != AccumulationStrategy::Event(EventUnit::Duration) {
                    return Err(ConfigError::ValidationFailed(
                        "raw topics need the duration event unit",
                    ));
                }
            }
        }

        if !(self.max_sample_gap_secs > 0.0) {
            return Err(ConfigError::ValidationFailed("max_sample_gap_secs must be > 0"));
        }
        if !(self.distance_threshold_cm > 0.0) {
            return Err(ConfigError::ValidationFailed("distance_threshold_cm must be > 0"));
        }
        if let AlertPolicy::ReplaceMostRecent { expiry_secs: 0 } = self.alert_policy {
            return Err(ConfigError::ValidationFailed("alert expiry_secs must be > 0"));
        }
        if let Some(rules) = &self.alert_rules {
            if self.accumulation == AccumulationStrategy::Snapshot {
                return Err(ConfigError::ValidationFailed(
                    "local alert rules need the event strategy",
                ));
            }
            if !(rules.overworking_secs > 0.0) || !(rules.low_productivity_ratio > 0.0) {
                return Err(ConfigError::ValidationFailed("alert rule thresholds must be > 0"));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("tick_interval_ms must be > 0"));
        }
        Ok(())
    }
}
