//! Sample decoder: raw payloads in, canonical records out.
//!
//! Every function here is pure: the caller supplies `received_at`, which
//! stands in for any timestamp the payload omits.  Failures are typed
//! [`DecodeError`]s; the session logs and drops them without touching
//! accumulated state.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde_json::{Map, Value};

use super::{Alert, Mode, OUT_OF_RANGE_CM, Sample};
use crate::accumulator::ModeAccumulation;
use crate::error::DecodeError;

/// Epoch timestamps before this are an unsynced device clock (pre-NTP).
const EPOCH_2020: i64 = 1_577_836_800;

/// Kind assigned to alerts that arrive as plain text.
pub const FREE_TEXT_KIND: &str = "device";
/// Severity used when a payload does not state one.
pub const DEFAULT_SEVERITY: &str = "info";

/// Everything one poll of the snapshot endpoint carries.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot {
    pub sample: Sample,
    /// Server-side per-mode totals.
    pub totals: ModeAccumulation,
    /// The server's currently active alerts.
    pub alerts: Vec<Alert>,
    /// Whether the server still hears from the device.
    pub is_connected: bool,
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Decode a JSON sample payload (`{mode, heart_rate, distance_cm, ...}`).
pub fn decode_sample(payload: &str, received_at: DateTime<Utc>) -> Result<Sample, DecodeError> {
    decode_sample_value(&parse_json(payload)?, received_at)
}

/// Decode an already-parsed JSON sample.
pub fn decode_sample_value(
    value: &Value,
    received_at: DateTime<Utc>,
) -> Result<Sample, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let mode = mode_field(obj)?;
    let heart_rate = number_field(obj, "heart_rate")?;
    let distance_cm = distance_field(obj)?;
    let timestamp = timestamp_field(obj, received_at)?;
    let device = obj.get("device").and_then(Value::as_str).map(str::to_owned);

    Ok(Sample {
        device,
        mode,
        heart_rate,
        distance_cm,
        timestamp,
    })
}

// ---------------------------------------------------------------------------
// Poll snapshot
// ---------------------------------------------------------------------------

/// Decode the body of `GET /api/band/current`.
///
/// Individual malformed alert records are skipped with a warning; a bad
/// sample or totals block fails the whole snapshot.
pub fn decode_snapshot(
    body: &str,
    received_at: DateTime<Utc>,
) -> Result<PollSnapshot, DecodeError> {
    let value = parse_json(body)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let sample = decode_sample_value(
        obj.get("current_state")
            .ok_or(DecodeError::MissingField("current_state"))?,
        received_at,
    )?;

    let totals = decode_totals(
        obj.get("time_accumulation")
            .ok_or(DecodeError::MissingField("time_accumulation"))?,
    )?;

    let alerts = match obj.get("alerts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match decode_alert_value(item, received_at) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!("Skipping malformed alert record: {}", e);
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(DecodeError::NotAnObject),
    };

    let is_connected = obj
        .get("is_connected")
        .and_then(Value::as_bool)
        .ok_or(DecodeError::MissingField("is_connected"))?;

    Ok(PollSnapshot {
        sample,
        totals,
        alerts,
        is_connected,
    })
}

/// Decode a `{WorkOFF, WorkON, Working}` totals object.  All three keys are
/// required; values are coerced to non-negative.
pub fn decode_totals(value: &Value) -> Result<ModeAccumulation, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let mut values = [0.0; Mode::COUNT];
    for mode in Mode::ALL {
        values[mode.index()] = number_field(obj, mode.as_str())?;
    }
    Ok(ModeAccumulation::from_values(values))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Decode a structured alert record.  The kind may be spelled `kind` or
/// `type`; severity defaults to `info`.
pub fn decode_alert_value(value: &Value, received_at: DateTime<Utc>) -> Result<Alert, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let kind = obj
        .get("kind")
        .or_else(|| obj.get("type"))
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("kind"))?;
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("message"))?;
    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SEVERITY);

    Ok(Alert {
        kind: kind.to_owned(),
        message: message.to_owned(),
        severity: severity.to_owned(),
        timestamp: timestamp_field(obj, received_at)?,
    })
}

/// Decode one message from the alert topic: structured JSON when it parses
/// as an alert record, otherwise the text itself.
pub fn decode_alert_payload(payload: &str, received_at: DateTime<Utc>) -> Result<Alert, DecodeError> {
    let text = payload.trim();
    if text.is_empty() {
        return Err(DecodeError::MissingField("message"));
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => {
            decode_alert_value(&value, received_at).or_else(|_| Ok(free_text(text, received_at)))
        }
        Ok(Value::String(s)) if !s.trim().is_empty() => Ok(free_text(s.trim(), received_at)),
        _ => Ok(free_text(text, received_at)),
    }
}

fn free_text(message: &str, received_at: DateTime<Utc>) -> Alert {
    Alert {
        kind: FREE_TEXT_KIND.to_owned(),
        message: message.to_owned(),
        severity: DEFAULT_SEVERITY.to_owned(),
        timestamp: received_at,
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn parse_json(payload: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(payload.trim()).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

fn mode_field(obj: &Map<String, Value>) -> Result<Mode, DecodeError> {
    match obj.get("mode") {
        None | Some(Value::Null) => Err(DecodeError::MissingField("mode")),
        Some(Value::String(name)) => {
            Mode::from_name(name).ok_or_else(|| DecodeError::UnknownMode(name.clone()))
        }
        Some(other) => Err(DecodeError::UnknownMode(other.to_string())),
    }
}

fn number_field(obj: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => coerce_number(value, field),
    }
}

/// `null` is how the firmware reports a timed-out echo; keep it as the
/// out-of-range sentinel rather than dropping the whole sample.
fn distance_field(obj: &Map<String, Value>) -> Result<f64, DecodeError> {
    match obj.get("distance_cm") {
        None => Err(DecodeError::MissingField("distance_cm")),
        Some(Value::Null) => Ok(OUT_OF_RANGE_CM),
        Some(value) => coerce_number(value, "distance_cm"),
    }
}

/// Numbers and numeric strings are accepted; negatives clamp to zero;
/// NaN and infinities are rejected.
pub(crate) fn coerce_number(value: &Value, field: &'static str) -> Result<f64, DecodeError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(x) if x.is_finite() => Ok(x.max(0.0)),
        _ => Err(DecodeError::NotNumeric(field)),
    }
}

fn timestamp_field(
    obj: &Map<String, Value>,
    received_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, DecodeError> {
    match obj.get("timestamp") {
        None | Some(Value::Null) => Ok(received_at),
        Some(Value::String(s)) => parse_timestamp(s),
        Some(Value::Number(n)) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| DecodeError::InvalidTimestamp(n.to_string()))?;
            if secs < EPOCH_2020 as f64 {
                return Ok(received_at);
            }
            let whole = secs.trunc() as i64;
            let nanos = (secs.fract() * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
                .ok_or_else(|| DecodeError::InvalidTimestamp(n.to_string()))
        }
        Some(other) => Err(DecodeError::InvalidTimestamp(other.to_string())),
    }
}

/// RFC 3339, or naive ISO-8601 (as Python's `isoformat()` writes it)
/// interpreted as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DecodeError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DecodeError::InvalidTimestamp(s.to_owned()))
}
