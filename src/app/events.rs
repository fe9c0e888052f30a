//! Outbound session events.
//!
//! The [`Session`](super::service::Session) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log a line, print JSON, repaint.

use serde::Serialize;

use crate::accumulator::ModeAccumulation;
use crate::fsm::{ConnectionStatus, LinkEvent};
use crate::projector::DistributionSlice;
use crate::telemetry::{Alert, Sample};

/// Structured events emitted by the session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AppEvent {
    /// The session was created (carries the initial frame).
    Started(RenderFrame),

    /// The link changed state.  Exactly one per transition.
    Link(LinkEvent),

    /// Sample, accumulation or alerts changed.
    Frame(RenderFrame),

    /// The visible alert set changed.
    AlertsChanged(Vec<Alert>),

    /// Accumulation and alerts were cleared by the operator.
    Reset,

    /// An inbound payload was rejected.  Nothing was mutated.
    DecodeFailed(String),

    /// A request failed or the stream broke.
    TransportFailed(String),

    /// The session was closed.
    Stopped,
}

/// Read-only view of the session, everything a renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub status: ConnectionStatus,
    /// Latest sample, kept at its last value while disconnected.
    pub sample: Option<Sample>,
    pub accumulation: ModeAccumulation,
    pub slices: Vec<DistributionSlice>,
    pub alerts: Vec<Alert>,
    /// Most recent decode or transport error, cleared by the next good
    /// update.
    pub last_error: Option<String>,
}
