//! Unified error types for the telemetry aggregator.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  Decode and transport errors are
//! recovered locally by the session; transition errors are misuse guards
//! returned to whoever issued the command.

use core::fmt;

use crate::fsm::LinkState;
use crate::telemetry::Mode;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An inbound payload could not be turned into a sample, snapshot or alert.
    Decode(DecodeError),
    /// A request failed or the stream broke.
    Transport(TransportError),
    /// A command was issued in a state that does not allow it.
    Transition(TransitionError),
    /// Configuration is invalid or was changed while a session is live.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Transition(e) => write!(f, "transition: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid JSON.
    InvalidJson(String),
    /// JSON parsed but the top level is not an object.
    NotAnObject,
    /// A required field is absent.
    MissingField(&'static str),
    /// A numeric field holds something that is not a finite number.
    NotNumeric(&'static str),
    /// The mode string is outside `{WorkOFF, WorkON, Working}`.
    UnknownMode(String),
    /// A timestamp string could not be parsed.
    InvalidTimestamp(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "invalid JSON: {msg}"),
            Self::NotAnObject => write!(f, "payload is not an object"),
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::NotNumeric(field) => write!(f, "field `{field}` is not numeric"),
            Self::UnknownMode(mode) => write!(f, "unknown mode `{mode}`"),
            Self::InvalidTimestamp(ts) => write!(f, "invalid timestamp `{ts}`"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the configured window.
    Timeout,
    /// The endpoint answered with a non-success HTTP status.
    Status(u16),
    /// Connection-level failure (DNS, refused, reset, read error).
    Io(String),
    /// The stream source ended.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Closed => write!(f, "stream closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Connection state machine misuse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// `connect()` while already `Connecting` or `Connected`.
    AlreadyConnecting(LinkState),
    /// Any other command that the current state does not accept.
    InvalidTransition {
        from: LinkState,
        action: &'static str,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnecting(state) => {
                write!(f, "connect requested while {state:?}")
            }
            Self::InvalidTransition { from, action } => {
                write!(f, "`{action}` is not valid while {from:?}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

impl From<TransitionError> for Error {
    fn from(e: TransitionError) -> Self {
        Self::Transition(e)
    }
}

// ---------------------------------------------------------------------------
// Monotonicity violation (warning, never fatal)
// ---------------------------------------------------------------------------

/// A snapshot regressed below the stored total for `mode`.  The accumulator
/// adopts the snapshot as a reset and reports this for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonotonicityViolation {
    pub mode: Mode,
    pub stored: f64,
    pub incoming: f64,
}

impl fmt::Display for MonotonicityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} regressed from {:.1} to {:.1}",
            self.mode, self.stored, self.incoming
        )
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
