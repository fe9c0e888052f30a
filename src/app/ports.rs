//! Port traits: the hexagonal boundary between the session and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Session (domain)
//! ```
//!
//! Driven adapters (HTTP client, broker feed, clock, sinks, config files)
//! implement these traits.  The [`Session`](super::service::Session) takes
//! the sink and clock readings at its call sites; the transport ports are
//! driven by the I/O worker, so the domain core never touches the network.
//!
//! All port errors are typed; callers handle every variant explicitly.

use chrono::{DateTime, Utc};

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::events::StreamMessage;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → log / stdout)
// ───────────────────────────────────────────────────────────────

/// The session emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.  Tests substitute a manual clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

// ───────────────────────────────────────────────────────────────
// Poll port (driven adapter: domain ↔ band REST API)
// ───────────────────────────────────────────────────────────────

/// Blocking client for the band API.  Each call is one HTTP exchange and
/// must give up after the adapter's own timeout.
pub trait PollPort {
    /// `GET /health`.
    fn health(&mut self) -> Result<(), TransportError>;

    /// `GET /api/band/current`, returning the raw body.
    fn fetch_current(&mut self) -> Result<String, TransportError>;

    /// `POST /api/band/reset`.
    fn reset(&mut self) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Message source port (driven adapter: broker → domain)
// ───────────────────────────────────────────────────────────────

/// A subscription that yields messages until the source ends.
pub trait MessageSource {
    /// Block for the next message.  `Err(TransportError::Closed)` once the
    /// source is exhausted.
    fn next_message(&mut self) -> Result<StreamMessage, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists session configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns [`SessionConfig::default()`] if none
    /// is stored.
    fn load(&self) -> Result<SessionConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SessionConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found at the given location.
    NotFound,
    /// Stored config failed to deserialise.
    Corrupted(String),
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError(String),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
