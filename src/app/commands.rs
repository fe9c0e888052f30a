//! Inbound commands to the session.
//!
//! These are operator actions (CLI, signal handler, tests) that the
//! [`Session`](super::service::Session) interprets and acts upon.

use crate::config::SessionConfig;

/// Commands the outside world can send into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Start a session: `Disconnected → Connecting`.
    Connect,

    /// End the session: `Connecting | Connected → Disconnected`.
    Disconnect,

    /// Zero accumulation and clear alerts.  In poll mode the server is
    /// reset too, retried until it acknowledges.
    Reset,

    /// Replace the configuration.  Only accepted while `Disconnected`.
    UpdateConfig(SessionConfig),
}
