//! Shared mutable context threaded through every link-state handler.
//!
//! `LinkContext` is the blackboard the handlers read from and write to:
//! the liveness signal for this step, whether a session was ever
//! established, the clock reading, and the event produced by the last
//! state entry.

use chrono::{DateTime, Utc};

use super::LinkEvent;

/// Outcome of one liveness probe (poll response, stream message, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessSignal {
    Alive,
    Lost,
}

impl From<bool> for LivenessSignal {
    fn from(alive: bool) -> Self {
        if alive { Self::Alive } else { Self::Lost }
    }
}

/// The context passed to every state handler function.
#[derive(Debug, Clone)]
pub struct LinkContext {
    // -- Input --
    /// Signal for the current step.  Handlers `take()` it.
    pub signal: Option<LivenessSignal>,
    /// Wall-clock time of the current step.
    pub now: DateTime<Utc>,

    // -- Session memory --
    /// Set on first entry into `Connected`; cleared by an operator
    /// disconnect.  Gates the direct `Disconnected → Connected` toggle.
    pub established: bool,
    /// Number of `connect()` commands accepted so far.
    pub connect_attempts: u32,

    // -- Output --
    /// Time of the most recent transition.
    pub since: Option<DateTime<Utc>>,
    /// Event raised by the last `on_enter`, drained by the machine.
    pub pending: Option<LinkEvent>,
}

impl LinkContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            signal: None,
            now,
            established: false,
            connect_attempts: 0,
            since: None,
            pending: None,
        }
    }

    /// Record a transition into the state that `event` announces.
    pub fn announce(&mut self, event: LinkEvent) {
        self.since = Some(self.now);
        self.pending = Some(event);
    }
}
