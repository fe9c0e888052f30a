//! Connection state machine: function-pointer table engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  StateTable                                                   │
//! │  ┌──────────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ LinkState    │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├──────────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Disconnected │ fn(ctx)   │          │ fn(ctx)->Option<> │  │
//! │  │ Connecting   │ fn(ctx)   │          │ fn(ctx)->Option<> │  │
//! │  │ Connected    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └──────────────┴───────────┴──────────┴───────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each step the engine calls `on_update` for the **current** state.  If it
//! returns `Some(next)`, the engine runs `on_exit` for the current state,
//! then `on_enter` for the next.  Every `on_enter` announces exactly one
//! [`LinkEvent`]; since a transition always changes state, the event stream
//! never repeats itself.
//!
//! [`ConnectionMachine`] wraps the engine with the operator commands
//! (`connect`, `disconnect`) and the liveness input.

pub mod context;
pub mod states;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::error::TransitionError;
use context::{LinkContext, LivenessSignal};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all link states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl LinkState {
    pub const COUNT: usize = 3;

    /// Convert an index back to `LinkState`.  Out-of-range maps to
    /// `Disconnected`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            1 => Self::Connecting,
            2 => Self::Connected,
            0 => Self::Disconnected,
            _ => {
                debug_assert!(false, "invalid link state index: {idx}");
                Self::Disconnected
            }
        }
    }
}

/// Emitted once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkEvent {
    Connecting,
    Connected,
    Disconnected,
}

impl LinkEvent {
    /// The state this event announces.
    pub fn state(self) -> LinkState {
        match self {
            Self::Connecting => LinkState::Connecting,
            Self::Connected => LinkState::Connected,
            Self::Disconnected => LinkState::Disconnected,
        }
    }
}

/// Current state plus when it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    /// `None` until the first transition.
    pub since: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut LinkContext);

/// Signature for the per-step update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut LinkContext) -> Option<LinkState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single link state.
pub struct StateDescriptor {
    pub id: LinkState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The table-driven engine.  Holds no context of its own; the caller
/// threads a [`LinkContext`] through every call.
pub struct Fsm {
    /// Fixed-size table indexed by `LinkState as usize`.
    table: [StateDescriptor; LinkState::COUNT],
    current: usize,
    transitions: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; LinkState::COUNT], initial: LinkState) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once after construction.
    pub fn start(&mut self, ctx: &mut LinkContext) {
        info!("LINK: starting in {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one step.  Returns the new state if a transition ran.
    pub fn tick(&mut self, ctx: &mut LinkContext) -> Option<LinkState> {
        let next = (self.table[self.current].on_update)(ctx)?;
        if next as usize == self.current {
            return None;
        }
        self.transition(next, ctx);
        Some(next)
    }

    /// Transition immediately, bypassing `on_update`.  No-op when already
    /// in `next`.
    pub fn force_transition(&mut self, next: LinkState, ctx: &mut LinkContext) -> bool {
        if next as usize == self.current {
            return false;
        }
        self.transition(next, ctx);
        true
    }

    pub fn current_state(&self) -> LinkState {
        LinkState::from_index(self.current)
    }

    /// Total transitions run since construction.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: LinkState, ctx: &mut LinkContext) {
        let next_idx = next as usize;

        info!(
            "LINK: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.transitions += 1;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Connection machine (commands + liveness)
// ---------------------------------------------------------------------------

/// The connection state machine as the session sees it.
pub struct ConnectionMachine {
    fsm: Fsm,
    ctx: LinkContext,
}

impl ConnectionMachine {
    /// A machine in `Disconnected`.  The initial state is not a transition
    /// and raises no event.
    pub fn new(now: DateTime<Utc>) -> Self {
        let mut fsm = Fsm::new(states::build_state_table(), LinkState::Disconnected);
        let mut ctx = LinkContext::new(now);
        fsm.start(&mut ctx);
        ctx.pending = None;
        ctx.since = None;
        Self { fsm, ctx }
    }

    /// `Disconnected → Connecting`.
    pub fn connect(&mut self, now: DateTime<Utc>) -> Result<LinkEvent, TransitionError> {
        let state = self.state();
        if state != LinkState::Disconnected {
            return Err(TransitionError::AlreadyConnecting(state));
        }
        self.ctx.now = now;
        self.fsm.force_transition(LinkState::Connecting, &mut self.ctx);
        Ok(self.drain(LinkEvent::Connecting))
    }

    /// Operator-initiated `Connecting | Connected → Disconnected`.  Ends the
    /// session, so a later liveness success no longer reconnects.
    pub fn disconnect(&mut self, now: DateTime<Utc>) -> Result<LinkEvent, TransitionError> {
        let state = self.state();
        if state == LinkState::Disconnected {
            return Err(TransitionError::InvalidTransition {
                from: state,
                action: "disconnect",
            });
        }
        self.ctx.now = now;
        self.ctx.established = false;
        self.fsm.force_transition(LinkState::Disconnected, &mut self.ctx);
        Ok(self.drain(LinkEvent::Disconnected))
    }

    /// Feed one liveness observation.  Returns the event if the state
    /// changed; identical repeated signals return `None`.
    pub fn signal(&mut self, alive: bool, now: DateTime<Utc>) -> Option<LinkEvent> {
        self.ctx.now = now;
        self.ctx.signal = Some(LivenessSignal::from(alive));
        let moved = self.fsm.tick(&mut self.ctx);
        self.ctx.signal = None;
        moved?;
        self.ctx.pending.take()
    }

    pub fn state(&self) -> LinkState {
        self.fsm.current_state()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state(),
            since: self.ctx.since,
        }
    }

    /// True once `Connected` has been reached and no operator disconnect
    /// has happened since.
    pub fn is_established(&self) -> bool {
        self.ctx.established
    }

    pub fn transitions(&self) -> u64 {
        self.fsm.transitions()
    }

    fn drain(&mut self, expected: LinkEvent) -> LinkEvent {
        self.ctx.pending.take().unwrap_or(expected)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Input {
        Connect,
        Disconnect,
        Signal(bool),
    }

    fn arb_input() -> impl Strategy<Value = Input> {
        prop_oneof![
            1 => Just(Input::Connect),
            1 => Just(Input::Disconnect),
            4 => any::<bool>().prop_map(Input::Signal),
        ]
    }

    proptest! {
        #[test]
        fn no_two_identical_consecutive_events(inputs in proptest::collection::vec(arb_input(), 1..200)) {
            let mut m = ConnectionMachine::new(Utc::now());
            let mut last: Option<LinkEvent> = None;

            for input in inputs {
                let event = match input {
                    Input::Connect => m.connect(Utc::now()).ok(),
                    Input::Disconnect => m.disconnect(Utc::now()).ok(),
                    Input::Signal(alive) => m.signal(alive, Utc::now()),
                };
                if let Some(e) = event {
                    prop_assert_ne!(Some(e), last, "repeated event {:?}", e);
                    prop_assert_eq!(e.state(), m.state());
                    last = Some(e);
                }
            }
        }
    }
}
