//! Concrete link-state handler functions and table builder.
//!
//! Each state is three plain `fn` pointers, no closures and no dynamic
//! dispatch.
//!
//! ```text
//!  DISCONNECTED ──[connect()]──▶ CONNECTING ──[alive]──▶ CONNECTED
//!       ▲  ▲                         │                      │
//!       │  └────────[lost]───────────┘                      │
//!       └──────────────────[lost | disconnect()]────────────┘
//!
//!  DISCONNECTED ──[alive, session established]──▶ CONNECTED
//! ```
//!
//! `connect()` and `disconnect()` are commands and go through
//! [`Fsm::force_transition`](super::Fsm::force_transition); the handlers
//! below only react to liveness signals.

use log::{debug, info};

use super::context::{LinkContext, LivenessSignal};
use super::{LinkEvent, LinkState, StateDescriptor};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per machine.
pub fn build_state_table() -> [StateDescriptor; LinkState::COUNT] {
    [
        // Index 0: Disconnected
        StateDescriptor {
            id: LinkState::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter),
            on_exit: None,
            on_update: disconnected_update,
        },
        // Index 1: Connecting
        StateDescriptor {
            id: LinkState::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 2: Connected
        StateDescriptor {
            id: LinkState::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: Some(connected_exit),
            on_update: connected_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter(ctx: &mut LinkContext) {
    ctx.announce(LinkEvent::Disconnected);
}

fn disconnected_update(ctx: &mut LinkContext) -> Option<LinkState> {
    match ctx.signal.take() {
        Some(LivenessSignal::Alive) if ctx.established => {
            info!("LINK: liveness restored, resuming session");
            Some(LinkState::Connected)
        }
        Some(LivenessSignal::Alive) => {
            debug!("LINK: liveness before any session, ignored");
            None
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut LinkContext) {
    ctx.connect_attempts = ctx.connect_attempts.saturating_add(1);
    ctx.announce(LinkEvent::Connecting);
    info!("LINK: connecting (attempt {})", ctx.connect_attempts);
}

fn connecting_update(ctx: &mut LinkContext) -> Option<LinkState> {
    match ctx.signal.take()? {
        LivenessSignal::Alive => Some(LinkState::Connected),
        LivenessSignal::Lost => {
            info!("LINK: connect attempt failed");
            Some(LinkState::Disconnected)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter(ctx: &mut LinkContext) {
    ctx.established = true;
    ctx.announce(LinkEvent::Connected);
}

fn connected_exit(ctx: &mut LinkContext) {
    if let Some(since) = ctx.since {
        let secs = (ctx.now - since).num_seconds();
        info!("LINK: was connected for {}s", secs);
    }
}

fn connected_update(ctx: &mut LinkContext) -> Option<LinkState> {
    match ctx.signal.take()? {
        LivenessSignal::Alive => None,
        LivenessSignal::Lost => Some(LinkState::Disconnected),
    }
}
