//! A session shared between threads.
//!
//! The control loop is normally the only owner, but liveness can also be
//! reported from elsewhere (a watchdog, a second transport).  Every access
//! runs inside one critical section, so concurrent signals are serialised
//! and each transition still raises exactly one event.

use core::cell::RefCell;

use chrono::{DateTime, Utc};
use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::events::{Inbound, TransportRequest};
use crate::fsm::ConnectionStatus;

use super::commands::SessionCommand;
use super::events::RenderFrame;
use super::ports::EventSink;
use super::service::Session;

pub struct SharedSession {
    inner: CriticalSectionMutex<RefCell<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: CriticalSectionMutex::new(RefCell::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn apply(&self, inbound: Inbound, now: DateTime<Utc>, sink: &mut impl EventSink) {
        self.with(|s| s.apply(inbound, now, sink));
    }

    pub fn tick(&self, now: DateTime<Utc>, sink: &mut impl EventSink) -> Option<TransportRequest> {
        self.with(|s| s.tick(now, sink))
    }

    pub fn handle_command(
        &self,
        cmd: SessionCommand,
        now: DateTime<Utc>,
        sink: &mut impl EventSink,
    ) -> crate::Result<Option<TransportRequest>> {
        self.with(|s| s.handle_command(cmd, now, sink))
    }

    pub fn status(&self) -> ConnectionStatus {
        self.with(|s| s.status())
    }

    pub fn frame(&self) -> RenderFrame {
        self.with(|s| s.frame())
    }

    pub fn into_inner(self) -> Session {
        self.inner.into_inner().into_inner()
    }
}
