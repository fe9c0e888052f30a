//! Transport bridge: the bounded channels between the I/O thread and the
//! control loop.
//!
//! Both transports (REST poll and message stream) produce the same
//! [`Inbound`] events, so the session sees one sequential timeline and is
//! testable without a network.
//!
//! ```text
//! ┌──────────────┐   TransportRequest   ┌──────────────┐
//! │ Control Loop │─────────────────────▶│  I/O Thread  │
//! │   (Session)  │◀─────────────────────│ (ureq/stdin) │
//! └──────────────┘       Inbound        └──────────────┘
//! ```
//!
//! Channels are `embassy-sync` MPMC queues guarded by a critical-section
//! mutex; the bridge is shared between threads behind an `Arc`.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;
use log::warn;

use crate::error::TransportError;
use crate::scheduler::PollToken;

/// Channel depth for inbound events.  Stream bursts are absorbed here.
pub const INBOUND_DEPTH: usize = 64;

/// Channel depth for outbound requests.  At most one poll is in flight,
/// plus health/reset/shutdown.
pub const REQUEST_DEPTH: usize = 4;

// ── Inbound (I/O → control loop) ──────────────────────────────

/// One message as received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Answer to [`TransportRequest::Health`].
    Health {
        token: PollToken,
        result: Result<(), TransportError>,
    },
    /// Body of `GET /api/band/current`.
    Snapshot {
        token: PollToken,
        result: Result<String, TransportError>,
    },
    /// Answer to [`TransportRequest::Reset`].
    ResetAck {
        token: PollToken,
        result: Result<(), TransportError>,
    },
    /// A stream message on any subscribed topic.
    Message(StreamMessage),
    /// The stream source ended or failed.
    StreamClosed(TransportError),
}

// ── Outbound (control loop → I/O) ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRequest {
    /// `GET /health`, gates the initial connect.
    Health(PollToken),
    /// `GET /api/band/current`.
    Snapshot(PollToken),
    /// `POST /api/band/reset`.
    Reset(PollToken),
    /// Stop the I/O thread.
    Shutdown,
}

// ── Bridge ────────────────────────────────────────────────────

pub struct TransportBridge {
    inbound: Channel<CriticalSectionRawMutex, Inbound, INBOUND_DEPTH>,
    requests: Channel<CriticalSectionRawMutex, TransportRequest, REQUEST_DEPTH>,
}

impl Default for TransportBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBridge {
    pub const fn new() -> Self {
        Self {
            inbound: Channel::new(),
            requests: Channel::new(),
        }
    }

    /// Deliver an event to the control loop.  Returns `false` (and logs)
    /// if the queue is full and the event was dropped.
    pub fn push_inbound(&self, event: Inbound) -> bool {
        if self.inbound.try_send(event).is_err() {
            warn!("Bridge: inbound queue full, dropping event");
            return false;
        }
        true
    }

    /// Deliver an event, waiting for space.  Used by the stream reader so
    /// bursts apply backpressure instead of losing samples.
    pub fn send_inbound(&self, event: Inbound) {
        future::block_on(self.inbound.send(event));
    }

    pub fn try_inbound(&self) -> Option<Inbound> {
        self.inbound.try_receive().ok()
    }

    /// Wait up to `timeout` for the next inbound event.
    pub fn recv_inbound_timeout(&self, timeout: Duration) -> Option<Inbound> {
        future::block_on(future::or(
            async { Some(self.inbound.receive().await) },
            async {
                async_io_mini::Timer::after(timeout).await;
                None
            },
        ))
    }

    /// Queue a request for the I/O thread.
    pub fn push_request(&self, request: TransportRequest) -> bool {
        if self.requests.try_send(request).is_err() {
            warn!("Bridge: request queue full, dropping {:?}", request);
            return false;
        }
        true
    }

    pub fn try_request(&self) -> Option<TransportRequest> {
        self.requests.try_receive().ok()
    }

    /// Block the I/O thread until the control loop sends a request.
    pub fn recv_request(&self) -> TransportRequest {
        future::block_on(self.requests.receive())
    }
}
