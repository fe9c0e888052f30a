//! Transport I/O workers.
//!
//! Blocking network and stdin reads live on dedicated threads so the
//! control loop never stalls.  Workers talk to the loop only through the
//! [`TransportBridge`].
//!
//! ```text
//!  ┌──────────────────────────────┐          ┌──────────────┐
//!  │ poll worker (bandwatch-io)   │◀─request─│              │
//!  │   PollPort::{health,         │          │ Control Loop │
//!  │     fetch_current, reset}    │─inbound─▶│              │
//!  └──────────────────────────────┘          │              │
//!  ┌──────────────────────────────┐          │              │
//!  │ stream reader (bandwatch-rx) │─inbound─▶│              │
//!  │   MessageSource::next_message│          └──────────────┘
//!  └──────────────────────────────┘
//! ```

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::app::ports::{MessageSource, PollPort};
use crate::events::{Inbound, TransportBridge, TransportRequest};

// ── Poll worker ──────────────────────────────────────────────

/// Serve requests until [`TransportRequest::Shutdown`].
pub fn run_poll_worker(port: &mut impl PollPort, bridge: &TransportBridge) {
    info!("IO: poll worker started");
    loop {
        let event = match bridge.recv_request() {
            TransportRequest::Health(token) => Inbound::Health {
                token,
                result: port.health(),
            },
            TransportRequest::Snapshot(token) => Inbound::Snapshot {
                token,
                result: port.fetch_current(),
            },
            TransportRequest::Reset(token) => Inbound::ResetAck {
                token,
                result: port.reset(),
            },
            TransportRequest::Shutdown => break,
        };
        bridge.push_inbound(event);
    }
    info!("IO: poll worker stopped");
}

pub fn spawn_poll_worker<P>(mut port: P, bridge: Arc<TransportBridge>) -> io::Result<JoinHandle<()>>
where
    P: PollPort + Send + 'static,
{
    thread::Builder::new()
        .name("bandwatch-io".into())
        .spawn(move || run_poll_worker(&mut port, &bridge))
}

// ── Stream reader ────────────────────────────────────────────

/// Forward messages until the source ends, then report the closure.
pub fn run_stream_reader(source: &mut impl MessageSource, bridge: &TransportBridge) {
    info!("IO: stream reader started");
    loop {
        match source.next_message() {
            Ok(msg) => bridge.send_inbound(Inbound::Message(msg)),
            Err(e) => {
                warn!("IO: stream ended: {}", e);
                bridge.send_inbound(Inbound::StreamClosed(e));
                return;
            }
        }
    }
}

/// The reader blocks on its source and is not joined on shutdown.
pub fn spawn_stream_reader<S>(mut source: S, bridge: Arc<TransportBridge>) -> io::Result<JoinHandle<()>>
where
    S: MessageSource + Send + 'static,
{
    thread::Builder::new()
        .name("bandwatch-rx".into())
        .spawn(move || run_stream_reader(&mut source, &bridge))
}
