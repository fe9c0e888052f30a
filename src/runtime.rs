//! Control loop.
//!
//! Owns the [`Session`] and drives it from three sources: inbound transport
//! events, the tick deadline, and the reconnect backoff.  All session
//! mutation happens on this thread.
//!
//! ```text
//!   loop {
//!       wait ≤ tick for Inbound ──▶ Session::apply (drain queue)
//!       Session::tick           ──▶ TransportRequest ──▶ I/O thread
//!       not yet established?    ──▶ reconnect after backoff
//!   }
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::adapters::io_task::{spawn_poll_worker, spawn_stream_reader};
use crate::adapters::line_stream::LineMessageSource;
use crate::adapters::rest::RestPollClient;
use crate::adapters::time::SystemClock;
use crate::app::commands::SessionCommand;
use crate::app::ports::{Clock, EventSink};
use crate::app::service::{Session, SessionStats};
use crate::config::{SessionConfig, TransportConfig};
use crate::error::{Result, TransportError};
use crate::events::{Inbound, TransportBridge};
use crate::fsm::LinkState;

const INITIAL_BACKOFF_SECS: i64 = 2;
const MAX_BACKOFF_SECS: i64 = 60;

// ───────────────────────────────────────────────────────────────
// Reconnect backoff
// ───────────────────────────────────────────────────────────────

/// Exponential retry delay for a link that never came up
/// (2 s → 4 s → 8 s … capped at 60 s).
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    delay_secs: i64,
    next_attempt: Option<DateTime<Utc>>,
    attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self {
            delay_secs: INITIAL_BACKOFF_SECS,
            next_attempt: None,
            attempts: 0,
        }
    }

    /// Returns `true` when an attempt should be made now.  The first call
    /// after a failure only arms the timer.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.next_attempt {
            None => {
                self.next_attempt = Some(now + chrono::Duration::seconds(self.delay_secs));
                false
            }
            Some(at) if now >= at => {
                self.next_attempt = None;
                self.attempts += 1;
                self.delay_secs = (self.delay_secs * 2).min(MAX_BACKOFF_SECS);
                true
            }
            Some(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.delay_secs = INITIAL_BACKOFF_SECS;
        self.next_attempt = None;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay_secs(&self) -> i64 {
        self.delay_secs
    }
}

// ───────────────────────────────────────────────────────────────
// Control loop
// ───────────────────────────────────────────────────────────────

pub struct ControlLoop<C: Clock> {
    session: Session,
    bridge: Arc<TransportBridge>,
    clock: C,
    tick: Duration,
    backoff: ReconnectBackoff,
}

impl<C: Clock> ControlLoop<C> {
    pub fn new(session: Session, bridge: Arc<TransportBridge>, clock: C) -> Self {
        let tick = Duration::from_millis(u64::from(session.config().tick_interval_ms));
        Self {
            session,
            bridge,
            clock,
            tick,
            backoff: ReconnectBackoff::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn backoff(&self) -> &ReconnectBackoff {
        &self.backoff
    }

    /// Run a command and forward any resulting request to the I/O thread.
    pub fn command(&mut self, cmd: SessionCommand, sink: &mut impl EventSink) -> Result<()> {
        let now = self.clock.now();
        if let Some(request) = self.session.handle_command(cmd, now, sink)? {
            self.bridge.push_request(request);
        }
        Ok(())
    }

    /// One iteration.  Returns `false` once the stream source has ended.
    pub fn step(&mut self, sink: &mut impl EventSink) -> bool {
        let mut open = true;
        if let Some(first) = self.bridge.recv_inbound_timeout(self.tick) {
            open &= self.apply(first, sink);
            while let Some(next) = self.bridge.try_inbound() {
                open &= self.apply(next, sink);
            }
        }

        let now = self.clock.now();
        if let Some(request) = self.session.tick(now, sink) {
            self.bridge.push_request(request);
        }
        self.maybe_reconnect(now, sink);
        open
    }

    fn apply(&mut self, inbound: Inbound, sink: &mut impl EventSink) -> bool {
        let closed = matches!(inbound, Inbound::StreamClosed(_));
        self.session.apply(inbound, self.clock.now(), sink);
        !closed
    }

    fn maybe_reconnect(&mut self, now: DateTime<Utc>, sink: &mut impl EventSink) {
        if self.session.is_established() {
            self.backoff.reset();
            return;
        }
        if self.session.status().state != LinkState::Disconnected || !self.backoff.poll(now) {
            return;
        }
        info!("Runtime: reconnect attempt {}", self.backoff.attempts());
        if let Err(e) = self.command(SessionCommand::Connect, sink) {
            warn!("Runtime: reconnect rejected: {}", e);
        }
    }

    /// Step until `stop` is raised or the stream ends.
    pub fn run_until(&mut self, stop: &AtomicBool, sink: &mut impl EventSink) {
        while !stop.load(Ordering::Relaxed) {
            if !self.step(sink) {
                info!("Runtime: stream source ended");
                break;
            }
        }
    }

    /// Close the session and tell the I/O thread to exit.
    pub fn shutdown(mut self, sink: &mut impl EventSink) -> SessionStats {
        let request = self.session.close(self.clock.now(), sink);
        self.bridge.push_request(request);
        self.session.stats()
    }
}

// ───────────────────────────────────────────────────────────────
// Entry point
// ───────────────────────────────────────────────────────────────

/// Open a session for `config`, spawn its transport worker, and run until
/// `stop` is raised.
pub fn run(config: SessionConfig, stop: &AtomicBool, sink: &mut impl EventSink) -> Result<SessionStats> {
    let clock = SystemClock;
    let bridge = Arc::new(TransportBridge::new());

    // Validate before any thread starts.
    let session = Session::open(config, clock.now(), sink)?;

    let worker: Option<JoinHandle<()>> = match &session.config().transport {
        TransportConfig::Poll(p) => {
            let client = RestPollClient::new(p);
            Some(spawn_poll_worker(client, bridge.clone()).map_err(spawn_error)?)
        }
        TransportConfig::Stream(_) => {
            // Blocked on stdin; left to exit with the process.
            let _detached = spawn_stream_reader(LineMessageSource::stdin(), bridge.clone())
                .map_err(spawn_error)?;
            None
        }
    };

    let mut control = ControlLoop::new(session, bridge, clock);
    control.command(SessionCommand::Connect, sink)?;
    control.run_until(stop, sink);
    let stats = control.shutdown(sink);

    if let Some(handle) = worker {
        if handle.join().is_err() {
            warn!("Runtime: I/O worker panicked");
        }
    }
    Ok(stats)
}

fn spawn_error(e: std::io::Error) -> crate::Error {
    TransportError::Io(e.to_string()).into()
}
