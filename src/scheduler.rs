//! Poll scheduler.
//!
//! Decides when the next snapshot request goes out and tracks the one
//! request allowed in flight.
//!
//! ```text
//!  tick ──▶ stopped?      ──yes──▶ nothing
//!            │no
//!            ▼
//!          in flight?     ──yes──▶ older than timeout? ──yes──▶ TimedOut(token)
//!            │no                        │no
//!            │                          └──▶ Skipped (counted)
//!            ▼
//!          next_due ≤ now? ──yes──▶ Due(token), next_due += interval
//! ```
//!
//! Tokens increase monotonically; a response is only accepted if its token
//! matches the in-flight one, so anything late (after a timeout, a reset
//! or teardown) is discarded by [`PollScheduler::complete`].

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

/// Identifies one outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollToken(pub u64);

/// What one scheduler step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Nothing to do.
    Idle,
    /// Send a request carrying this token.
    Due(PollToken),
    /// A request is outstanding and not yet late.
    Skipped,
    /// The outstanding request exceeded the timeout and was abandoned.
    TimedOut(PollToken),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    token: PollToken,
    sent_at: DateTime<Utc>,
}

pub struct PollScheduler {
    interval: Duration,
    timeout: Duration,
    running: bool,
    next_due: Option<DateTime<Utc>>,
    in_flight: Option<InFlight>,
    next_token: u64,
    skipped: u64,
    timeouts: u64,
}

impl PollScheduler {
    pub fn new(interval_ms: u32, timeout_ms: u32) -> Self {
        Self {
            interval: Duration::milliseconds(i64::from(interval_ms)),
            timeout: Duration::milliseconds(i64::from(timeout_ms)),
            running: false,
            next_due: None,
            in_flight: None,
            next_token: 1,
            skipped: 0,
            timeouts: 0,
        }
    }

    /// Start polling; the first request is due immediately.
    pub fn start(&mut self, now: DateTime<Utc>) {
        info!(
            "Scheduler: polling every {}ms (timeout {}ms)",
            self.interval.num_milliseconds(),
            self.timeout.num_milliseconds()
        );
        self.running = true;
        self.next_due = Some(now);
    }

    /// Stop polling and abandon any in-flight request.
    pub fn stop(&mut self) {
        if self.running {
            info!("Scheduler: stopped ({} skipped, {} timed out)", self.skipped, self.timeouts);
        }
        self.running = false;
        self.next_due = None;
        self.cancel_in_flight();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Issue a token outside the periodic schedule (health probe, reset).
    /// Replaces any in-flight request.
    pub fn issue(&mut self, now: DateTime<Utc>) -> PollToken {
        let token = PollToken(self.next_token);
        self.next_token += 1;
        self.in_flight = Some(InFlight { token, sent_at: now });
        token
    }

    /// One scheduler step.  Call on every control tick.
    pub fn poll(&mut self, now: DateTime<Utc>) -> PollDecision {
        if let Some(flight) = self.in_flight {
            if now - flight.sent_at >= self.timeout {
                warn!(
                    "Scheduler: request #{} outstanding for {}ms, abandoned",
                    flight.token.0,
                    (now - flight.sent_at).num_milliseconds()
                );
                self.in_flight = None;
                self.timeouts += 1;
                return PollDecision::TimedOut(flight.token);
            }
            if self.is_due(now) {
                self.skipped += 1;
                debug!("Scheduler: tick skipped, #{} still in flight", flight.token.0);
                return PollDecision::Skipped;
            }
            return PollDecision::Idle;
        }

        if !self.is_due(now) {
            return PollDecision::Idle;
        }

        // Catch up without bursting: the next slot is one interval from now
        // if we fell behind by more than one period.
        let due = self.next_due.unwrap_or(now);
        let next = due + self.interval;
        self.next_due = Some(if next <= now { now + self.interval } else { next });

        PollDecision::Due(self.issue(now))
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.running && self.next_due.is_some_and(|due| now >= due)
    }

    /// Settle `token`.  Returns `false` for stale tokens, which the caller
    /// must discard.
    pub fn complete(&mut self, token: PollToken) -> bool {
        match self.in_flight {
            Some(flight) if flight.token == token => {
                self.in_flight = None;
                true
            }
            _ => {
                debug!("Scheduler: stale response #{} discarded", token.0);
                false
            }
        }
    }

    pub fn cancel_in_flight(&mut self) {
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<PollToken> {
        self.in_flight.map(|f| f.token)
    }

    /// Ticks that found a request still outstanding.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
