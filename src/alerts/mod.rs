//! Alert reconciler: inbound alert batches in, visible alert set out.
//!
//! The display policy is fixed per session:
//!
//! - **replace-most-recent**: one alert at a time.  A newer alert
//!   supersedes it; otherwise it disappears `expiry_secs` after it was
//!   shown.  Expiry is a stored deadline checked by [`AlertReconciler::expire`]
//!   on every control tick.
//! - **list-all**: the latest batch, de-duplicated, shown verbatim.
//!
//! Both `ingest` and `expire` report whether the visible set changed so the
//! session only emits an event when something is actually different.

pub mod rules;

use chrono::{DateTime, Duration, Utc};
use heapless::HistoryBuffer;
use log::{debug, info};

use crate::config::AlertPolicy;
use crate::telemetry::Alert;

/// Capacity of the per-session alert history.
pub const HISTORY_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Bounded ring of every distinct alert surfaced this session.
/// Oldest entries fall off once it is full.
#[derive(Debug, Clone, Default)]
pub struct AlertHistory {
    ring: HistoryBuffer<Alert, HISTORY_CAPACITY>,
}

impl AlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `alert` unless an identical one is already recorded.
    /// Returns `true` if it was added.
    pub fn record(&mut self, alert: &Alert) -> bool {
        if self.contains(alert) {
            return false;
        }
        self.ring.write(alert.clone());
        true
    }

    pub fn contains(&self, alert: &Alert) -> bool {
        self.ring.oldest_ordered().any(|a| a.key() == alert.key())
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.ring.oldest_ordered()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct AlertReconciler {
    policy: AlertPolicy,
    visible: Vec<Alert>,
    /// Deadline of the single visible alert (replace-most-recent only).
    expires_at: Option<DateTime<Utc>>,
    /// Last alert shown under replace-most-recent, kept after expiry so a
    /// re-delivered copy does not resurface.
    last_shown: Option<Alert>,
    history: AlertHistory,
}

impl AlertReconciler {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            visible: Vec::new(),
            expires_at: None,
            last_shown: None,
            history: AlertHistory::new(),
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Alerts currently on display.
    pub fn visible(&self) -> &[Alert] {
        &self.visible
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Merge one batch.  Returns `true` if the visible set changed.
    pub fn ingest(&mut self, batch: &[Alert], now: DateTime<Utc>) -> bool {
        for alert in batch {
            if self.history.record(alert) {
                info!("ALERT [{}] {}: {}", alert.severity, alert.kind, alert.message);
            }
        }

        match self.policy {
            AlertPolicy::ListAll => self.ingest_list_all(batch),
            AlertPolicy::ReplaceMostRecent { expiry_secs } => {
                self.ingest_most_recent(batch, now, expiry_secs)
            }
        }
    }

    fn ingest_list_all(&mut self, batch: &[Alert]) -> bool {
        let mut next: Vec<Alert> = Vec::with_capacity(batch.len());
        for alert in batch {
            if !next.iter().any(|a| a.key() == alert.key()) {
                next.push(alert.clone());
            }
        }
        if next == self.visible {
            return false;
        }
        self.visible = next;
        true
    }

    fn ingest_most_recent(&mut self, batch: &[Alert], now: DateTime<Utc>, expiry_secs: u32) -> bool {
        // Latest timestamp wins; on a tie the later entry in the batch.
        let Some(candidate) = batch.iter().max_by_key(|a| a.timestamp) else {
            return false;
        };

        if let Some(last) = &self.last_shown {
            if last.key() == candidate.key() || candidate.timestamp < last.timestamp {
                debug!("ALERT: {} already shown or older, skipped", candidate.kind);
                return false;
            }
        }

        self.visible.clear();
        self.visible.push(candidate.clone());
        self.last_shown = Some(candidate.clone());
        self.expires_at = Some(now + Duration::seconds(i64::from(expiry_secs)));
        true
    }

    /// Drop the visible alert once its deadline has passed.  Returns `true`
    /// if something was removed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(deadline) if now >= deadline => {
                self.expires_at = None;
                let changed = !self.visible.is_empty();
                self.visible.clear();
                changed
            }
            _ => false,
        }
    }

    /// Forget everything, history included.
    pub fn clear(&mut self) {
        self.visible.clear();
        self.expires_at = None;
        self.last_shown = None;
        self.history.clear();
    }
}
