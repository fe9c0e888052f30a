//! Session: the hexagonal core.
//!
//! [`Session`] owns the accumulator, connection machine, alert reconciler
//! and poll scheduler.  It never performs I/O: inbound transport results
//! arrive as [`Inbound`] events, outbound work leaves as
//! [`TransportRequest`]s, and observers are reached through the
//! [`EventSink`] port injected at each call site.
//!
//! ```text
//!   Inbound ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!               │           Session            │
//! Command ────▶ │ Accumulator · Link · Alerts  │ ──▶ TransportRequest
//!   tick  ────▶ │   Scheduler · Projector      │
//!               └──────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::accumulator::{AccumulationOutcome, ModeAccumulator};
use crate::alerts::AlertReconciler;
use crate::alerts::rules::RuleEvaluator;
use crate::config::{AccumulationStrategy, SessionConfig, TransportConfig};
use crate::error::{DecodeError, Error, Result, TransportError};
use crate::events::{Inbound, StreamMessage, TransportRequest};
use crate::fsm::{ConnectionMachine, ConnectionStatus, LinkEvent, LinkState};
use crate::projector::Projector;
use crate::scheduler::{PollDecision, PollScheduler, PollToken};
use crate::telemetry::decode::{decode_alert_payload, decode_sample, decode_snapshot};
use crate::telemetry::raw::{RawChannel, RawTopicAssembler};
use crate::telemetry::{Alert, Sample};

use super::commands::SessionCommand;
use super::events::{AppEvent, RenderFrame};
use super::ports::{ConfigError, EventSink};

// ───────────────────────────────────────────────────────────────
// Counters
// ───────────────────────────────────────────────────────────────

/// Running totals for the session, logged on close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub samples: u64,
    pub snapshots: u64,
    pub decode_failures: u64,
    pub transport_failures: u64,
    pub stale_responses: u64,
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

/// One device stream, from `open` to `close`.
pub struct Session {
    config: SessionConfig,
    link: ConnectionMachine,
    accumulator: ModeAccumulator,
    alerts: AlertReconciler,
    rules: Option<RuleEvaluator>,
    raw: RawTopicAssembler,
    /// Present in poll mode only.
    scheduler: Option<PollScheduler>,
    projector: Projector,

    sample: Option<Sample>,
    /// Last alert batch from upstream (server or alert topic).
    upstream_alerts: Vec<Alert>,
    /// Alerts raised by the local rules.
    rule_alerts: Vec<Alert>,
    last_error: Option<String>,
    /// A local reset the server has not yet acknowledged.  Snapshots are
    /// withheld until it is, or they would restore the old totals.
    pending_server_reset: bool,
    stats: SessionStats,
}

impl Session {
    /// Validate `config`, build every component, and announce the initial
    /// frame.
    pub fn open(config: SessionConfig, now: DateTime<Utc>, sink: &mut impl EventSink) -> Result<Self> {
        config.validate().map_err(config_error)?;

        let session = Self {
            link: ConnectionMachine::new(now),
            accumulator: ModeAccumulator::new(config.accumulation, config.max_sample_gap_secs),
            alerts: AlertReconciler::new(config.alert_policy),
            rules: config.alert_rules.map(RuleEvaluator::new),
            raw: RawTopicAssembler::new(config.distance_threshold_cm),
            scheduler: scheduler_for(&config),
            projector: Projector::default(),
            sample: None,
            upstream_alerts: Vec::new(),
            rule_alerts: Vec::new(),
            last_error: None,
            pending_server_reset: false,
            stats: SessionStats::default(),
            config,
        };

        info!(
            "Session opened ({:?} accumulation, {:?} alerts)",
            session.config.accumulation, session.config.alert_policy
        );
        sink.emit(&AppEvent::Started(session.frame()));
        Ok(session)
    }

    /// Stop polling, drop the in-flight request and end the link.
    /// Returns the request that stops the I/O thread.
    pub fn close(&mut self, now: DateTime<Utc>, sink: &mut impl EventSink) -> TransportRequest {
        if let Some(s) = self.scheduler.as_mut() {
            s.stop();
        }
        if let Ok(event) = self.link.disconnect(now) {
            self.on_link_event(event, sink);
        }
        info!("Session closed: {:?}", self.stats);
        sink.emit(&AppEvent::Stopped);
        TransportRequest::Shutdown
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.status()
    }

    /// Whether the link has reached `Connected` at least once.
    pub fn is_established(&self) -> bool {
        self.link.is_established()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn accumulator(&self) -> &ModeAccumulator {
        &self.accumulator
    }

    pub fn alerts(&self) -> &AlertReconciler {
        &self.alerts
    }

    /// True while a reset is waiting for the server's acknowledgement.
    pub fn pending_server_reset(&self) -> bool {
        self.pending_server_reset
    }

    pub fn in_flight(&self) -> Option<PollToken> {
        self.scheduler.as_ref().and_then(PollScheduler::in_flight)
    }

    /// Read-only snapshot of everything a renderer needs.
    pub fn frame(&self) -> RenderFrame {
        let accumulation = self.accumulator.current();
        RenderFrame {
            status: self.link.status(),
            sample: self.sample.clone(),
            accumulation,
            slices: self.projector.project(&accumulation),
            alerts: self.alerts.visible().to_vec(),
            last_error: self.last_error.clone(),
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an operator command.  Misuse (connect while connected,
    /// disconnect while disconnected, reconfigure while live) is returned
    /// as an error and changes nothing.
    pub fn handle_command(
        &mut self,
        cmd: SessionCommand,
        now: DateTime<Utc>,
        sink: &mut impl EventSink,
    ) -> Result<Option<TransportRequest>> {
        match cmd {
            SessionCommand::Connect => {
                let event = self.link.connect(now)?;
                self.on_link_event(event, sink);
                let request = self
                    .scheduler
                    .as_mut()
                    .map(|s| TransportRequest::Health(s.issue(now)));
                sink.emit(&AppEvent::Frame(self.frame()));
                Ok(request)
            }

            SessionCommand::Disconnect => {
                let event = self.link.disconnect(now)?;
                if let Some(s) = self.scheduler.as_mut() {
                    s.stop();
                }
                self.on_link_event(event, sink);
                sink.emit(&AppEvent::Frame(self.frame()));
                Ok(None)
            }

            SessionCommand::Reset => {
                self.reset_local();
                info!("Session: accumulation and alerts reset");
                sink.emit(&AppEvent::Reset);
                sink.emit(&AppEvent::Frame(self.frame()));

                // Poll mode mirrors the reset to the server.  If polling is
                // not running yet, the next due slot carries it.
                let Some(scheduler) = self.scheduler.as_mut() else {
                    return Ok(None);
                };
                self.pending_server_reset = true;
                let request = scheduler
                    .is_running()
                    .then(|| TransportRequest::Reset(scheduler.issue(now)));
                Ok(request)
            }

            SessionCommand::UpdateConfig(config) => {
                if self.link.state() != LinkState::Disconnected {
                    return Err(Error::Config("configuration is fixed while a session is live"));
                }
                config.validate().map_err(config_error)?;
                self.reconfigure(config);
                info!("Session: configuration replaced");
                sink.emit(&AppEvent::Frame(self.frame()));
                Ok(None)
            }
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One control-loop step: alert expiry, request timeout, next poll.
    pub fn tick(&mut self, now: DateTime<Utc>, sink: &mut impl EventSink) -> Option<TransportRequest> {
        if self.alerts.expire(now) {
            debug!("Session: alert expired");
            sink.emit(&AppEvent::AlertsChanged(self.alerts.visible().to_vec()));
            sink.emit(&AppEvent::Frame(self.frame()));
        }

        let decision = self.scheduler.as_mut()?.poll(now);
        match decision {
            PollDecision::Due(token) if self.pending_server_reset => {
                debug!("Session: retrying server reset");
                Some(TransportRequest::Reset(token))
            }
            PollDecision::Due(token) => Some(TransportRequest::Snapshot(token)),
            PollDecision::TimedOut(_) => {
                self.transport_failed(TransportError::Timeout, now, sink);
                None
            }
            PollDecision::Idle | PollDecision::Skipped => None,
        }
    }

    // ── Inbound handling ──────────────────────────────────────

    /// Apply one transport event.
    pub fn apply(&mut self, inbound: Inbound, now: DateTime<Utc>, sink: &mut impl EventSink) {
        match inbound {
            Inbound::Health { token, result } => {
                if !self.accept(token) {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.last_error = None;
                        self.signal(true, now, sink);
                        if self.link.state() == LinkState::Connected {
                            if let Some(s) = self.scheduler.as_mut() {
                                s.start(now);
                            }
                        }
                        sink.emit(&AppEvent::Frame(self.frame()));
                    }
                    Err(e) => self.transport_failed(e, now, sink),
                }
            }

            Inbound::Snapshot { token, result } => {
                if !self.accept(token) {
                    return;
                }
                match result {
                    Ok(body) => self.apply_snapshot_body(&body, now, sink),
                    Err(e) => self.transport_failed(e, now, sink),
                }
            }

            Inbound::ResetAck { token, result } => {
                if !self.accept(token) {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.pending_server_reset = false;
                        info!("Session: server accumulation reset");
                    }
                    Err(e) => {
                        warn!("Session: server reset failed, will retry");
                        self.transport_failed(e, now, sink);
                    }
                }
            }

            Inbound::Message(msg) => self.apply_message(msg, now, sink),

            Inbound::StreamClosed(e) => self.transport_failed(e, now, sink),
        }
    }

    // ───────────────────────────────────────────────────────────
    // Internal
    // ───────────────────────────────────────────────────────────

    /// Token check.  Anything not matching the in-flight request is late
    /// and dropped.
    fn accept(&mut self, token: PollToken) -> bool {
        let fresh = self.scheduler.as_mut().is_some_and(|s| s.complete(token));
        if !fresh {
            self.stats.stale_responses += 1;
        }
        fresh
    }

    fn apply_snapshot_body(&mut self, body: &str, now: DateTime<Utc>, sink: &mut impl EventSink) {
        let snapshot = match decode_snapshot(body, now) {
            Ok(s) => s,
            Err(e) => return self.decode_failed(e, sink),
        };
        self.stats.snapshots += 1;
        self.last_error = None;
        self.signal(snapshot.is_connected, now, sink);

        if self.pending_server_reset {
            debug!("Session: snapshot withheld until the server reset is acknowledged");
            return;
        }

        match self.config.accumulation {
            AccumulationStrategy::Snapshot => {
                self.accumulator.apply_snapshot(snapshot.totals);
                self.sample = Some(snapshot.sample);
            }
            AccumulationStrategy::Event(_) => self.ingest_sample(snapshot.sample),
        }
        self.upstream_alerts = snapshot.alerts;
        self.refresh_alerts(now, sink);
        sink.emit(&AppEvent::Frame(self.frame()));
    }

    fn apply_message(&mut self, msg: StreamMessage, now: DateTime<Utc>, sink: &mut impl EventSink) {
        let TransportConfig::Stream(topics) = &self.config.transport else {
            debug!("Session: stream message in poll mode, ignored");
            return;
        };

        enum Route {
            Sample,
            Alert,
            Raw(RawChannel),
            Unknown,
        }
        let route = if msg.topic == topics.data_topic {
            Route::Sample
        } else if msg.topic == topics.alert_topic {
            Route::Alert
        } else if topics.heart_rate_topic.as_deref() == Some(msg.topic.as_str()) {
            Route::Raw(RawChannel::HeartRate)
        } else if topics.distance_topic.as_deref() == Some(msg.topic.as_str()) {
            Route::Raw(RawChannel::Distance)
        } else {
            Route::Unknown
        };

        match route {
            Route::Sample => match decode_sample(&msg.payload, now) {
                Ok(sample) => self.stream_sample(sample, now, sink),
                Err(e) => self.decode_failed(e, sink),
            },
            Route::Raw(channel) => match self.raw.update(channel, &msg.payload, now) {
                Ok(sample) => self.stream_sample(sample, now, sink),
                Err(e) => self.decode_failed(e, sink),
            },
            Route::Alert => match decode_alert_payload(&msg.payload, now) {
                Ok(alert) => {
                    if self.stream_live(now, sink) {
                        self.upstream_alerts = vec![alert];
                        self.refresh_alerts(now, sink);
                        sink.emit(&AppEvent::Frame(self.frame()));
                    }
                }
                Err(e) => self.decode_failed(e, sink),
            },
            Route::Unknown => debug!("Session: message on unsubscribed topic {}", msg.topic),
        }
    }

    fn stream_sample(&mut self, sample: Sample, now: DateTime<Utc>, sink: &mut impl EventSink) {
        if !self.stream_live(now, sink) {
            return;
        }
        self.ingest_sample(sample);
        self.refresh_alerts(now, sink);
        sink.emit(&AppEvent::Frame(self.frame()));
    }

    /// A well-formed message is proof of liveness.  Returns whether the
    /// session accepts data (i.e. it is not disconnected).
    fn stream_live(&mut self, now: DateTime<Utc>, sink: &mut impl EventSink) -> bool {
        self.last_error = None;
        self.signal(true, now, sink);
        let live = self.link.state() != LinkState::Disconnected;
        if !live {
            debug!("Session: message while disconnected, dropped");
        }
        live
    }

    /// Event strategy: fold in one sample, skipping exact repeats.
    fn ingest_sample(&mut self, sample: Sample) {
        if self.sample.as_ref() == Some(&sample) {
            return;
        }
        self.stats.samples += 1;
        if let AccumulationOutcome::Ignored = self.accumulator.record_sample(&sample) {
            warn!("Session: sample not accumulated");
        }
        self.sample = Some(sample);
    }

    fn refresh_alerts(&mut self, now: DateTime<Utc>, sink: &mut impl EventSink) {
        if let Some(rules) = self.rules.as_mut() {
            self.rule_alerts = rules.evaluate(&self.accumulator.current(), now);
        }
        let batch: Vec<Alert> = self
            .upstream_alerts
            .iter()
            .chain(self.rule_alerts.iter())
            .cloned()
            .collect();
        if self.alerts.ingest(&batch, now) {
            sink.emit(&AppEvent::AlertsChanged(self.alerts.visible().to_vec()));
        }
    }

    fn signal(&mut self, alive: bool, now: DateTime<Utc>, sink: &mut impl EventSink) {
        if let Some(event) = self.link.signal(alive, now) {
            self.on_link_event(event, sink);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent, sink: &mut impl EventSink) {
        if event == LinkEvent::Disconnected {
            self.accumulator.break_continuity();
        }
        sink.emit(&AppEvent::Link(event));
    }

    fn decode_failed(&mut self, e: DecodeError, sink: &mut impl EventSink) {
        warn!("Session: dropped payload: {}", e);
        self.stats.decode_failures += 1;
        self.last_error = Some(e.to_string());
        sink.emit(&AppEvent::DecodeFailed(e.to_string()));
        sink.emit(&AppEvent::Frame(self.frame()));
    }

    fn transport_failed(&mut self, e: TransportError, now: DateTime<Utc>, sink: &mut impl EventSink) {
        warn!("Session: transport failure: {}", e);
        self.stats.transport_failures += 1;
        self.last_error = Some(e.to_string());
        sink.emit(&AppEvent::TransportFailed(e.to_string()));
        self.signal(false, now, sink);
        sink.emit(&AppEvent::Frame(self.frame()));
    }

    fn reset_local(&mut self) {
        self.accumulator.reset();
        self.raw.clear();
        self.alerts.clear();
        if let Some(rules) = self.rules.as_mut() {
            rules.reset();
        }
        self.upstream_alerts.clear();
        self.rule_alerts.clear();
        self.last_error = None;
    }

    fn reconfigure(&mut self, config: SessionConfig) {
        self.accumulator = ModeAccumulator::new(config.accumulation, config.max_sample_gap_secs);
        self.alerts = AlertReconciler::new(config.alert_policy);
        self.rules = config.alert_rules.map(RuleEvaluator::new);
        self.raw = RawTopicAssembler::new(config.distance_threshold_cm);
        self.scheduler = scheduler_for(&config);
        self.sample = None;
        self.upstream_alerts.clear();
        self.rule_alerts.clear();
        self.last_error = None;
        self.pending_server_reset = false;
        self.config = config;
    }
}

fn scheduler_for(config: &SessionConfig) -> Option<PollScheduler> {
    match &config.transport {
        TransportConfig::Poll(p) => Some(PollScheduler::new(p.interval_ms, p.timeout_ms)),
        TransportConfig::Stream(_) => None,
    }
}

fn config_error(e: ConfigError) -> Error {
    match e {
        ConfigError::ValidationFailed(msg) => Error::Config(msg),
        _ => Error::Config("configuration rejected"),
    }
}
