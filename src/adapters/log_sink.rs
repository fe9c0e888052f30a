//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one line per session event through
//! the `log` facade.  The JSON sink implements the same trait for machine
//! consumers.

use log::{info, warn};

use crate::app::events::{AppEvent, RenderFrame};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(frame) => {
                info!("START | link={:?}", frame.status.state);
            }
            AppEvent::Link(e) => {
                info!("LINK  | {:?}", e);
            }
            AppEvent::Frame(frame) => {
                info!("FRAME | {}", summarize(frame));
            }
            AppEvent::AlertsChanged(alerts) => {
                if alerts.is_empty() {
                    info!("ALERT | none");
                }
                for a in alerts {
                    info!("ALERT | [{}] {}: {}", a.severity, a.kind, a.message);
                }
            }
            AppEvent::Reset => {
                info!("RESET | accumulation cleared");
            }
            AppEvent::DecodeFailed(e) => {
                warn!("DROP  | {}", e);
            }
            AppEvent::TransportFailed(e) => {
                warn!("XPORT | {}", e);
            }
            AppEvent::Stopped => {
                info!("STOP  | session closed");
            }
        }
    }
}

/// `state=Connected | Working hr=72 d=31cm | WorkOFF=12% WorkON=30% Working=58%`
pub fn summarize(frame: &RenderFrame) -> String {
    let mut line = format!("state={:?}", frame.status.state);

    if let Some(s) = &frame.sample {
        let distance = if s.distance_out_of_range() {
            "--".to_string()
        } else {
            format!("{}cm", s.distance_display())
        };
        line.push_str(&format!(
            " | {} hr={} d={}",
            s.mode,
            s.heart_rate_display(),
            distance
        ));
    }

    let pct = frame.accumulation.percentages();
    line.push_str(" |");
    for (mode, value) in frame.accumulation.iter() {
        line.push_str(&format!(" {}={:.0}s({:.0}%)", mode, value, pct[mode.index()]));
    }

    if let Some(err) = &frame.last_error {
        line.push_str(&format!(" | error: {err}"));
    }
    line
}
