//! JSON-lines event sink.
//!
//! One self-describing object per event on the given writer (stdout in
//! the binary), e.g. `{"event":"frame","data":{...}}`.

use std::io::Write;

use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &AppEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!("JSON sink: write failed: {}", e);
        }
    }
}
