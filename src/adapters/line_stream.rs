//! Line-oriented message source.
//!
//! Reads `topic payload` lines, the format `mosquitto_sub -v` prints, from
//! any buffered reader (stdin in the binary):
//!
//! ```text
//! TEF/device023/attrs/d {"mode":"Working","heart_rate":72,"distance_cm":31}
//! TEF/device023/attrs/a ALERTA: possible overworking
//! ```
//!
//! Blank lines are skipped; a line without a space is a topic with an
//! empty payload.

use std::io::{BufRead, BufReader, Stdin};

use crate::app::ports::MessageSource;
use crate::error::TransportError;
use crate::events::StreamMessage;

pub struct LineMessageSource<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineMessageSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl LineMessageSource<BufReader<Stdin>> {
    /// Owned stdin handle, so the source can move to the reader thread.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead> MessageSource for LineMessageSource<R> {
    fn next_message(&mut self) -> Result<StreamMessage, TransportError> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| TransportError::Io(e.to_string()))?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            if let Some(msg) = parse_line(&self.line) {
                return Ok(msg);
            }
        }
    }
}

/// Split one line at the first space.  `None` for blank lines.
pub fn parse_line(line: &str) -> Option<StreamMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let (topic, payload) = line.split_once(' ').unwrap_or((line, ""));
    Some(StreamMessage {
        topic: topic.to_owned(),
        payload: payload.to_owned(),
    })
}
