//! REST poll adapter (`ureq`).
//!
//! Implements [`PollPort`] against the band API:
//!
//! | call            | request                        |
//! |-----------------|--------------------------------|
//! | `health`        | `GET  {base}/health`           |
//! | `fetch_current` | `GET  {base}/api/band/current` |
//! | `reset`         | `POST {base}/api/band/reset`   |
//!
//! The agent carries the configured timeout, so a hung server surfaces as
//! [`TransportError::Timeout`] here as well as in the scheduler.

use std::io;
use std::time::Duration;

use log::debug;
use ureq::{Agent, AgentBuilder};

use crate::app::ports::PollPort;
use crate::config::PollConfig;
use crate::error::TransportError;

pub const HEALTH_PATH: &str = "/health";
pub const CURRENT_PATH: &str = "/api/band/current";
pub const RESET_PATH: &str = "/api/band/reset";

pub struct RestPollClient {
    agent: Agent,
    base_url: String,
}

impl RestPollClient {
    pub fn new(config: &PollConfig) -> Self {
        let agent = AgentBuilder::new()
            .timeout(Duration::from_millis(u64::from(config.timeout_ms)))
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl PollPort for RestPollClient {
    fn health(&mut self) -> Result<(), TransportError> {
        let url = self.url(HEALTH_PATH);
        debug!("REST: GET {}", url);
        self.agent.get(&url).call().map_err(map_ureq)?;
        Ok(())
    }

    fn fetch_current(&mut self) -> Result<String, TransportError> {
        let url = self.url(CURRENT_PATH);
        debug!("REST: GET {}", url);
        let resp = self.agent.get(&url).call().map_err(map_ureq)?;
        resp.into_string().map_err(map_io)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        let url = self.url(RESET_PATH);
        debug!("REST: POST {}", url);
        self.agent.post(&url).call().map_err(map_ureq)?;
        Ok(())
    }
}

fn map_ureq(e: ureq::Error) -> TransportError {
    match e {
        ureq::Error::Status(code, _) => TransportError::Status(code),
        ureq::Error::Transport(t) => {
            let msg = t.to_string();
            if msg.contains("timed out") {
                TransportError::Timeout
            } else {
                TransportError::Io(msg)
            }
        }
    }
}

fn map_io(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io(e.to_string()),
    }
}
