//! bandwatch: wearable telemetry state aggregator.
//!
//! Turns a noisy, intermittent stream of band readings (REST snapshots or
//! broker messages) into accumulated per-mode time, a link status, a
//! reconciled alert set and a renderable distribution.  The session core
//! is I/O-free; transports, clocks and outputs plug in through the port
//! traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod accumulator;
pub mod adapters;
pub mod alerts;
pub mod app;
pub mod config;
pub mod events;
pub mod fsm;
pub mod projector;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;

mod error;

pub use error::{
    DecodeError, Error, MonotonicityViolation, Result, TransitionError, TransportError,
};
