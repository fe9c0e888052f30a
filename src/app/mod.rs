//! Application core: session logic, zero I/O.
//!
//! The [`Session`](service::Session) aggregate reconciles inbound telemetry
//! into accumulated, monotonic, renderable state.  All interaction with the
//! network, clock and output happens through **port traits** defined in
//! [`ports`], keeping this layer testable without a broker or server.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod shared;
