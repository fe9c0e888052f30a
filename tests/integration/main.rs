//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one transport flow
//! against mock ports.  No network or broker is required.

mod mock_ports;
mod poll_flow_tests;
mod stream_flow_tests;
