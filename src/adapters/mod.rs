//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements    | Connects to                     |
//! |---------------|---------------|---------------------------------|
//! | `config_file` | ConfigPort    | JSON file on disk               |
//! | `io_task`     | (worker)      | PollPort / MessageSource thread |
//! | `json_sink`   | EventSink     | JSON lines on stdout            |
//! | `line_stream` | MessageSource | `mosquitto_sub -v` lines        |
//! | `log_sink`    | EventSink     | `log` facade                    |
//! | `rest`        | PollPort      | band REST API (`ureq`)          |
//! | `time`        | Clock         | host wall clock / manual        |

pub mod config_file;
pub mod io_task;
pub mod json_sink;
pub mod line_stream;
pub mod log_sink;
pub mod rest;
pub mod time;
