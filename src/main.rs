//! bandwatch: command-line entry point.
//!
//! ```text
//! bandwatch [config.json]          run a session
//! bandwatch --init <config.json>   write the default configuration
//! ```
//!
//! In stream mode the payloads are read from stdin as `topic payload`
//! lines, e.g. `mosquitto_sub -v -t 'TEF/device023/attrs/#' | bandwatch cfg.json`.

use core::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use log::info;

use bandwatch::adapters::config_file::JsonFileConfig;
use bandwatch::adapters::json_sink::JsonLinesSink;
use bandwatch::adapters::log_sink::LogEventSink;
use bandwatch::app::ports::ConfigPort;
use bandwatch::config::{OutputFormat, SessionConfig};
use bandwatch::runtime;

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.as_slice() {
        [] => SessionConfig::default(),
        [flag, path] if flag == "--init" => {
            let store = JsonFileConfig::new(path);
            store
                .save(&SessionConfig::default())
                .with_context(|| format!("writing {}", path))?;
            info!("Wrote default configuration to {}", path);
            return Ok(());
        }
        [path] => JsonFileConfig::new(path)
            .load()
            .with_context(|| format!("loading {}", path))?,
        _ => bail!("usage: bandwatch [config.json] | bandwatch --init <config.json>"),
    };

    ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;

    info!("bandwatch v{}", env!("CARGO_PKG_VERSION"));

    let output = config.output;
    let stats = match output {
        OutputFormat::Log => runtime::run(config, &STOP, &mut LogEventSink::new()),
        OutputFormat::JsonLines => runtime::run(config, &STOP, &mut JsonLinesSink::stdout()),
    }?;

    info!(
        "Done: {} samples, {} snapshots, {} decode failures, {} transport failures",
        stats.samples, stats.snapshots, stats.decode_failures, stats.transport_failures
    );
    Ok(())
}
