//! Fuzz target: `decode_snapshot` into a live accumulator.
//!
//! Whatever the server returns, accepted totals stay non-negative and the
//! projected slices still cover the full circle.
//!
//! cargo fuzz run fuzz_snapshot_decoder

#![no_main]

use bandwatch::accumulator::ModeAccumulator;
use bandwatch::config::AccumulationStrategy;
use bandwatch::projector::project;
use bandwatch::telemetry::Mode;
use bandwatch::telemetry::decode::decode_snapshot;
use chrono::Utc;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(snapshot) = decode_snapshot(text, Utc::now()) else {
        return;
    };

    let mut acc = ModeAccumulator::new(AccumulationStrategy::Snapshot, 30.0);
    acc.apply_snapshot(snapshot.totals);
    let current = acc.current();
    for mode in Mode::ALL {
        assert!(current.get(mode) >= 0.0);
    }

    let total: f64 = project(&current).iter().map(|s| s.fraction).sum();
    assert!((total - 1.0).abs() < 1e-6 || !current.total().is_finite());
});
