//! Fuzz target: `decode_sample`
//!
//! Arbitrary text must decode to a sample with finite, non-negative
//! readings or to a typed `DecodeError`, never a panic.
//!
//! cargo fuzz run fuzz_sample_decoder

#![no_main]

use bandwatch::telemetry::decode::decode_sample;
use chrono::Utc;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(sample) = decode_sample(text, Utc::now()) {
        assert!(sample.heart_rate.is_finite() && sample.heart_rate >= 0.0);
        assert!(sample.distance_cm.is_finite() && sample.distance_cm >= 0.0);
    }
});
