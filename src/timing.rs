//! Sample and duration arithmetic shared by capture, take stamping, and export.
//!
//! Every conversion assumes a single fixed sample rate for the whole session.

use chrono::TimeDelta;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Converts a sample count into the duration it covers at `sample_rate`.
///
/// Truncates to whole nanoseconds, so converting back may lose up to one sample.
pub fn samples_to_duration(sample_rate: u32, samples: usize) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = samples as u128 * NANOS_PER_SEC / sample_rate as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Converts a duration into a sample index at `sample_rate`.
///
/// Rounds to the nearest sample so durations produced by [`samples_to_duration`]
/// map back to the exact index they came from.
pub fn duration_to_samples(sample_rate: u32, duration: Duration) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Formats a duration as `HH:MM:SS.mmm`.
pub fn format_timestamp(duration: Duration) -> String {
    format_millis(duration.as_millis() as i128)
}

/// Formats a signed offset as `HH:MM:SS.mmm`, prefixed with `-` when negative.
pub fn format_offset(delta: TimeDelta) -> String {
    format_millis(delta.num_milliseconds() as i128)
}

fn format_millis(millis: i128) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();
    let secs = millis / 1000;
    format!(
        "{sign}{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        millis % 1000
    )
}

/// Returns the index of the largest sample. Ties go to the lowest index; empty input yields 0.
pub fn index_of_max(samples: &[i32]) -> usize {
    let mut best = 0;
    for (i, &sample) in samples.iter().enumerate() {
        if sample > samples[best] {
            best = i;
        }
    }
    best
}

/// Linearly remaps `x` from `[in_min, in_max]` onto `[out_min, out_max]`.
pub fn valmap(x: i64, in_min: i64, in_max: i64, out_min: i64, out_max: i64) -> i64 {
    if in_max == in_min {
        return out_min;
    }
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}
