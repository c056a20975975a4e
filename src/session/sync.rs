//! Locates the sync peak inside a sync take.

use crate::document::TimeSpan;
use crate::timing::{index_of_max, samples_to_duration};
use std::time::Duration;

/// Session time of the loudest sample inside `span`.
///
/// The peak is the largest signed sample value; the earliest one wins a tie.
pub fn resolve_sync_offset(audio: &[i32], sample_rate: u32, span: TimeSpan) -> Duration {
    let range = span.sample_range(sample_rate, audio.len());
    let peak = index_of_max(&audio[range.clone()]);
    samples_to_duration(sample_rate, range.start + peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    fn span(start: usize, end: usize) -> TimeSpan {
        TimeSpan::new(
            samples_to_duration(RATE, start),
            samples_to_duration(RATE, end),
        )
    }

    #[test]
    fn test_spike_inside_span() {
        let mut audio = vec![10i32; 3000];
        audio[1250] = i32::MAX / 2;
        let offset = resolve_sync_offset(&audio, RATE, span(1000, 2000));
        assert_eq!(offset, samples_to_duration(RATE, 1250));
    }

    #[test]
    fn test_peak_outside_span_ignored() {
        let mut audio = vec![0i32; 3000];
        audio[500] = 1_000_000;
        audio[1600] = 10;
        let offset = resolve_sync_offset(&audio, RATE, span(1000, 2000));
        assert_eq!(offset, samples_to_duration(RATE, 1600));
    }

    #[test]
    fn test_tie_resolves_to_earliest() {
        let mut audio = vec![0i32; 3000];
        audio[1100] = 42;
        audio[1900] = 42;
        let offset = resolve_sync_offset(&audio, RATE, span(1000, 2000));
        assert_eq!(offset, samples_to_duration(RATE, 1100));
    }

    #[test]
    fn test_span_beyond_buffer_is_clamped() {
        let audio = vec![1i32; 100];
        let range = span(50, 5000).sample_range(RATE, audio.len());
        assert_eq!(range, 50..100);
        let range = span(500, 5000).sample_range(RATE, audio.len());
        assert_eq!(range, 100..100);
        assert_eq!(
            resolve_sync_offset(&audio, RATE, span(500, 5000)),
            samples_to_duration(RATE, 100)
        );
    }
}
