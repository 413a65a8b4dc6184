//! Reduction of raw probe samples into reported figures.
//!
//! Everything here is pure: the network-facing code collects samples and
//! hands them over once every probe has finished.

use crate::errors::DegradedJitterWarning;
use crate::stats::{population_std_dev, round2};

/// Bytes moved by one chunk of a transfer stream.
///
/// `elapsed_seconds` is the time at which the chunk completed, measured from
/// the start of the measurement window on the clock shared by all streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub bytes_transferred: u64,
    pub elapsed_seconds: f64,
}

impl ThroughputSample {
    pub const fn new(bytes_transferred: u64, elapsed_seconds: f64) -> Self {
        Self { bytes_transferred, elapsed_seconds }
    }
}

/// The aggregate rate over a measurement window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateRate {
    /// Rate in megabits per second, rounded to two decimals
    pub rate_mbps: f64,
    /// Bytes that fell inside the counted window
    pub bytes_counted: u64,
    /// Length of the counted window in seconds
    pub window_seconds: f64,
}

/// Convert a byte count over a duration to megabits per second.
pub fn bytes_to_mbps(bytes: u64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }

    bytes as f64 * 8.0 / 1e6 / seconds
}

/// Reduce the samples of every stream into one aggregate rate.
///
/// Bytes are summed across all streams and divided by the wall-clock length
/// of the shared window. Per-stream rates are never averaged: a stream that
/// was idle or stopped early would otherwise drag the figure down.
///
/// The window ends at the latest sample of any stream. When
/// `warmup_fraction` is positive, every sample that completed within that
/// leading share of the window is dropped. A kept sample's bytes may have
/// started moving before the cutoff, so each stream is timed from its last
/// dropped sample and the window opens at the earliest of those.
///
/// Returns `None` when no bytes remain or the window has no length.
pub fn aggregate_rate(
    streams: &[Vec<ThroughputSample>],
    warmup_fraction: f64,
) -> Option<AggregateRate> {
    let window_end = streams
        .iter()
        .flatten()
        .map(|sample| sample.elapsed_seconds)
        .fold(0.0_f64, f64::max);

    if window_end <= 0.0 {
        return None;
    }

    let warmup_fraction = warmup_fraction.clamp(0.0, 1.0);
    let cutoff = window_end * warmup_fraction;

    let mut bytes_counted = 0_u64;
    let mut window_start: Option<f64> = None;

    for samples in streams {
        let (dropped, kept): (Vec<&ThroughputSample>, Vec<&ThroughputSample>) = samples
            .iter()
            .partition(|sample| {
                warmup_fraction > 0.0 && sample.elapsed_seconds <= cutoff
            });

        if kept.is_empty() {
            continue;
        }

        let stream_start = dropped
            .iter()
            .map(|sample| sample.elapsed_seconds)
            .fold(0.0_f64, f64::max);

        bytes_counted += kept
            .iter()
            .map(|sample| sample.bytes_transferred)
            .sum::<u64>();
        window_start = Some(
            window_start.map_or(stream_start, |start| start.min(stream_start)),
        );
    }

    let window_seconds = window_end - window_start?;

    if bytes_counted == 0 || window_seconds <= 0.0 {
        return None;
    }

    Some(AggregateRate {
        rate_mbps: round2(bytes_to_mbps(bytes_counted, window_seconds)),
        bytes_counted,
        window_seconds,
    })
}

/// Jitter computed from a burst of latency probes.
#[derive(Debug, Clone, PartialEq)]
pub struct JitterMeasurement {
    /// Population standard deviation of the RTTs, or 0 when degraded
    pub jitter_ms: f64,
    /// Round-trip times of the probes that succeeded, in probe order
    pub rtts_ms: Vec<f64>,
    /// Number of probes that were sent
    pub requested: usize,
    /// Present when fewer than two probes succeeded
    pub warning: Option<DegradedJitterWarning>,
}

impl JitterMeasurement {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

/// Compute jitter as the population standard deviation of `rtts_ms`.
///
/// With fewer than two RTTs the result is the sentinel 0.0 and carries a
/// [`DegradedJitterWarning`].
pub fn jitter_from_rtts(
    rtts_ms: Vec<f64>,
    requested: usize,
) -> JitterMeasurement {
    match population_std_dev(&rtts_ms) {
        Some(std_dev) => JitterMeasurement {
            jitter_ms: round2(std_dev),
            rtts_ms,
            requested,
            warning: None,
        },
        None => JitterMeasurement {
            jitter_ms: 0.0,
            warning: Some(DegradedJitterWarning {
                valid: rtts_ms.len(),
                requested,
            }),
            rtts_ms,
            requested,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bytes_to_mbps() {
        assert!((bytes_to_mbps(125_000_000, 10.0) - 100.0).abs() < 1e-9);
        assert_eq!(bytes_to_mbps(125_000_000, 0.0), 0.0);
    }

    #[test]
    fn test_single_stream_rate() {
        let streams = vec![vec![ThroughputSample::new(125_000_000, 10.0)]];

        let rate = aggregate_rate(&streams, 0.0).unwrap();

        assert_eq!(rate.rate_mbps, 100.00);
        assert_eq!(rate.bytes_counted, 125_000_000);
        assert_eq!(rate.window_seconds, 10.0);
    }

    #[test]
    fn test_concurrent_streams_are_summed_not_averaged() {
        let streams = vec![
            vec![ThroughputSample::new(62_500_000, 10.0)],
            vec![ThroughputSample::new(62_500_000, 10.0)],
        ];

        let rate = aggregate_rate(&streams, 0.0).unwrap();

        assert_eq!(rate.rate_mbps, 100.00);
    }

    #[test]
    fn test_periodic_samples_are_summed() {
        let streams = vec![
            (1..=10)
                .map(|second| ThroughputSample::new(6_250_000, second as f64))
                .collect::<Vec<_>>(),
            (1..=10)
                .map(|second| ThroughputSample::new(6_250_000, second as f64))
                .collect::<Vec<_>>(),
        ];

        let rate = aggregate_rate(&streams, 0.0).unwrap();

        assert_eq!(rate.rate_mbps, 100.00);
    }

    #[test]
    fn test_stream_that_stopped_early_still_counts() {
        // The second stream stalled after 5 seconds; its bytes count but the
        // window is still the full 10 seconds.
        let streams = vec![
            vec![ThroughputSample::new(62_500_000, 10.0)],
            vec![ThroughputSample::new(31_250_000, 5.0)],
        ];

        let rate = aggregate_rate(&streams, 0.0).unwrap();

        assert_eq!(rate.rate_mbps, 75.00);
    }

    #[test]
    fn test_warmup_discards_leading_samples() {
        let streams = vec![vec![
            ThroughputSample::new(1_000_000, 1.0),
            ThroughputSample::new(1_000_000, 2.0),
            ThroughputSample::new(12_500_000, 6.0),
            ThroughputSample::new(12_500_000, 10.0),
        ]];

        // 20% of 10s: samples at 1s and 2s are dropped, window is 8s.
        let rate = aggregate_rate(&streams, 0.2).unwrap();

        assert_eq!(rate.bytes_counted, 25_000_000);
        assert!((rate.window_seconds - 8.0).abs() < 1e-9);
        assert_eq!(rate.rate_mbps, 25.00);
    }

    #[test]
    fn test_warmup_keeps_whole_interval_of_a_straddling_sample() {
        // Each 500 kB sample took 4 seconds. Nothing finished before the
        // 1.6s cutoff, so the first sample is timed from the start.
        let streams = vec![vec![
            ThroughputSample::new(500_000, 4.0),
            ThroughputSample::new(500_000, 8.0),
        ]];

        let plain = aggregate_rate(&streams, 0.0).unwrap();
        let warmed = aggregate_rate(&streams, 0.2).unwrap();

        assert_eq!(plain.rate_mbps, 1.00);
        assert_eq!(warmed, plain);
    }

    #[test]
    fn test_warmup_window_opens_at_earliest_stream_start() {
        // Cutoff is 2s. The first stream is timed from 2s, the second one
        // dropped nothing and is timed from 0s.
        let streams = vec![
            vec![
                ThroughputSample::new(1_000_000, 2.0),
                ThroughputSample::new(5_000_000, 10.0),
            ],
            vec![ThroughputSample::new(7_500_000, 10.0)],
        ];

        let rate = aggregate_rate(&streams, 0.2).unwrap();

        assert_eq!(rate.bytes_counted, 12_500_000);
        assert_eq!(rate.window_seconds, 10.0);
        assert_eq!(rate.rate_mbps, 10.00);
    }

    #[test]
    fn test_warmup_can_discard_everything_but_the_last_sample() {
        let streams = vec![vec![
            ThroughputSample::new(1_000_000, 9.0),
            ThroughputSample::new(1_250_000, 10.0),
        ]];

        let rate = aggregate_rate(&streams, 0.95).unwrap();

        assert_eq!(rate.bytes_counted, 1_250_000);
        assert_eq!(rate.window_seconds, 1.0);
        assert_eq!(rate.rate_mbps, 10.00);
    }

    #[test]
    fn test_no_samples() {
        assert_eq!(aggregate_rate(&[], 0.0), None);
        assert_eq!(aggregate_rate(&[vec![], vec![]], 0.0), None);
    }

    #[test]
    fn test_zero_bytes() {
        let streams = vec![vec![ThroughputSample::new(0, 3.0)]];
        assert_eq!(aggregate_rate(&streams, 0.0), None);
    }

    #[test]
    fn test_jitter_reference_samples() {
        let jitter =
            jitter_from_rtts(vec![10.0, 12.0, 14.0, 16.0, 18.0], 5);

        assert_eq!(jitter.jitter_ms, 2.83);
        assert!(!jitter.is_degraded());
    }

    #[test]
    fn test_jitter_with_one_sample_is_degraded() {
        let jitter = jitter_from_rtts(vec![23.4], 10);

        assert_eq!(jitter.jitter_ms, 0.0);
        assert_eq!(
            jitter.warning,
            Some(DegradedJitterWarning { valid: 1, requested: 10 })
        );
    }

    #[test]
    fn test_jitter_with_no_samples_is_degraded() {
        let jitter = jitter_from_rtts(vec![], 10);

        assert_eq!(jitter.jitter_ms, 0.0);
        assert!(jitter.is_degraded());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Doubling every stream's bytes over the same window doubles the
        /// reported rate, up to rounding.
        #[test]
        fn rate_is_monotonic_in_bytes(
            per_stream in prop::collection::vec(1u64..500_000_000, 1..8),
            seconds in 0.5f64..60.0
        ) {
            let streams: Vec<Vec<ThroughputSample>> = per_stream
                .iter()
                .map(|bytes| vec![ThroughputSample::new(*bytes, seconds)])
                .collect();
            let doubled: Vec<Vec<ThroughputSample>> = per_stream
                .iter()
                .map(|bytes| vec![ThroughputSample::new(bytes * 2, seconds)])
                .collect();

            let rate = aggregate_rate(&streams, 0.0).unwrap().rate_mbps;
            let doubled_rate = aggregate_rate(&doubled, 0.0).unwrap().rate_mbps;

            prop_assert!((doubled_rate - 2.0 * rate).abs() <= 0.011);
        }

        /// Splitting the same bytes across more streams does not change
        /// the aggregate.
        #[test]
        fn rate_ignores_stream_split(
            total in 1_000u64..1_000_000_000,
            streams in 1usize..8,
            seconds in 0.5f64..60.0
        ) {
            let share = total / streams as u64;
            let split: Vec<Vec<ThroughputSample>> = (0..streams)
                .map(|_| vec![ThroughputSample::new(share, seconds)])
                .collect();
            let single = vec![vec![ThroughputSample::new(share * streams as u64, seconds)]];

            prop_assert_eq!(
                aggregate_rate(&split, 0.0).unwrap().rate_mbps,
                aggregate_rate(&single, 0.0).unwrap().rate_mbps
            );
        }

        #[test]
        fn jitter_is_never_negative(
            rtts in prop::collection::vec(0.0f64..2000.0, 0..20)
        ) {
            let requested = rtts.len().max(1);
            let jitter = jitter_from_rtts(rtts.clone(), requested);
            prop_assert!(jitter.jitter_ms >= 0.0);
            prop_assert_eq!(jitter.is_degraded(), rtts.len() < 2);
        }
    }
}
