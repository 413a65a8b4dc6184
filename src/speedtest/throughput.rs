use futures::future::join_all;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{timeout, Instant};

use crate::errors::{ProbeError, SpeedTestError};
use crate::measurements::{aggregate_rate, ThroughputSample};
use crate::progress::{Direction, ProgressCallback, ProgressEvent};
use crate::results::ServerDescriptor;
use crate::speedtest::{TransferStream, Transport};

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSettings {
    /// Number of concurrent streams
    pub streams: usize,
    /// Wall-clock budget for the whole measurement
    pub duration: Duration,
    /// Leading share of the window to discard, in [0, 1)
    pub warmup_fraction: f64,
    /// Longest wait for a single chunk before a stream counts as stalled
    pub stall_timeout: Duration,
}

impl Default for ThroughputSettings {
    fn default() -> Self {
        Self {
            streams: 4,
            duration: Duration::from_secs(10),
            warmup_fraction: 0.0,
            stall_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    pub direction: Direction,
    pub rate_mbps: f64,
    pub bytes_counted: u64,
    pub window_seconds: f64,
    pub streams: usize,
    pub failed_streams: usize,
}

/// What one stream produced.
struct StreamOutcome {
    samples: Vec<ThroughputSample>,
    error: Option<ProbeError>,
}

/// Pull chunks from `stream` until the deadline, exhaustion or failure.
async fn run_stream<S: TransferStream>(
    mut stream: S,
    start: Instant,
    deadline: Instant,
    stall_timeout: Duration,
) -> StreamOutcome {
    let mut samples = Vec::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let remaining = deadline - now;
        let wait = stall_timeout.min(remaining);

        match timeout(wait, stream.next_chunk()).await {
            Ok(Ok(Some(bytes))) => {
                let elapsed = start.elapsed().as_secs_f64();
                samples.push(ThroughputSample::new(bytes, elapsed));
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => return StreamOutcome { samples, error: Some(e) },
            Err(_) if stall_timeout < remaining => {
                return StreamOutcome {
                    samples,
                    error: Some(ProbeError::Timeout(stall_timeout)),
                };
            }
            // Deadline reached mid-chunk; the partial chunk is not counted.
            Err(_) => break,
        }
    }

    StreamOutcome { samples, error: None }
}

/// Run `settings.streams` concurrent transfers against `server` and reduce
/// them to one aggregate rate.
pub(crate) async fn measure_throughput<T: Transport>(
    transport: &T,
    server: &ServerDescriptor,
    direction: Direction,
    settings: &ThroughputSettings,
    progress: &dyn ProgressCallback,
) -> Result<ThroughputReport, SpeedTestError> {
    if settings.streams == 0 {
        return Err(SpeedTestError::transfer(
            direction,
            "no streams requested",
        ));
    }

    let start = Instant::now();
    let deadline = start + settings.duration;

    let runs = (0..settings.streams).map(|index| async move {
        match transport.open_stream(&server.url, direction, index) {
            Ok(stream) => {
                run_stream(stream, start, deadline, settings.stall_timeout)
                    .await
            }
            Err(e) => StreamOutcome { samples: Vec::new(), error: Some(e) },
        }
    });

    let outcomes = join_all(runs).await;

    let mut streams = Vec::with_capacity(outcomes.len());
    let mut failed_streams = 0;
    let mut last_error = None;

    for (index, outcome) in outcomes.into_iter().enumerate() {
        if let Some(e) = outcome.error {
            warn!("{} stream {} failed: {}", direction, index, e);
            progress.on_progress(ProgressEvent::StreamFailed {
                direction,
                stream: index,
                reason: e.to_string(),
            });
            failed_streams += 1;
            last_error = Some(e);
        }
        debug!(
            "{} stream {}: {} samples",
            direction,
            index,
            outcome.samples.len()
        );
        streams.push(outcome.samples);
    }

    if failed_streams == settings.streams {
        let cause = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".into());
        return Err(SpeedTestError::transfer(
            direction,
            format!(
                "all {} streams failed (last error: {})",
                failed_streams, cause
            ),
        ));
    }

    let Some(rate) = aggregate_rate(&streams, settings.warmup_fraction) else {
        return Err(SpeedTestError::transfer(
            direction,
            "no data was transferred",
        ));
    };

    info!(
        "{}: {} Mbps ({} bytes over {:.2} s, {}/{} streams failed)",
        direction,
        rate.rate_mbps,
        rate.bytes_counted,
        rate.window_seconds,
        failed_streams,
        settings.streams
    );

    progress.on_progress(ProgressEvent::ThroughputMeasured {
        direction,
        rate_mbps: rate.rate_mbps,
    });

    Ok(ThroughputReport {
        direction,
        rate_mbps: rate.rate_mbps,
        bytes_counted: rate.bytes_counted,
        window_seconds: rate.window_seconds,
        streams: settings.streams,
        failed_streams,
    })
}
