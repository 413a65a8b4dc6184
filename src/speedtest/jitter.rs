use log::{debug, warn};
use std::time::Duration;

use crate::measurements::{jitter_from_rtts, JitterMeasurement};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::results::ServerDescriptor;
use crate::speedtest::{timed_ping, Transport};

/// Send `sample_count` sequential latency probes and reduce the RTTs that
/// came back to a jitter figure. Never fails; too few answers degrade the
/// result instead.
pub(crate) async fn measure_jitter<T: Transport>(
    transport: &T,
    server: &ServerDescriptor,
    sample_count: usize,
    timeout: Duration,
    progress: &dyn ProgressCallback,
) -> JitterMeasurement {
    let mut rtts = Vec::with_capacity(sample_count);

    for current in 1..=sample_count {
        let rtt = match timed_ping(transport, &server.url, timeout).await {
            Ok(rtt) => {
                rtts.push(rtt);
                Some(rtt)
            }
            Err(e) => {
                debug!(
                    "Jitter probe {}/{} failed: {}",
                    current, sample_count, e
                );
                None
            }
        };

        progress.on_progress(ProgressEvent::LatencySample {
            rtt_ms: rtt,
            current,
            total: sample_count,
        });
    }

    let measurement = jitter_from_rtts(rtts, sample_count);

    if let Some(warning) = measurement.warning {
        warn!("{}", warning);
        progress.on_progress(ProgressEvent::JitterDegraded {
            valid: warning.valid,
            requested: warning.requested,
        });
    }

    measurement
}
