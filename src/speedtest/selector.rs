use futures::future::join_all;
use log::{debug, info};
use std::time::Duration;

use crate::errors::{ProbeError, SpeedTestError};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::results::{ServerCandidate, ServerDescriptor};
use crate::speedtest::{timed_ping, Transport};
use crate::stats::{mean, round2};

/// Index of the lowest latency; `None` entries are unreachable. Ties keep
/// the earliest index.
pub(crate) fn pick_fastest(latencies: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (index, latency) in latencies.iter().enumerate() {
        let Some(latency) = latency.filter(|l| l.is_finite()) else {
            continue;
        };

        match best {
            Some((_, fastest)) if latency >= fastest => {}
            _ => best = Some((index, latency)),
        }
    }

    best.map(|(index, _)| index)
}

/// Ping a candidate `pings` times, one after another.
///
/// Returns the mean of the successful probes, or the last failure when none
/// succeeded.
async fn probe_candidate<T: Transport>(
    transport: &T,
    candidate: &ServerCandidate,
    pings: usize,
    timeout: Duration,
) -> Result<f64, ProbeError> {
    let mut rtts = Vec::with_capacity(pings);
    let mut last_error = ProbeError::Other("no probes were sent".into());

    for _ in 0..pings {
        match timed_ping(transport, &candidate.url, timeout).await {
            Ok(rtt) => rtts.push(rtt),
            Err(e) => {
                debug!("{}: latency probe failed: {}", candidate.host, e);
                last_error = e;
            }
        }
    }

    mean(&rtts).ok_or(last_error)
}

/// Probe every candidate concurrently and return the reachable one with the
/// lowest mean latency.
pub(crate) async fn select_best_server<T: Transport>(
    transport: &T,
    candidates: Vec<ServerCandidate>,
    pings: usize,
    timeout: Duration,
    progress: &dyn ProgressCallback,
) -> Result<ServerDescriptor, SpeedTestError> {
    if candidates.is_empty() {
        return Err(SpeedTestError::no_reachable_server(
            "No candidate servers to choose from",
        ));
    }

    progress.on_progress(ProgressEvent::ServersDiscovered {
        count: candidates.len(),
    });

    let outcomes = join_all(candidates.iter().map(|candidate| {
        probe_candidate(transport, candidate, pings, timeout)
    }))
    .await;

    let mut latencies = Vec::with_capacity(outcomes.len());
    for (candidate, outcome) in candidates.iter().zip(outcomes) {
        match outcome {
            Ok(latency) => {
                debug!("{}: {:.2} ms", candidate.host, latency);
                latencies.push(Some(latency));
            }
            Err(e) => {
                progress.on_progress(ProgressEvent::ServerUnreachable {
                    host: candidate.host.clone(),
                    reason: e.to_string(),
                });
                latencies.push(None);
            }
        }
    }

    let reachable = latencies.iter().flatten().count();

    let Some(index) = pick_fastest(&latencies) else {
        return Err(SpeedTestError::no_reachable_server(format!(
            "None of the {} candidate servers answered a latency probe",
            candidates.len()
        )));
    };

    let latency_ms = round2(latencies[index].unwrap_or_default());
    let server = candidates
        .into_iter()
        .nth(index)
        .map(|candidate| candidate.into_descriptor(latency_ms))
        .ok_or_else(|| {
            SpeedTestError::no_reachable_server("Selected server vanished")
        })?;

    info!("Selected {} ({} ms)", server.host, server.latency_ms);

    progress.on_progress(ProgressEvent::ServerSelected {
        host: server.host.clone(),
        display_name: server.display_name.clone(),
        latency_ms: server.latency_ms,
        reachable,
    });

    Ok(server)
}
