//! The measurement engine.
//!
//! [`Transport`] is the probe seam: it runs single operations (a ping, the
//! next chunk of a transfer) against a server. Everything above it
//! (selection, throughput estimation, jitter sampling) is written against
//! the trait so it can be exercised without a network.

use std::future::Future;
use std::time::Duration;

use crate::errors::ProbeError;
use crate::progress::Direction;
use crate::results::ServerCandidate;

pub(crate) mod client;
pub mod engine;
pub(crate) mod jitter;
pub(crate) mod requests;
pub(crate) mod selector;
pub(crate) mod throughput;

#[cfg(test)]
pub(crate) mod mock;

/// Runs individual probes against measurement servers.
pub(crate) trait Transport {
    type Stream: TransferStream;

    /// Fetch the list of candidate servers.
    async fn discover(&self) -> Result<Vec<ServerCandidate>, ProbeError>;

    /// Measure one round trip to the server at `endpoint`.
    ///
    /// Implementations need not bound the call; callers wrap it in a
    /// timeout.
    async fn ping(&self, endpoint: &str) -> Result<Duration, ProbeError>;

    /// Prepare a transfer stream. No I/O happens until the first chunk is
    /// requested.
    fn open_stream(
        &self,
        endpoint: &str,
        direction: Direction,
        index: usize,
    ) -> Result<Self::Stream, ProbeError>;
}

/// One transfer stream, consumed chunk by chunk.
pub(crate) trait TransferStream {
    /// Move the next chunk of data.
    ///
    /// Returns the number of bytes moved, or `None` once the stream has
    /// nothing more to transfer.
    async fn next_chunk(&mut self) -> Result<Option<u64>, ProbeError>;
}

impl<T: Transport> Transport for &T {
    type Stream = T::Stream;

    async fn discover(&self) -> Result<Vec<ServerCandidate>, ProbeError> {
        (**self).discover().await
    }

    async fn ping(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        (**self).ping(endpoint).await
    }

    fn open_stream(
        &self,
        endpoint: &str,
        direction: Direction,
        index: usize,
    ) -> Result<Self::Stream, ProbeError> {
        (**self).open_stream(endpoint, direction, index)
    }
}

/// Await `probe`, failing with [`ProbeError::Timeout`] once `timeout` passes.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    probe: impl Future<Output = Result<T, ProbeError>>,
) -> Result<T, ProbeError> {
    tokio::time::timeout(timeout, probe)
        .await
        .unwrap_or(Err(ProbeError::Timeout(timeout)))
}

/// Run `ping` bounded by `timeout`, returning the RTT in milliseconds.
pub(crate) async fn timed_ping<T: Transport>(
    transport: &T,
    endpoint: &str,
    timeout: Duration,
) -> Result<f64, ProbeError> {
    bounded(timeout, transport.ping(endpoint))
        .await
        .map(|rtt| rtt.as_secs_f64() * 1000.0)
}
