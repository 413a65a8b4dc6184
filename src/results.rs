//! Result data structures for speed test output.
//!
//! [`SpeedTestResult`] is the unit of persistence. It is produced once per
//! successful run by [`aggregate`] and never modified afterwards.
//!
//! Field aliases let records written by the earlier Python tool
//! (`download_speed_mbps`, `server_details`, ...) load unchanged.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::measurements::JitterMeasurement;

/// A measurement server that has not been probed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCandidate {
    /// Host and port, e.g. `speedtest.example.net:8080`
    pub host: String,
    /// Human-readable name (sponsor and city)
    pub display_name: String,
    /// Speed test endpoint, e.g. `http://host:8080/speedtest/upload.php`
    pub url: String,
}

impl ServerCandidate {
    pub fn new(
        host: impl Into<String>,
        display_name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            display_name: display_name.into(),
            url: url.into(),
        }
    }

    /// Pin the measured latency, turning the candidate into the selected
    /// server.
    pub fn into_descriptor(self, latency_ms: f64) -> ServerDescriptor {
        ServerDescriptor {
            host: self.host,
            display_name: self.display_name,
            url: self.url,
            latency_ms,
        }
    }
}

/// The server a run was measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub host: String,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    /// Mean latency from server selection, in milliseconds
    pub latency_ms: f64,
}

/// The outcome of one complete speed test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    /// RFC 3339 UTC timestamp of when the run finished
    pub timestamp: String,
    #[serde(alias = "download_speed_mbps")]
    pub download_mbps: f64,
    #[serde(alias = "upload_speed_mbps")]
    pub upload_mbps: f64,
    #[serde(default)]
    pub latency_ms: f64,
    #[serde(default)]
    pub jitter_ms: f64,
    /// Set when too few latency probes succeeded to compute jitter
    #[serde(default)]
    pub jitter_degraded: bool,
    #[serde(alias = "server_details")]
    pub server: ServerDescriptor,
}

impl SpeedTestResult {
    /// Fill in fields that older records only stored on the server.
    pub(crate) fn normalized(mut self) -> Self {
        if self.latency_ms == 0.0 {
            self.latency_ms = self.server.latency_ms;
        }
        self
    }
}

/// Format a timestamp the way results store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Combine the outputs of a run into a result stamped with the current time.
///
/// No I/O happens here; this is where the engine hands its output to the
/// presentation and persistence layers.
pub fn aggregate(
    server: ServerDescriptor,
    download_mbps: f64,
    upload_mbps: f64,
    jitter: &JitterMeasurement,
) -> SpeedTestResult {
    aggregate_at(server, download_mbps, upload_mbps, jitter, Utc::now())
}

/// [`aggregate`] with an explicit timestamp.
pub fn aggregate_at(
    server: ServerDescriptor,
    download_mbps: f64,
    upload_mbps: f64,
    jitter: &JitterMeasurement,
    at: DateTime<Utc>,
) -> SpeedTestResult {
    SpeedTestResult {
        timestamp: format_timestamp(at),
        download_mbps,
        upload_mbps,
        latency_ms: server.latency_ms,
        jitter_ms: jitter.jitter_ms,
        jitter_degraded: jitter.is_degraded(),
        server,
    }
}
