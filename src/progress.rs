//! Progress event types and callback interface.
//!
//! The engine reports what it is doing through these events instead of
//! printing. Presentation is entirely up to the callback.

use std::fmt;

/// Test phases during speed test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    /// Discovering and probing candidate servers
    ServerSelection,
    /// Running download streams
    Download,
    /// Running upload streams
    Upload,
    /// Sampling latency for jitter
    Jitter,
}

impl TestPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TestPhase::ServerSelection => "Selecting the best server",
            TestPhase::Download => "Performing download test",
            TestPhase::Upload => "Performing upload test",
            TestPhase::Jitter => "Measuring jitter",
        }
    }
}

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload => "Upload",
        }
    }

    pub fn phase(&self) -> TestPhase {
        match self {
            Direction::Download => TestPhase::Download,
            Direction::Upload => TestPhase::Upload,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress events emitted during test execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Test phase has changed
    PhaseChange(TestPhase),
    /// Candidate servers are known and about to be probed
    ServersDiscovered {
        /// Number of candidates
        count: usize,
    },
    /// A candidate did not answer any latency probe
    ServerUnreachable {
        host: String,
        reason: String,
    },
    /// The lowest-latency reachable server was chosen
    ServerSelected {
        host: String,
        display_name: String,
        latency_ms: f64,
        /// Number of candidates that answered
        reachable: usize,
    },
    /// One transfer stream stopped contributing samples
    StreamFailed {
        direction: Direction,
        /// Zero-based stream index
        stream: usize,
        reason: String,
    },
    /// A throughput measurement completed
    ThroughputMeasured {
        direction: Direction,
        rate_mbps: f64,
    },
    /// A jitter latency probe completed
    LatencySample {
        /// Round-trip time, `None` when the probe failed
        rtt_ms: Option<f64>,
        /// Current probe number (1-indexed)
        current: usize,
        /// Total number of probes
        total: usize,
    },
    /// Jitter could only be reported as the degraded sentinel
    JitterDegraded {
        valid: usize,
        requested: usize,
    },
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}

/// A callback that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}
