use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::SpeedTestError;
use crate::progress::{
    Direction, NoProgress, ProgressCallback, ProgressEvent, TestPhase,
};
use crate::results::{aggregate, ServerCandidate, SpeedTestResult};
use crate::retry::{retry_async, RetryConfig};
use crate::speedtest::jitter::measure_jitter;
use crate::speedtest::selector::select_best_server;
use crate::speedtest::throughput::{measure_throughput, ThroughputSettings};
use crate::speedtest::{bounded, Transport};

/// Configuration for the test engine.
///
/// Holds every tunable of a run. The CLI starts from [`Default`] and
/// overrides what the user passed.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Explicit candidates. When empty, servers are discovered.
    pub servers: Vec<ServerCandidate>,

    /// Most candidates to probe after discovery.
    /// Default: 10
    pub candidate_limit: usize,

    /// Latency probes per candidate during selection.
    /// Default: 3
    pub selection_pings: usize,

    /// Bound on every single latency probe.
    /// Default: 3s
    pub probe_timeout: Duration,

    /// Default: 4 streams, 10s, no warm-up, 10s stall timeout
    pub download: ThroughputSettings,

    /// Default: 4 streams, 10s, no warm-up, 10s stall timeout
    pub upload: ThroughputSettings,

    /// Latency probes used for jitter.
    /// Default: 10
    pub jitter_samples: usize,

    /// Bound on each attempt to fetch the server list.
    /// Default: 10s
    pub discovery_timeout: Duration,

    /// Retry policy for server discovery.
    pub retry_config: RetryConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            candidate_limit: 10,
            selection_pings: 3,
            probe_timeout: Duration::from_secs(3),
            download: ThroughputSettings::default(),
            upload: ThroughputSettings::default(),
            jitter_samples: 10,
            discovery_timeout: Duration::from_secs(10),
            retry_config: RetryConfig::default(),
        }
    }
}

impl TestConfig {
    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        if self.candidate_limit == 0 {
            return Err(SpeedTestError::config(
                "candidate limit must be at least 1",
            ));
        }
        if self.selection_pings == 0 {
            return Err(SpeedTestError::config(
                "selection pings must be at least 1",
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(SpeedTestError::config(
                "probe timeout must be greater than zero",
            ));
        }
        if self.discovery_timeout.is_zero() {
            return Err(SpeedTestError::config(
                "discovery timeout must be greater than zero",
            ));
        }
        if self.jitter_samples == 0 {
            return Err(SpeedTestError::config(
                "jitter samples must be at least 1",
            ));
        }

        for (direction, settings) in [
            (Direction::Download, &self.download),
            (Direction::Upload, &self.upload),
        ] {
            if settings.streams == 0 {
                return Err(SpeedTestError::config(format!(
                    "{} streams must be at least 1",
                    direction
                )));
            }
            if settings.duration.is_zero() {
                return Err(SpeedTestError::config(format!(
                    "{} duration must be greater than zero",
                    direction
                )));
            }
            if settings.stall_timeout.is_zero() {
                return Err(SpeedTestError::config(format!(
                    "{} stall timeout must be greater than zero",
                    direction
                )));
            }
            if !(0.0..1.0).contains(&settings.warmup_fraction) {
                return Err(SpeedTestError::config(format!(
                    "{} warm-up fraction must be in [0, 1), got {}",
                    direction, settings.warmup_fraction
                ))
                .with_suggestion(
                    "Use a value such as 0.2 to skip the first 20%.",
                ));
            }
        }

        Ok(())
    }
}

/// The test engine that runs one complete speed test.
///
/// A run selects the lowest-latency server, measures download and then
/// upload throughput against it, samples jitter and packages everything into
/// a [`SpeedTestResult`]. Progress is reported through the callback; the
/// engine itself never prints.
pub struct TestEngine<T> {
    transport: T,
    config: TestConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl<T: Transport> TestEngine<T> {
    pub fn new(transport: T, config: TestConfig) -> Self {
        Self { transport, config, progress: Arc::new(NoProgress) }
    }

    /// Attach a progress callback.
    pub fn with_progress(
        mut self,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        self.progress = progress;
        self
    }

    /// Run the whole test.
    ///
    /// Nothing partial is returned: selection and both throughput
    /// measurements must succeed. A poor jitter measurement only marks the
    /// result as degraded.
    pub async fn run_speed_test(
        &self,
    ) -> Result<SpeedTestResult, SpeedTestError> {
        self.config.validate()?;

        let progress = self.progress.as_ref();

        progress.on_progress(ProgressEvent::PhaseChange(
            TestPhase::ServerSelection,
        ));
        let candidates = self.candidates().await?;
        let server = select_best_server(
            &self.transport,
            candidates,
            self.config.selection_pings,
            self.config.probe_timeout,
            progress,
        )
        .await?;

        progress.on_progress(ProgressEvent::PhaseChange(
            Direction::Download.phase(),
        ));
        let download = measure_throughput(
            &self.transport,
            &server,
            Direction::Download,
            &self.config.download,
            progress,
        )
        .await?;

        progress.on_progress(ProgressEvent::PhaseChange(
            Direction::Upload.phase(),
        ));
        let upload = measure_throughput(
            &self.transport,
            &server,
            Direction::Upload,
            &self.config.upload,
            progress,
        )
        .await?;

        progress.on_progress(ProgressEvent::PhaseChange(TestPhase::Jitter));
        let jitter = measure_jitter(
            &self.transport,
            &server,
            self.config.jitter_samples,
            self.config.probe_timeout,
            progress,
        )
        .await;

        let result =
            aggregate(server, download.rate_mbps, upload.rate_mbps, &jitter);

        info!(
            "Download {} Mbps, upload {} Mbps, jitter {} ms",
            result.download_mbps, result.upload_mbps, result.jitter_ms
        );

        Ok(result)
    }

    /// The configured servers, or the discovered ones when none were given.
    async fn candidates(
        &self,
    ) -> Result<Vec<ServerCandidate>, SpeedTestError> {
        if !self.config.servers.is_empty() {
            debug!("Using {} configured servers", self.config.servers.len());
            return Ok(self.config.servers.clone());
        }

        let timeout = self.config.discovery_timeout;
        let mut candidates = retry_async(
            &self.config.retry_config,
            "Server discovery",
            || bounded(timeout, self.transport.discover()),
        )
        .await
        .map_err(|e| {
            SpeedTestError::no_reachable_server(format!(
                "Could not fetch the server list: {}",
                e
            ))
            .with_source(e)
        })?;

        candidates.truncate(self.config.candidate_limit);
        debug!("Discovered {} servers", candidates.len());

        Ok(candidates)
    }
}
