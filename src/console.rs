//! Terminal presentation of progress, results and history.
//!
//! [`Console`] is the only place that writes for the user. Progress goes to
//! stderr so that stdout carries nothing but the result, which keeps
//! `--json` output machine-readable.

use colored::{ColoredString, Colorize};
use std::path::Path;

use crate::display_mode::DisplayMode;
use crate::errors::{format_error_for_display, SpeedTestError};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::results::SpeedTestResult;
use crate::stats::{median, round2};

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
fn speed_color(text: String, speed_mbps: f64) -> ColoredString {
    if speed_mbps >= 100.0 {
        text.green()
    } else if speed_mbps >= 25.0 {
        text.yellow()
    } else {
        text.red()
    }
}

pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.2} ms", latency_ms)
}

/// Presentation context for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    mode: DisplayMode,
}

impl Console {
    pub fn new(mode: DisplayMode) -> Self {
        Self { mode }
    }

    fn paint(&self, text: ColoredString) -> ColoredString {
        match self.mode {
            DisplayMode::Color => text,
            DisplayMode::Plain | DisplayMode::Json => text.clear(),
        }
    }

    /// The line shown for a progress event, if any.
    pub fn progress_line(&self, event: &ProgressEvent) -> Option<String> {
        if self.mode == DisplayMode::Json {
            return None;
        }

        let line = match event {
            ProgressEvent::PhaseChange(phase) => self
                .paint(format!("{}...", phase.label()).cyan())
                .to_string(),
            ProgressEvent::ServersDiscovered { count } => self
                .paint(format!("Probing {} candidate servers", count).cyan())
                .to_string(),
            ProgressEvent::ServerUnreachable { host, reason } => format!(
                "  {}",
                self.paint(format!("{} unreachable: {}", host, reason).dimmed())
            ),
            ProgressEvent::ServerSelected {
                host, latency_ms, ..
            } => format!(
                "{} {} {}",
                self.paint("Best server found:".cyan()),
                self.paint(host.as_str().green()),
                self.paint(
                    format!("(Ping: {})", format_latency(*latency_ms)).yellow()
                ),
            ),
            ProgressEvent::StreamFailed { direction, stream, reason } => {
                format!(
                    "  {}",
                    self.paint(
                        format!(
                            "{} stream {} stopped: {}",
                            direction,
                            stream + 1,
                            reason
                        )
                        .yellow()
                    )
                )
            }
            ProgressEvent::ThroughputMeasured { direction, rate_mbps } => {
                format!(
                    "  {}: {}",
                    direction,
                    self.paint(speed_color(format_speed(*rate_mbps), *rate_mbps))
                )
            }
            ProgressEvent::LatencySample { .. } => return None,
            ProgressEvent::JitterDegraded { valid, requested } => format!(
                "  {}",
                self.paint(
                    format!(
                        "Only {} of {} latency probes answered; jitter is unavailable",
                        valid, requested
                    )
                    .yellow()
                )
            ),
        };

        Some(line)
    }

    /// Text (or JSON) rendering of one result.
    pub fn render_result(&self, result: &SpeedTestResult) -> String {
        if self.mode == DisplayMode::Json {
            return serde_json::to_string_pretty(result)
                .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
        }

        let field = |label: &str, value: ColoredString| {
            format!("{} {}\n", self.paint(format!("{}:", label).yellow()), value)
        };

        let jitter = if result.jitter_degraded {
            self.paint("unavailable".red())
        } else {
            self.paint(format_latency(result.jitter_ms).cyan())
        };

        let mut out = String::new();
        out.push_str(&format!(
            "\n{}\n",
            self.paint("--- Speedtest Results ---".magenta())
        ));
        out.push_str(&field("Timestamp", self.paint(result.timestamp.as_str().cyan())));
        out.push_str(&field(
            "Download",
            self.paint(speed_color(
                format_speed(result.download_mbps),
                result.download_mbps,
            )),
        ));
        out.push_str(&field(
            "Upload",
            self.paint(speed_color(
                format_speed(result.upload_mbps),
                result.upload_mbps,
            )),
        ));
        out.push_str(&field(
            "Latency",
            self.paint(format_latency(result.latency_ms).cyan()),
        ));
        out.push_str(&field("Jitter", jitter));

        out.push_str(&format!("\n{}\n", self.paint("Server Details:".yellow())));
        let detail = |label: &str, value: &str| {
            format!(
                "{} {}\n",
                self.paint(format!("{}:", label).cyan()),
                self.paint(value.green())
            )
        };
        out.push_str(&detail("Host", &result.server.host));
        out.push_str(&detail("Name", &result.server.display_name));
        out.push_str(&detail("Latency", &format_latency(result.server.latency_ms)));

        out
    }

    /// Rendering of the recorded history with a median summary.
    pub fn render_history(&self, records: &[SpeedTestResult]) -> String {
        if self.mode == DisplayMode::Json {
            return serde_json::to_string_pretty(records)
                .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
        }

        if records.is_empty() {
            return format!("{}\n", self.paint("No results recorded yet.".yellow()));
        }

        let mut out = format!(
            "{}\n",
            self.paint(
                format!(
                    "{:<25} {:>14} {:>14} {:>11} {:>11}  {}",
                    "Timestamp", "Download", "Upload", "Latency", "Jitter", "Server"
                )
                .bold()
            )
        );

        for record in records {
            let jitter = if record.jitter_degraded {
                "n/a".to_string()
            } else {
                format_latency(record.jitter_ms)
            };

            out.push_str(&format!(
                "{:<25} {} {} {:>11} {:>11}  {}\n",
                record.timestamp,
                self.paint(speed_color(
                    format!("{:>14}", format_speed(record.download_mbps)),
                    record.download_mbps,
                )),
                self.paint(speed_color(
                    format!("{:>14}", format_speed(record.upload_mbps)),
                    record.upload_mbps,
                )),
                format_latency(record.latency_ms),
                jitter,
                record.server.host,
            ));
        }

        let downloads: Vec<f64> =
            records.iter().map(|record| record.download_mbps).collect();
        let uploads: Vec<f64> =
            records.iter().map(|record| record.upload_mbps).collect();

        if let (Some(download), Some(upload)) = (median(&downloads), median(&uploads))
        {
            out.push_str(&format!(
                "\n{} {} runs, median download {}, median upload {}\n",
                self.paint("Summary:".magenta()),
                records.len(),
                format_speed(round2(download)),
                format_speed(round2(upload)),
            ));
        }

        out
    }

    pub fn print_result(&self, result: &SpeedTestResult) {
        println!("{}", self.render_result(result));
    }

    pub fn print_history(&self, records: &[SpeedTestResult]) {
        print!("{}", self.render_history(records));
    }

    pub fn print_saved(&self, path: &Path) {
        if self.mode != DisplayMode::Json {
            eprintln!(
                "{}",
                self.paint(format!("Results saved to {}", path.display()).green())
            );
        }
    }

    pub fn print_interrupted(&self) {
        eprintln!("\n{}", self.paint("Interrupted; nothing was saved.".red()));
    }

    pub fn print_error(&self, error: &SpeedTestError) {
        eprintln!("{}", self.paint(format_error_for_display(error).red()));
    }
}

impl ProgressCallback for Console {
    fn on_progress(&self, event: ProgressEvent) {
        if let Some(line) = self.progress_line(&event) {
            eprintln!("{}", line);
        }
    }
}
