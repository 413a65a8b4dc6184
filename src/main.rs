extern crate clap;

mod console;
mod display_mode;
mod errors;
mod history;
mod measurements;
mod progress;
mod results;
mod retry;
mod speedtest;
mod stats;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use log::debug;
use url::Url;

use crate::console::Console;
use crate::display_mode::DisplayMode;
use crate::errors::{exit_codes, SpeedTestError};
use crate::history::{HistoryStore, DEFAULT_HISTORY_FILE};
use crate::results::ServerCandidate;
use crate::speedtest::client::{HttpConfig, HttpTransport};
use crate::speedtest::engine::{TestConfig, TestEngine};
use crate::speedtest::throughput::ThroughputSettings;

fn version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();

    VERSION.get_or_init(|| match option_env!("SPEEDLOG_BUILD_GIT_HASH") {
        Some(hash) => format!("{} ({})", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Parser)]
#[command(author, version = version(), about, long_about = None)]
struct Cli {
    /// Do not save the result to the history file
    #[arg(long = "no-log", alias = "nolog")]
    no_log: bool,

    /// History file, one JSON record per line
    #[arg(long, value_name = "PATH", default_value = DEFAULT_HISTORY_FILE)]
    history_file: PathBuf,

    /// Print the recorded history and exit
    #[arg(long)]
    history: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Test against this server instead of discovering one (repeatable)
    #[arg(
        long = "server",
        value_name = "URL|HOST[:PORT]",
        value_parser = parse_server
    )]
    servers: Vec<ServerCandidate>,

    /// Concurrent streams per direction
    #[arg(long, value_name = "N", default_value_t = 4)]
    streams: usize,

    /// Length of each throughput measurement
    #[arg(long, value_name = "SECS", default_value_t = 10.0)]
    duration: f64,

    /// Leading share of each throughput window to discard
    #[arg(long, value_name = "FRACTION", default_value_t = 0.0)]
    warmup: f64,

    /// Latency probes used to compute jitter
    #[arg(long, value_name = "N", default_value_t = 10)]
    jitter_samples: usize,

    /// Bound on each latency probe and on connecting
    #[arg(long, value_name = "SECS", default_value_t = 3.0)]
    timeout: f64,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

/// Accept either a full endpoint URL or `host[:port]`, which is expanded to
/// the conventional `/speedtest/upload.php` endpoint.
fn parse_server(value: &str) -> Result<ServerCandidate, String> {
    let value = value.trim();
    let endpoint = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{}/speedtest/upload.php", value.trim_end_matches('/'))
    };

    let url = Url::parse(&endpoint)
        .map_err(|e| format!("invalid server {:?}: {}", value, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(format!("no host in {:?}", value)),
    };

    Ok(ServerCandidate::new(host.clone(), host, url.as_str()))
}

fn seconds(flag: &str, value: f64) -> Result<Duration, SpeedTestError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| {
            SpeedTestError::config(format!(
                "--{} must be a positive number of seconds, got {}",
                flag, value
            ))
        })
}

impl Cli {
    fn test_config(&self) -> Result<TestConfig, SpeedTestError> {
        let throughput = ThroughputSettings {
            streams: self.streams,
            duration: seconds("duration", self.duration)?,
            warmup_fraction: self.warmup,
            ..ThroughputSettings::default()
        };

        let config = TestConfig {
            servers: self.servers.clone(),
            probe_timeout: seconds("timeout", self.timeout)?,
            download: throughput.clone(),
            upload: throughput,
            jitter_samples: self.jitter_samples,
            ..TestConfig::default()
        };

        config.validate()?;

        Ok(config)
    }
}

fn show_history(console: &Console, store: &HistoryStore) -> i32 {
    match store.load() {
        Ok(records) => {
            console.print_history(&records);
            exit_codes::SUCCESS
        }
        Err(e) => {
            console.print_error(&e);
            e.exit_code()
        }
    }
}

async fn run(cli: &Cli, console: Console, store: &HistoryStore) -> i32 {
    match run_and_record(cli, console, store).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            console.print_error(&e);
            e.exit_code()
        }
    }
}

async fn run_and_record(
    cli: &Cli,
    console: Console,
    store: &HistoryStore,
) -> Result<(), SpeedTestError> {
    let config = cli.test_config()?;

    let transport = HttpTransport::new(HttpConfig {
        candidate_limit: config.candidate_limit,
        connect_timeout: config.probe_timeout,
        ..HttpConfig::default()
    })
    .map_err(|e| {
        SpeedTestError::config(format!("could not set up HTTP: {}", e))
            .with_source(e)
    })?;

    let engine =
        TestEngine::new(transport, config).with_progress(Arc::new(console));

    let result = engine.run_speed_test().await?;

    console.print_result(&result);

    if cli.no_log {
        debug!("Not saving the result (--no-log)");
    } else {
        store.append(&result)?;
        console.print_saved(store.path());
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let mode = DisplayMode::detect(
        cli.json,
        io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    );
    let console = Console::new(mode);
    let store = HistoryStore::new(&cli.history_file);

    let code = if cli.history {
        show_history(&console, &store)
    } else {
        // Dropping the run future on Ctrl-C closes every open connection.
        tokio::select! {
            code = run(&cli, console, &store) => code,
            _ = tokio::signal::ctrl_c() => {
                console.print_interrupted();
                exit_codes::INTERRUPTED
            }
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_parse_server_host_port() {
        let server = parse_server("speedtest.example.net:8080").unwrap();

        assert_eq!(server.host, "speedtest.example.net:8080");
        assert_eq!(
            server.url,
            "http://speedtest.example.net:8080/speedtest/upload.php"
        );
    }

    #[test]
    fn test_parse_server_url() {
        let server =
            parse_server("https://st.example.org/speedtest/upload.php").unwrap();

        assert_eq!(server.host, "st.example.org");
        assert_eq!(server.url, "https://st.example.org/speedtest/upload.php");
    }

    #[test]
    fn test_parse_server_rejects_garbage() {
        assert!(parse_server("ftp://example.org/upload.php").is_err());
        assert!(parse_server("bad host name:99999").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["speedlog"]);
        let config = cli.test_config().unwrap();

        assert!(!cli.no_log);
        assert_eq!(cli.history_file, PathBuf::from(DEFAULT_HISTORY_FILE));
        assert_eq!(config.download.streams, 4);
        assert_eq!(config.upload.duration, Duration::from_secs(10));
        assert_eq!(config.jitter_samples, 10);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "speedlog",
            "--nolog",
            "--server",
            "a.example:8080",
            "--server",
            "b.example:8080",
            "--streams",
            "8",
            "--warmup",
            "0.2",
            "--timeout",
            "1.5",
        ]);
        let config = cli.test_config().unwrap();

        assert!(cli.no_log);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.upload.streams, 8);
        assert_eq!(config.download.warmup_fraction, 0.2);
        assert_eq!(config.probe_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_cli_rejects_bad_numbers() {
        let cli = Cli::parse_from(["speedlog", "--duration", "0"]);
        assert_eq!(cli.test_config().unwrap_err().kind, ErrorKind::Config);

        let cli = Cli::parse_from(["speedlog", "--warmup", "1.5"]);
        assert_eq!(cli.test_config().unwrap_err().kind, ErrorKind::Config);

        let cli = Cli::parse_from(["speedlog", "--timeout", "0"]);
        assert!(cli.test_config().is_err());
    }
}
