//! Error types for the speed test.
//!
//! Low-level network failures are captured as [`ProbeError`] at the
//! granularity of a single probe. The engine translates them into a
//! [`SpeedTestError`], which is the only error a caller ever sees.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::progress::Direction;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// No candidate server answered a latency probe.
    pub const NO_REACHABLE_SERVER: i32 = 1;
    /// Every transfer stream failed for a direction.
    pub const TRANSFER_ERROR: i32 = 2;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// The test succeeded but the history could not be read or written.
    pub const HISTORY_ERROR: i32 = 4;
    /// The run was interrupted by the user.
    pub const INTERRUPTED: i32 = 130;
}

/// Categories of errors that abort a speed test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Discovery failed or every candidate server was unreachable.
    NoReachableServer,
    /// All transfer streams failed for a direction.
    Transfer,
    /// Invalid configuration or arguments.
    Config,
    /// Reading or writing the result history failed.
    History,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NoReachableServer => exit_codes::NO_REACHABLE_SERVER,
            ErrorKind::Transfer => exit_codes::TRANSFER_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::History => exit_codes::HISTORY_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::NoReachableServer => "No reachable server",
            ErrorKind::Transfer => "Transfer error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::History => "History error",
        }
    }
}

/// A user-facing error for a failed speed test run.
#[derive(Debug)]
pub struct SpeedTestError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    pub fn no_reachable_server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoReachableServer, message).with_suggestion(
            "Check your internet connection, or pass a server with --server.",
        )
    }

    pub fn transfer(direction: Direction, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Transfer,
            format!("{} failed: {}", direction.label(), message.into()),
        )
        .with_suggestion(
            "The server may be overloaded. Try again or pick another server.",
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn history(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::History, message).with_suggestion(
            "Check that the history file location is writable.",
        )
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Failure of a single probe (ping, download chunk or upload chunk).
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// The probe did not complete within its time bound.
    Timeout(Duration),
    /// The network stack gave up waiting on its own (connect timeout, OS
    /// socket timeout).
    TimedOut(String),
    /// The server name could not be resolved.
    Dns(String),
    /// The connection could not be established or was dropped.
    Connect(String),
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The server answered, but not with what the protocol expects.
    UnexpectedResponse(String),
    /// The server endpoint is not a usable URL.
    InvalidUrl(String),
    Other(String),
}

impl ProbeError {
    /// Whether retrying the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProbeError::Timeout(_)
            | ProbeError::TimedOut(_)
            | ProbeError::Dns(_)
            | ProbeError::Connect(_) => true,
            ProbeError::Status(status) => *status >= 500,
            ProbeError::UnexpectedResponse(_)
            | ProbeError::InvalidUrl(_)
            | ProbeError::Other(_) => false,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(after) => {
                write!(f, "timed out after {:.1}s", after.as_secs_f64())
            }
            ProbeError::TimedOut(message) => {
                write!(f, "timed out: {}", message)
            }
            ProbeError::Dns(message) => {
                write!(f, "DNS resolution failed: {}", message)
            }
            ProbeError::Connect(message) => {
                write!(f, "connection failed: {}", message)
            }
            ProbeError::Status(status) => {
                write!(f, "server returned HTTP {}", status)
            }
            ProbeError::UnexpectedResponse(message) => {
                write!(f, "unexpected response: {}", message)
            }
            ProbeError::InvalidUrl(message) => {
                write!(f, "invalid server URL: {}", message)
            }
            ProbeError::Other(message) => f.write_str(message),
        }
    }
}

impl Error for ProbeError {}

impl From<reqwest::Error> for ProbeError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return ProbeError::Status(status.as_u16());
        }

        if error.is_timeout() {
            return ProbeError::TimedOut(error_chain(&error));
        }

        classify_error(&error)
    }
}

impl From<url::ParseError> for ProbeError {
    fn from(error: url::ParseError) -> Self {
        ProbeError::InvalidUrl(error.to_string())
    }
}

/// Classify an error into a [`ProbeError`] based on its message chain.
///
/// reqwest wraps hyper and the resolver, so the interesting detail is
/// usually in a nested source rather than the top-level message.
pub fn classify_error(error: &dyn Error) -> ProbeError {
    let message = error_chain(error);
    let lowered = message.to_lowercase();

    if lowered.contains("dns")
        || lowered.contains("resolve")
        || lowered.contains("no such host")
        || lowered.contains("name or service not known")
    {
        return ProbeError::Dns(message);
    }

    if lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("deadline")
    {
        return ProbeError::TimedOut(message);
    }

    if lowered.contains("connection refused")
        || lowered.contains("connection reset")
        || lowered.contains("connection closed")
        || lowered.contains("network unreachable")
        || lowered.contains("host unreachable")
        || lowered.contains("no route")
        || lowered.contains("broken pipe")
        || lowered.contains("error trying to connect")
    {
        return ProbeError::Connect(message);
    }

    ProbeError::Other(message)
}

/// Fewer than two latency probes succeeded, so jitter could not be computed.
///
/// This never aborts a run. The result carries a jitter of 0 and is
/// flagged as degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegradedJitterWarning {
    /// Number of probes that produced a round-trip time.
    pub valid: usize,
    /// Number of probes that were sent.
    pub requested: usize,
}

impl fmt::Display for DegradedJitterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jitter unavailable: only {} of {} latency probes succeeded",
            self.valid, self.requested
        )
    }
}

/// The error's message followed by those of its sources.
fn error_chain(error: &dyn Error) -> String {
    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }
    messages.join(": ")
}

/// Format an error for user display.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}
