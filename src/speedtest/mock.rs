//! Scripted [`Transport`] for tests.
//!
//! Delays are real `tokio::time` sleeps, so tests run them on a paused
//! clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::ProbeError;
use crate::progress::Direction;
use crate::results::ServerCandidate;
use crate::speedtest::{TransferStream, Transport};

#[derive(Debug, Clone)]
pub(crate) enum Ping {
    /// Answer after this many milliseconds
    Reply(u64),
    /// Never answer
    Hang,
    /// Fail immediately
    Refuse,
}

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Chunk { after: Duration, bytes: u64 },
    Fail { after: Duration, error: ProbeError },
    Stall,
}

/// `count` chunks of `bytes`, one every `every`.
pub(crate) fn steady(bytes: u64, every: Duration, count: usize) -> Vec<Step> {
    vec![Step::Chunk { after: every, bytes }; count]
}

pub(crate) fn candidate(host: &str) -> ServerCandidate {
    ServerCandidate::new(
        host,
        format!("Test server {}", host),
        endpoint(host),
    )
}

pub(crate) fn endpoint(host: &str) -> String {
    format!("http://{}/speedtest/upload.php", host)
}

#[derive(Default)]
pub(crate) struct MockTransport {
    candidates: Vec<ServerCandidate>,
    discover_failures: AtomicUsize,
    discover_hangs: bool,
    discover_calls: AtomicUsize,
    pings: Mutex<HashMap<String, (Vec<Ping>, usize)>>,
    streams: Mutex<VecDeque<Vec<Step>>>,
    opened: Mutex<Vec<(Direction, usize)>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_candidates(
        mut self,
        candidates: Vec<ServerCandidate>,
    ) -> Self {
        self.candidates = candidates;
        self
    }

    /// Make the first `count` discoveries fail with a connect error.
    pub(crate) fn with_discover_failures(self, count: usize) -> Self {
        self.discover_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make every discovery accept the request and never answer.
    pub(crate) fn with_discover_hang(mut self) -> Self {
        self.discover_hangs = true;
        self
    }

    /// Script the pings for the server `host`; the script repeats.
    pub(crate) fn with_pings(self, host: &str, script: Vec<Ping>) -> Self {
        if let Ok(mut pings) = self.pings.lock() {
            pings.insert(endpoint(host), (script, 0));
        }
        self
    }

    /// Queue a stream script; streams are handed out in order.
    pub(crate) fn with_stream(self, steps: Vec<Step>) -> Self {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push_back(steps);
        }
        self
    }

    pub(crate) fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self) -> Vec<(Direction, usize)> {
        self.opened.lock().unwrap().clone()
    }

    fn next_ping(&self, endpoint: &str) -> Ping {
        let mut pings = self.pings.lock().unwrap();
        match pings.get_mut(endpoint) {
            Some((script, cursor)) if !script.is_empty() => {
                let ping = script[*cursor % script.len()].clone();
                *cursor += 1;
                ping
            }
            _ => Ping::Refuse,
        }
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;

    async fn discover(&self) -> Result<Vec<ServerCandidate>, ProbeError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);

        if self.discover_hangs {
            return std::future::pending().await;
        }

        let remaining = self.discover_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.discover_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProbeError::Connect("connection refused".into()));
        }

        Ok(self.candidates.clone())
    }

    async fn ping(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        match self.next_ping(endpoint) {
            Ping::Reply(ms) => {
                let rtt = Duration::from_millis(ms);
                tokio::time::sleep(rtt).await;
                Ok(rtt)
            }
            Ping::Hang => std::future::pending().await,
            Ping::Refuse => {
                Err(ProbeError::Connect("connection refused".into()))
            }
        }
    }

    fn open_stream(
        &self,
        _endpoint: &str,
        direction: Direction,
        index: usize,
    ) -> Result<MockStream, ProbeError> {
        self.opened.lock().unwrap().push((direction, index));

        let steps = self.streams.lock().unwrap().pop_front().unwrap_or_default();

        Ok(MockStream { steps: steps.into() })
    }
}

pub(crate) struct MockStream {
    steps: VecDeque<Step>,
}

impl TransferStream for MockStream {
    async fn next_chunk(&mut self) -> Result<Option<u64>, ProbeError> {
        match self.steps.pop_front() {
            Some(Step::Chunk { after, bytes }) => {
                tokio::time::sleep(after).await;
                Ok(Some(bytes))
            }
            Some(Step::Fail { after, error }) => {
                tokio::time::sleep(after).await;
                Err(error)
            }
            Some(Step::Stall) => std::future::pending().await,
            None => Ok(None),
        }
    }
}
