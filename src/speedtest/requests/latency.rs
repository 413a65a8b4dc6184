use url::Url;

use crate::errors::ProbeError;
use crate::speedtest::requests::{sibling_url, Request};

/// Body every speed test server answers `latency.txt` with.
pub(crate) const LATENCY_BODY: &str = "test=test";

/// A tiny request whose round trip is the latency sample.
pub(crate) struct LatencyRequest<'a> {
    pub endpoint: &'a str,
    pub nonce: u64,
}

impl Request for LatencyRequest<'_> {
    type Response = ();

    fn url(&self) -> Result<Url, ProbeError> {
        sibling_url(self.endpoint, "latency.txt", self.nonce)
    }
}

/// Check a `latency.txt` response body.
pub(crate) fn verify_body(body: &str) -> Result<(), ProbeError> {
    if body.trim_start().starts_with(LATENCY_BODY) {
        Ok(())
    } else {
        let preview: String = body.chars().take(32).collect();
        Err(ProbeError::UnexpectedResponse(format!(
            "latency.txt returned {:?}",
            preview
        )))
    }
}
