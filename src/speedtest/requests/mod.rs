pub mod download;
pub mod latency;
pub mod servers;
pub mod upload;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::errors::ProbeError;

pub(crate) static UA: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

pub(crate) enum RequestBody {
    None,
    Bytes(Bytes),
}

/// An HTTP request understood by the speed test servers.
pub(crate) trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    fn url(&self) -> Result<Url, ProbeError>;

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, HeaderValue::from_static(UA));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        headers
    }

    fn body(&self) -> RequestBody {
        RequestBody::None
    }
}

impl<R: Request> Request for &R {
    type Response = R::Response;

    const METHOD: Method = R::METHOD;

    fn url(&self) -> Result<Url, ProbeError> {
        (**self).url()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }

    fn body(&self) -> RequestBody {
        (**self).body()
    }
}

/// Resolve `resource` next to the server's endpoint, with a cache-busting
/// query so intermediaries never answer from cache.
pub(crate) fn sibling_url(
    endpoint: &str,
    resource: &str,
    nonce: u64,
) -> Result<Url, ProbeError> {
    let endpoint = Url::parse(endpoint)?;

    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ProbeError::InvalidUrl(format!(
            "unsupported scheme in {}",
            endpoint
        )));
    }

    let mut url = endpoint.join(resource)?;
    url.set_query(Some(&format!("x={}", nonce)));

    Ok(url)
}
