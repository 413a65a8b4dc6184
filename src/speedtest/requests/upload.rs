use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use url::Url;

use crate::errors::ProbeError;
use crate::speedtest::requests::{sibling_url, Request, RequestBody};

const FORM_PREFIX: &[u8] = b"content1=";
const FILLER: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Build a form-encoded payload of exactly `bytes` bytes.
pub(crate) fn payload(bytes: usize) -> Bytes {
    FORM_PREFIX
        .iter()
        .chain(FILLER.iter().cycle())
        .take(bytes)
        .copied()
        .collect::<Vec<u8>>()
        .into()
}

pub(crate) struct UploadRequest<'a> {
    pub endpoint: &'a str,
    pub payload: Bytes,
    pub nonce: u64,
}

impl Request for UploadRequest<'_> {
    type Response = ();

    const METHOD: Method = Method::POST;

    fn url(&self) -> Result<Url, ProbeError> {
        // The endpoint is the upload script itself.
        let script = Url::parse(self.endpoint)?;
        let file = script
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("upload.php")
            .to_string();

        sibling_url(self.endpoint, &file, self.nonce)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(super::UA),
        );

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        headers
    }

    fn body(&self) -> RequestBody {
        RequestBody::Bytes(self.payload.clone())
    }
}
