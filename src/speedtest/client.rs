use bytes::Bytes;
use log::debug;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::errors::ProbeError;
use crate::progress::Direction;
use crate::results::ServerCandidate;
use crate::speedtest::requests::download::{DownloadRequest, IMAGE_SIZES};
use crate::speedtest::requests::latency::{verify_body, LatencyRequest};
use crate::speedtest::requests::servers::{ServerList, SERVER_LIST_URL};
use crate::speedtest::requests::upload::{self, UploadRequest};
use crate::speedtest::requests::{Request, RequestBody, UA};
use crate::speedtest::{TransferStream, Transport};

/// Default size of one upload POST.
pub(crate) const DEFAULT_UPLOAD_SIZE: usize = 500_000;

static NONCE: AtomicU64 = AtomicU64::new(0);

/// Cache-busting value, unique within the process.
fn nonce() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    millis.wrapping_mul(1000) + NONCE.fetch_add(1, Ordering::Relaxed) % 1000
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub server_list_url: String,
    pub candidate_limit: usize,
    pub download_sizes: Vec<u32>,
    pub upload_size: usize,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_list_url: SERVER_LIST_URL.to_string(),
            candidate_limit: 10,
            download_sizes: IMAGE_SIZES.to_vec(),
            upload_size: DEFAULT_UPLOAD_SIZE,
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// [`Transport`] over HTTP against speedtest.net-style servers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    config: HttpConfig,
    payload: Bytes,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, ProbeError> {
        let client = ReqwestClient::builder()
            .user_agent(UA)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let payload = upload::payload(config.upload_size);

        Ok(HttpTransport { client, config, payload })
    }

    /// Send a request and decode its JSON response.
    pub(crate) async fn send<R: Request>(
        &self,
        request: R,
    ) -> Result<R::Response, ProbeError> {
        let response = execute(&self.client, &request).await?;
        let text = response.text().await?;

        decode(&text)
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProbeError> {
    serde_json::from_str(text).map_err(|e| {
        ProbeError::UnexpectedResponse(format!("invalid JSON: {}", e))
    })
}

/// Send a request and check its status, leaving the body unread.
async fn execute<R: Request>(
    client: &ReqwestClient,
    request: &R,
) -> Result<Response, ProbeError> {
    let url = request.url()?;
    debug!("{} {}", R::METHOD, url);

    let response = client
        .request(R::METHOD, url)
        .headers(request.headers())
        .speedtest_body(request.body())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::Status(status.as_u16()));
    }

    Ok(response)
}

trait RequestBuilderExt: Sized {
    fn speedtest_body(self, body: RequestBody) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn speedtest_body(self, body: RequestBody) -> Self {
        match body {
            RequestBody::None => self,
            RequestBody::Bytes(bytes) => self.body(bytes),
        }
    }
}

impl Transport for HttpTransport {
    type Stream = HttpStream;

    async fn discover(&self) -> Result<Vec<ServerCandidate>, ProbeError> {
        let entries = self
            .send(ServerList {
                api_url: self.config.server_list_url.clone(),
                limit: self.config.candidate_limit,
            })
            .await?;

        Ok(entries
            .into_iter()
            .take(self.config.candidate_limit)
            .map(|entry| entry.into_candidate())
            .collect())
    }

    async fn ping(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        let request = LatencyRequest { endpoint, nonce: nonce() };

        let start = Instant::now();
        let response = execute(&self.client, &request).await?;
        let body = response.text().await?;
        let rtt = start.elapsed();

        verify_body(&body)?;

        Ok(rtt)
    }

    fn open_stream(
        &self,
        endpoint: &str,
        direction: Direction,
        index: usize,
    ) -> Result<HttpStream, ProbeError> {
        // Fail on a bad endpoint before any stream starts.
        LatencyRequest { endpoint, nonce: 0 }.url()?;

        let client = self.client.clone();
        let endpoint = endpoint.to_string();

        Ok(match direction {
            Direction::Download => HttpStream::Download(DownloadStream {
                client,
                endpoint,
                sizes: self.config.download_sizes.clone(),
                // Offset streams so they do not fetch the same object in
                // lockstep.
                next_size: index,
                response: None,
            }),
            Direction::Upload => HttpStream::Upload(UploadStream {
                client,
                endpoint,
                payload: self.payload.clone(),
            }),
        })
    }
}

pub enum HttpStream {
    Download(DownloadStream),
    Upload(UploadStream),
}

impl TransferStream for HttpStream {
    async fn next_chunk(&mut self) -> Result<Option<u64>, ProbeError> {
        match self {
            HttpStream::Download(stream) => stream.next_chunk().await,
            HttpStream::Upload(stream) => stream.next_chunk().await,
        }
    }
}

/// Fetches the test images one after another, one chunk at a time.
pub struct DownloadStream {
    client: ReqwestClient,
    endpoint: String,
    sizes: Vec<u32>,
    next_size: usize,
    response: Option<Response>,
}

impl DownloadStream {
    async fn next_chunk(&mut self) -> Result<Option<u64>, ProbeError> {
        if self.sizes.is_empty() {
            return Ok(None);
        }

        loop {
            if let Some(response) = self.response.as_mut() {
                let chunk = response.chunk().await?;
                match chunk {
                    Some(bytes) if !bytes.is_empty() => {
                        return Ok(Some(bytes.len() as u64))
                    }
                    Some(_) => continue,
                    None => self.response = None,
                }
            }

            let size = self.sizes[self.next_size % self.sizes.len()];
            self.next_size += 1;

            let request = DownloadRequest {
                endpoint: &self.endpoint,
                size,
                nonce: nonce(),
            };
            self.response = Some(execute(&self.client, &request).await?);
        }
    }
}

/// POSTs the same payload repeatedly; one chunk per completed POST.
pub struct UploadStream {
    client: ReqwestClient,
    endpoint: String,
    payload: Bytes,
}

impl UploadStream {
    async fn next_chunk(&mut self) -> Result<Option<u64>, ProbeError> {
        if self.payload.is_empty() {
            return Ok(None);
        }

        let request = UploadRequest {
            endpoint: &self.endpoint,
            payload: self.payload.clone(),
            nonce: nonce(),
        };

        let response = execute(&self.client, &request).await?;
        // The server's reply is tiny; reading it completes the exchange.
        response.bytes().await?;

        Ok(Some(self.payload.len() as u64))
    }
}
