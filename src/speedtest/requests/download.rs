use url::Url;

use crate::errors::ProbeError;
use crate::speedtest::requests::{sibling_url, Request};

/// Edge lengths of the `random{N}x{N}.jpg` images servers publish.
pub(crate) const IMAGE_SIZES: [u32; 10] =
    [350, 500, 750, 1000, 1500, 2000, 2500, 3000, 3500, 4000];

#[derive(Copy, Clone)]
pub(crate) struct DownloadRequest<'a> {
    pub endpoint: &'a str,
    pub size: u32,
    pub nonce: u64,
}

impl Request for DownloadRequest<'_> {
    type Response = ();

    fn url(&self) -> Result<Url, ProbeError> {
        sibling_url(
            self.endpoint,
            &format!("random{0}x{0}.jpg", self.size),
            self.nonce,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url() {
        let request = DownloadRequest {
            endpoint: "https://speedtest.example.net:8080/speedtest/upload.php",
            size: 1500,
            nonce: 3,
        };

        assert_eq!(
            request.url().unwrap().as_str(),
            "https://speedtest.example.net:8080/speedtest/random1500x1500.jpg?x=3"
        );
    }
}
