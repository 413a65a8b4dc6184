use serde::Deserialize;
use url::Url;

use crate::errors::ProbeError;
use crate::results::ServerCandidate;
use crate::speedtest::requests::Request;

/// Public list of speed test servers, nearest first.
pub(crate) static SERVER_LIST_URL: &str =
    "https://www.speedtest.net/api/js/servers?engine=js";

/// One entry of the server list.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerEntry {
    /// Upload endpoint; every other resource lives next to it
    pub url: String,
    /// City
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sponsor: String,
    pub host: String,
}

impl ServerEntry {
    pub(crate) fn into_candidate(self) -> ServerCandidate {
        let display_name = match (self.sponsor.is_empty(), self.country.is_empty()) {
            (false, false) => {
                format!("{} - {}, {}", self.sponsor, self.name, self.country)
            }
            (false, true) => format!("{} - {}", self.sponsor, self.name),
            (true, false) => format!("{}, {}", self.name, self.country),
            (true, true) => self.name,
        };

        ServerCandidate::new(self.host, display_name, self.url)
    }
}

pub(crate) struct ServerList {
    pub api_url: String,
    pub limit: usize,
}

impl Request for ServerList {
    type Response = Vec<ServerEntry>;

    fn url(&self) -> Result<Url, ProbeError> {
        let mut url = Url::parse(&self.api_url)?;
        url.query_pairs_mut()
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"[
        {"url":"http://speedtest.example.net:8080/speedtest/upload.php","lat":"52.3667","lon":"4.9000","distance":3,"name":"Amsterdam","country":"Netherlands","cc":"NL","sponsor":"Example ISP","id":"10101","preferred":0,"https_functional":1,"host":"speedtest.example.net:8080"},
        {"url":"http://st.other.example:8080/speedtest/upload.php","name":"Utrecht","host":"st.other.example:8080"}
    ]"#;

    #[test]
    fn test_parse_server_list() {
        let entries: Vec<ServerEntry> = serde_json::from_str(RESPONSE).unwrap();

        assert_eq!(entries.len(), 2);

        let first = entries[0].clone().into_candidate();
        assert_eq!(first.host, "speedtest.example.net:8080");
        assert_eq!(first.display_name, "Example ISP - Amsterdam, Netherlands");
        assert_eq!(
            first.url,
            "http://speedtest.example.net:8080/speedtest/upload.php"
        );

        let second = entries[1].clone().into_candidate();
        assert_eq!(second.display_name, "Utrecht");
    }

    #[test]
    fn test_server_list_url() {
        let request = ServerList { api_url: SERVER_LIST_URL.to_string(), limit: 10 };

        assert_eq!(
            request.url().unwrap().as_str(),
            "https://www.speedtest.net/api/js/servers?engine=js&limit=10"
        );
    }
}
