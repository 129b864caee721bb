//! Loading the newline-delimited egress endpoint list.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyListError;
use crate::proxy::{EgressEndpoint, install_rustls_provider};

/// Fetches the endpoint list fresh for every request.
#[derive(Debug, Clone)]
pub struct ProxyListSource {
    url: Url,
    client: Client,
}

impl ProxyListSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProxyListError> {
        let url = Url::parse(url).map_err(|e| ProxyListError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        install_rustls_provider();
        let mut builder = Client::builder();
        if timeout > Duration::ZERO {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Vec<EgressEndpoint>, ProxyListError> {
        debug!(url = %self.url, "Fetching proxy list");

        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyListError::HttpStatus {
                status,
                url: self.url.to_string(),
            });
        }

        let body = response.text().await?;
        let endpoints = parse_endpoint_list(&body);
        info!(count = endpoints.len(), "Got proxy list");
        Ok(endpoints)
    }
}

/// One endpoint per line. Blank lines and `#` comments are skipped and
/// repeated addresses are kept only once, in first-seen order.
pub fn parse_endpoint_list(text: &str) -> Vec<EgressEndpoint> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(EgressEndpoint::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_list() {
        let text = "1.1.1.1:1080\r\n\n  2.2.2.2:1080  \n# comment\n1.1.1.1:1080\n3.3.3.3:9050\n";
        let endpoints = parse_endpoint_list(text);
        let addresses: Vec<_> = endpoints.iter().map(EgressEndpoint::as_str).collect();
        assert_eq!(addresses, ["1.1.1.1:1080", "2.2.2.2:1080", "3.3.3.3:9050"]);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_endpoint_list("").is_empty());
        assert!(parse_endpoint_list("\n\n \r\n").is_empty());
    }

    #[test]
    fn test_invalid_source_url() {
        let err = ProxyListSource::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ProxyListError::InvalidUrl { .. }));
    }
}
