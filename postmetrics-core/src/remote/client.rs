//! HTTP client for the remote traffic API
//!
//! Issues one GET per chunk against the account-scoped host. The API key
//! travels only in the `X-API-KEY` header.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};

use crate::config::{AnalyticsConfig, FetchConfig};
use crate::error::{Error, Result};
use crate::tiers::TrafficSource;
use crate::types::{Chunk, Metric};

use super::query::TrafficQuery;
use super::RawResponse;

const API_KEY_HEADER: &str = "X-API-KEY";
const TRAFFIC_PATH: &str = "/api/v1/traffic/";

/// HTTP client for the remote analytics API
pub struct RemoteAnalyticsClient {
    http_client: reqwest::Client,
    base_url: String,
    property_id: String,
}

impl RemoteAnalyticsClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the analytics credentials are missing or invalid.
    pub fn new(analytics: &AnalyticsConfig, fetch: &FetchConfig) -> Result<Self> {
        analytics.validate()?;

        let account_name = analytics
            .account_name
            .as_deref()
            .ok_or_else(|| Error::Config("analytics.account_name is required".to_string()))?;
        let property_id = analytics
            .property_id
            .clone()
            .ok_or_else(|| Error::Config("analytics.property_id is required".to_string()))?;
        let api_key = analytics
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("analytics.api_key is required".to_string()))?;

        let base_url = fetch
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.example-analytics.com", account_name))
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);

        let http_client = reqwest::Client::builder()
            .timeout(fetch.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            property_id,
        })
    }

    /// Full request URL for one chunk.
    pub fn request_url(&self, page_path: &str, metrics: &[Metric], chunk: &Chunk) -> Result<String> {
        let query = TrafficQuery::for_chunk(&self.property_id, page_path, metrics, chunk);
        Ok(format!(
            "{}{}?data={}",
            self.base_url,
            TRAFFIC_PATH,
            query.encode()?
        ))
    }

    /// Fetch the raw body for one chunk.
    ///
    /// Network failures, timeouts and non-2xx statuses all come back as
    /// [`Error::Transport`].
    pub async fn fetch_chunk(
        &self,
        page_path: &str,
        metrics: &[Metric],
        chunk: &Chunk,
    ) -> Result<RawResponse> {
        let url = self.request_url(page_path, metrics, chunk)?;

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Transport(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response body: {}", e)))?;

        Ok(RawResponse::new(*chunk, body))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TrafficSource for RemoteAnalyticsClient {
    async fn fetch_chunk(
        &self,
        page_path: &str,
        metrics: &[Metric],
        chunk: &Chunk,
    ) -> Result<RawResponse> {
        RemoteAnalyticsClient::fetch_chunk(self, page_path, metrics, chunk).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn analytics() -> AnalyticsConfig {
        AnalyticsConfig {
            account_name: Some("acme".to_string()),
            property_id: Some("prop-1".to_string()),
            api_key: Some("secret_key".to_string()),
        }
    }

    #[test]
    fn test_client_requires_credentials() {
        assert!(
            RemoteAnalyticsClient::new(&AnalyticsConfig::default(), &FetchConfig::default())
                .is_err()
        );
    }

    #[test]
    fn test_default_base_url_is_account_scoped() {
        let client = RemoteAnalyticsClient::new(&analytics(), &FetchConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://acme.example-analytics.com");
    }

    #[test]
    fn test_request_url_never_contains_key() {
        let fetch = FetchConfig {
            base_url: Some("http://127.0.0.1:9999/".to_string()),
            ..Default::default()
        };
        let client = RemoteAnalyticsClient::new(&analytics(), &fetch).unwrap();
        let chunk = Chunk::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        );

        let url = client.request_url("/post/", &Metric::ALL, &chunk).unwrap();
        assert!(url.starts_with("http://127.0.0.1:9999/api/v1/traffic/?data="));
        assert!(!url.contains("secret_key"));
        assert!(url.contains("2025-01-10"));
    }
}
