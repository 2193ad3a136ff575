//! Client for the telemetry data service.
//!
//! Metric queries are POSTed as JSON to `{endpoint}/query` and answered with
//! newline-delimited records. Usage rollups come back as a single JSON
//! document keyed by vsn, then plugin image.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetwatch_adapters::beehive::BeehiveClient;
//! use fleetwatch_types::MetricsQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BeehiveClient::builder()
//!         .endpoint("https://data.sagecontinuum.org/api/v1")
//!         .build()?;
//!
//!     let records = client.query(&MetricsQuery::system()).await?;
//!     println!("{} system records", records.len());
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use fleetwatch_types::{MetricRecord, MetricsQuery, RollupQuery, RollupResponse};

use crate::{decode, SourceError};

/// Default telemetry service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://data.sagecontinuum.org/api/v1";

/// Telemetry service client.
#[derive(Debug, Clone)]
pub struct BeehiveClient {
    client: Client,
    endpoint: String,
    rollup_endpoint: String,
}

impl BeehiveClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> BeehiveClientBuilder {
        BeehiveClientBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a metric query.
    ///
    /// An empty body is an empty result. Malformed lines are dropped.
    pub async fn query(&self, query: &MetricsQuery) -> Result<Vec<MetricRecord>, SourceError> {
        let url = format!("{}/query", self.endpoint);

        let response = self.client.post(&url).json(query).send().await?;
        let response = check_status(response).await?;
        let text = response.text().await?;

        let records = decode::decode_records(&text);
        debug!(url = %url, records = records.len(), "metric query complete");

        Ok(records)
    }

    /// Fetch a usage rollup.
    pub async fn rollup(&self, query: &RollupQuery) -> Result<RollupResponse, SourceError> {
        let response = self
            .client
            .post(&self.rollup_endpoint)
            .json(query)
            .send()
            .await?;
        let response = check_status(response).await?;
        let text = response.text().await?;

        decode::decode_rollup(&text)
    }
}

/// Builder for BeehiveClient.
#[derive(Debug, Default)]
pub struct BeehiveClientBuilder {
    endpoint: Option<String>,
    rollup_endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl BeehiveClientBuilder {
    /// Set the API base (no trailing slash).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the rollup URL (default: `{endpoint}/rollup`).
    pub fn rollup_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rollup_endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<BeehiveClient, SourceError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = trim_slash(self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()));
        let rollup_endpoint = self
            .rollup_endpoint
            .unwrap_or_else(|| format!("{}/rollup", endpoint));

        Ok(BeehiveClient {
            client,
            endpoint,
            rollup_endpoint,
        })
    }
}

pub(crate) fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Error body the services send with a failing status.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Pass through a successful response, or turn the error body into a
/// [`SourceError::Status`].
pub(crate) async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

pub(crate) fn status_error(status: u16, body: &str) -> SourceError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string());

    SourceError::Status { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = BeehiveClient::builder().build().unwrap();
        assert_eq!(client.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(client.rollup_endpoint, format!("{}/rollup", DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_builder_custom() {
        let client = BeehiveClient::builder()
            .endpoint("http://localhost:8080/api/")
            .rollup_endpoint("http://localhost:9090/usage")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(client.endpoint(), "http://localhost:8080/api");
        assert_eq!(client.rollup_endpoint, "http://localhost:9090/usage");
    }

    #[test]
    fn test_status_error_reads_error_body() {
        let err = status_error(400, r#"{"error": "bad start time"}"#);
        match err {
            SourceError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad start time");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = status_error(503, "unavailable\n");
        assert!(matches!(err, SourceError::Status { message, .. } if message == "unavailable"));
    }
}
