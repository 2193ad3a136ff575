//! Client for the node inventory service.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use fleetwatch_types::{InventoryFilter, NodeInfo};

use crate::beehive::{check_status, trim_slash};
use crate::{decode, SourceError};

/// Default inventory service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.sagecontinuum.org";

/// Inventory service client.
#[derive(Debug, Clone)]
pub struct BeekeeperClient {
    client: Client,
    endpoint: String,
}

impl BeekeeperClient {
    pub fn builder() -> BeekeeperClientBuilder {
        BeekeeperClientBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the node roster, dropping nodes the filter rejects.
    pub async fn state(&self, filter: &InventoryFilter) -> Result<Vec<NodeInfo>, SourceError> {
        let url = format!("{}/state", self.endpoint);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        let text = response.text().await?;

        let nodes = decode::decode_inventory(&text)?;
        let total = nodes.len();
        let nodes = filter.apply(nodes);
        debug!(url = %url, total, kept = nodes.len(), "inventory fetched");

        Ok(nodes)
    }
}

/// Builder for BeekeeperClient.
#[derive(Debug, Default)]
pub struct BeekeeperClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl BeekeeperClientBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<BeekeeperClient, SourceError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(BeekeeperClient {
            client,
            endpoint: trim_slash(self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())),
        })
    }
}
