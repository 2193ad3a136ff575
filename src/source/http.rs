//! Live HTTP source.

use async_trait::async_trait;

use fleetwatch_adapters::beehive::BeehiveClient;
use fleetwatch_adapters::beekeeper::BeekeeperClient;
use fleetwatch_types::{
    InventoryFilter, MetricRecord, MetricsQuery, NodeInfo, RollupQuery, RollupResponse,
};

use super::{RecordSource, SourceError};
use crate::config::Settings;

/// Source backed by the telemetry and inventory services.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    beehive: BeehiveClient,
    beekeeper: BeekeeperClient,
    description: String,
}

impl HttpRecordSource {
    pub fn new(beehive: BeehiveClient, beekeeper: BeekeeperClient) -> Self {
        let description = format!("http: {}", beehive.endpoint());
        Self {
            beehive,
            beekeeper,
            description,
        }
    }

    /// Build both clients from configured endpoints and timeout.
    pub fn from_settings(settings: &Settings) -> Result<Self, SourceError> {
        let mut beehive = BeehiveClient::builder()
            .endpoint(&settings.endpoints.beehive)
            .timeout(settings.http.timeout);
        if let Some(rollup) = &settings.endpoints.rollup {
            beehive = beehive.rollup_endpoint(rollup);
        }

        let beekeeper = BeekeeperClient::builder()
            .endpoint(&settings.endpoints.beekeeper)
            .timeout(settings.http.timeout);

        Ok(Self::new(beehive.build()?, beekeeper.build()?))
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_inventory(&self, filter: &InventoryFilter) -> Result<Vec<NodeInfo>, SourceError> {
        self.beekeeper.state(filter).await
    }

    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricRecord>, SourceError> {
        self.beehive.query(query).await
    }

    async fn fetch_rollup(&self, query: &RollupQuery) -> Result<RollupResponse, SourceError> {
        self.beehive.rollup(query).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}
