//! Upstream record sources.
//!
//! This module provides a trait-based abstraction over where telemetry comes
//! from: the live HTTP services, or a directory of fixture files standing in
//! for them.

mod dir;
mod http;
mod pattern;

pub use dir::DirectorySource;
pub use http::HttpRecordSource;
pub use pattern::{matches_query, Pattern};

use std::fmt::Debug;

use async_trait::async_trait;

pub use fleetwatch_adapters::SourceError;
use fleetwatch_types::{
    InventoryFilter, MetricRecord, MetricsQuery, NodeInfo, RollupQuery, RollupResponse,
};

/// Trait for fetching telemetry from an upstream.
///
/// Every call is independent; a failure in one says nothing about the others.
/// Implementations must be cheap to share across tasks.
///
/// # Example
///
/// ```no_run
/// use fleetwatch::{DirectorySource, RecordSource};
/// use fleetwatch_types::{InventoryFilter, MetricsQuery};
///
/// # tokio_test::block_on(async {
/// let source = DirectorySource::new("fixtures");
/// let nodes = source.fetch_inventory(&InventoryFilter::new()).await?;
/// let system = source.fetch_metrics(&MetricsQuery::system()).await?;
/// println!("{} nodes, {} system records", nodes.len(), system.len());
/// # Ok::<(), fleetwatch::SourceError>(())
/// # });
/// ```
#[async_trait]
pub trait RecordSource: Send + Sync + Debug {
    /// Fetch the node roster, keeping only nodes the filter admits.
    async fn fetch_inventory(&self, filter: &InventoryFilter) -> Result<Vec<NodeInfo>, SourceError>;

    /// Run a metric query. Malformed records are dropped, not reported.
    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricRecord>, SourceError>;

    /// Fetch a usage rollup keyed vsn, then plugin image.
    async fn fetch_rollup(&self, query: &RollupQuery) -> Result<RollupResponse, SourceError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}
