//! Query parameters for the telemetry and inventory services.

use std::collections::{BTreeMap, BTreeSet};

use crate::{MetricRecord, NodeInfo};

/// Parameters for a metric query.
///
/// `start` and `end` are relative (`-4d`) or absolute (RFC 3339) times as the
/// telemetry service accepts them. `filter` maps a field name (`name`, `vsn`,
/// `sensor`, ...) to a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsQuery {
    pub start: String,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub end: Option<String>,

    /// Keep only the newest `tail` records per series.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub tail: Option<u32>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub filter: BTreeMap<String, String>,

    /// Storage bucket to read from, e.g. `downsampled`.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub bucket: Option<String>,
}

impl MetricsQuery {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            ..Default::default()
        }
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn tail(mut self, tail: u32) -> Self {
        self.tail = Some(tail);
        self
    }

    /// Add a field pattern. Repeated fields overwrite.
    pub fn filter(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter.insert(field.into(), pattern.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Latest value of every system metric for every named node.
    pub fn system() -> Self {
        Self::new("-4d").filter("name", "sys.*").filter("vsn", ".*").tail(1)
    }

    /// Recent health checks.
    pub fn health() -> Self {
        Self::new("-12h").filter("name", "sys.health.*")
    }

    /// Recent sanity test results.
    pub fn sanity() -> Self {
        Self::new("-12h").filter("name", "sys.sanity_status.*")
    }

    /// Latest ambient temperature from the environment sensor.
    pub fn temperature() -> Self {
        Self::new("-3m")
            .filter("name", "env.temperature")
            .filter("sensor", "bme280")
            .tail(1)
    }

    /// Daily sanity failure totals over the last month.
    pub fn sanity_failures() -> Self {
        Self::new("-30d")
            .filter("name", SANITY_FAILURE_TOTAL)
            .bucket("downsampled")
    }
}

/// Metric name of the downsampled daily sanity failure count.
pub const SANITY_FAILURE_TOTAL: &str = "sanity_failure_total";

/// Group records named `name` into per-node series, keyed by `meta.node`.
///
/// Records without a node are skipped. Each series keeps the input order.
pub fn group_by_node(records: &[MetricRecord], name: &str) -> BTreeMap<String, Vec<MetricRecord>> {
    let mut by_node: BTreeMap<String, Vec<MetricRecord>> = BTreeMap::new();

    for record in records.iter().filter(|r| r.name == name) {
        if let Some(node) = &record.meta.node {
            by_node.entry(node.clone()).or_default().push(record.clone());
        }
    }

    by_node
}

/// Parameters for a usage rollup query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RollupQuery {
    pub start: String,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub end: Option<String>,

    /// Aggregation window, e.g. `hourly` or `daily`.
    pub window: String,
}

impl Default for RollupQuery {
    fn default() -> Self {
        Self {
            start: "-7d".to_string(),
            end: None,
            window: "hourly".to_string(),
        }
    }
}

/// Which inventory entries to keep.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryFilter {
    /// Only nodes belonging to this project (case-insensitive).
    pub project: Option<String>,

    /// Node ids never shown (lab and test devices).
    pub ignore: BTreeSet<String>,
}

impl InventoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn ignore<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(ids.into_iter().map(|id| id.into().to_uppercase()));
        self
    }

    /// Returns true if the node passes the filter.
    pub fn admits(&self, node: &NodeInfo) -> bool {
        if self.ignore.contains(&node.id.to_uppercase()) {
            return false;
        }

        match &self.project {
            Some(project) => node
                .project
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(project)),
            None => true,
        }
    }

    /// Keep only admitted nodes.
    pub fn apply(&self, nodes: Vec<NodeInfo>) -> Vec<NodeInfo> {
        nodes.into_iter().filter(|n| self.admits(n)).collect()
    }
}
