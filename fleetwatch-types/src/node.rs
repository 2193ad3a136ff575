//! Per-node inventory and status types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::MetricValue;

/// Static attributes of a node, as owned by the inventory service.
///
/// Metric fetches never touch these fields; only an inventory refresh does.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeInfo {
    /// Fleet-assigned node name, unique across the fleet.
    pub vsn: String,

    /// Hardware node identifier.
    #[cfg_attr(feature = "serde", serde(default, alias = "node_id"))]
    pub id: String,

    /// Node type, e.g. `WSN` or `Blade`.
    #[cfg_attr(feature = "serde", serde(default, alias = "type", skip_serializing_if = "Option::is_none"))]
    pub node_type: Option<String>,

    /// Deployment phase, e.g. `Deployed` or `Maintenance`.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub phase: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub project: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub focus: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub city: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub state: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub address: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, alias = "gps_lat", skip_serializing_if = "Option::is_none"))]
    pub lat: Option<f64>,

    #[cfg_attr(feature = "serde", serde(default, alias = "gps_lon", skip_serializing_if = "Option::is_none"))]
    pub lon: Option<f64>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub sensors: Vec<Sensor>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub computes: Vec<Compute>,
}

impl NodeInfo {
    /// Create a node with just its name and hardware id.
    pub fn new(vsn: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            vsn: vsn.into(),
            id: id.into(),
            ..Default::default()
        }
    }
}

/// A sensor installed on a node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sensor {
    pub hw_model: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub capabilities: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub is_active: bool,
}

/// A compute unit (host) on a node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Compute {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub serial_no: String,
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub is_active: bool,
}

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

/// Whether a node is currently sending data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ReportingStatus {
    Reporting,
    #[default]
    NotReporting,
}

impl ReportingStatus {
    /// Label used in facet values and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportingStatus::Reporting => "reporting",
            ReportingStatus::NotReporting => "not-reporting",
        }
    }
}

/// Latest system metrics for a node, grouped by host.
///
/// Replaced as a unit whenever a system batch mentions the node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemVitals {
    /// Timestamp of the most recent `sys.uptime` per host.
    pub last_reported: BTreeMap<String, DateTime<Utc>>,
    /// Most recent `sys.uptime` value (seconds) per host.
    pub uptimes: BTreeMap<String, f64>,
    /// Most recent value of every other system metric, per host then name.
    pub latest: BTreeMap<String, BTreeMap<String, MetricValue>>,
}

/// Outcome of a single health check or sanity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CheckOutcome {
    Pass,
    Warning,
    Fail,
}

/// One check result kept for display (sparkline cells).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckDetail {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub host: Option<String>,
    pub value: f64,
    pub outcome: CheckOutcome,
}

/// Summary of a node's health checks or sanity tests.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckSummary {
    /// Individual results, ordered by timestamp then name.
    pub details: Vec<CheckDetail>,
    pub passed: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl CheckSummary {
    /// Build a summary, sorting the details and counting outcomes.
    pub fn from_details(mut details: Vec<CheckDetail>) -> Self {
        details.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.host.cmp(&b.host))
        });

        let count = |outcome| details.iter().filter(|d| d.outcome == outcome).count();
        let passed = count(CheckOutcome::Pass);
        let warnings = count(CheckOutcome::Warning);
        let failures = count(CheckOutcome::Fail);

        Self {
            details,
            passed,
            warnings,
            failures,
        }
    }

    /// True if no check failed.
    pub fn is_passing(&self) -> bool {
        self.failures == 0
    }
}

/// Latest ambient temperature reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Temperature {
    pub timestamp: DateTime<Utc>,
    /// Degrees Celsius.
    pub value: f64,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub sensor: Option<String>,
}

/// Merged view of a node: inventory attributes plus volatile telemetry.
///
/// Each `Option` group is replaced wholesale by the batch that owns it.
/// `status` and `elapsed_times` are derived on every merge.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeStatus {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub info: NodeInfo,

    pub status: ReportingStatus,

    /// Milliseconds since each host last reported.
    #[cfg_attr(feature = "serde", serde(default))]
    pub elapsed_times: BTreeMap<String, u64>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub system: Option<SystemVitals>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub health: Option<CheckSummary>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub sanity: Option<CheckSummary>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub temperature: Option<Temperature>,
}

impl NodeStatus {
    /// A node known only from inventory: nothing reported yet.
    pub fn from_info(info: NodeInfo) -> Self {
        Self {
            info,
            ..Default::default()
        }
    }

    pub fn vsn(&self) -> &str {
        &self.info.vsn
    }

    pub fn is_reporting(&self) -> bool {
        self.status == ReportingStatus::Reporting
    }

    /// Smallest elapsed time across hosts, if any host has reported.
    pub fn min_elapsed(&self) -> Option<u64> {
        self.elapsed_times.values().copied().min()
    }
}
