//! Fleet-wide counts and JSON export.

use serde::Serialize;

use fleetwatch_types::NodeStatus;

use super::duration::format_elapsed;
use super::merge::{freshness, Freshness, Thresholds};

/// Headline counts for a set of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub reporting: usize,
    pub not_reporting: usize,
    /// Reporting, but later than the warning threshold.
    pub late: usize,
    /// Nodes with at least one failing health check.
    pub health_failures: usize,
    /// Nodes with at least one fatal sanity failure.
    pub sanity_fatal: usize,
    /// Nodes with sanity warnings but no fatal failures.
    pub sanity_warning: usize,
}

impl FleetSummary {
    pub fn from_nodes(nodes: &[NodeStatus], thresholds: &Thresholds) -> Self {
        let mut summary = FleetSummary {
            total: nodes.len(),
            ..Default::default()
        };

        for node in nodes {
            if node.is_reporting() {
                summary.reporting += 1;
                if freshness(node, thresholds) == Freshness::Warning {
                    summary.late += 1;
                }
            } else {
                summary.not_reporting += 1;
            }

            if node.health.as_ref().is_some_and(|h| h.failures > 0) {
                summary.health_failures += 1;
            }

            match &node.sanity {
                Some(s) if s.failures > 0 => summary.sanity_fatal += 1,
                Some(s) if s.warnings > 0 => summary.sanity_warning += 1,
                _ => {}
            }
        }

        summary
    }

    /// One-line rendering for logs and the terminal.
    pub fn line(&self) -> String {
        format!(
            "{} nodes: {} reporting ({} late), {} not reporting, {} health failing, {} sanity fatal, {} sanity warning",
            self.total,
            self.reporting,
            self.late,
            self.not_reporting,
            self.health_failures,
            self.sanity_fatal,
            self.sanity_warning
        )
    }
}

/// One line per node: vsn, freshness and time since its last report.
pub fn node_line(node: &NodeStatus, thresholds: &Thresholds) -> String {
    let seen = node
        .min_elapsed()
        .map(format_elapsed)
        .unwrap_or_else(|| "never".to_string());
    format!("{:<8} {:<5} {}", node.vsn(), freshness(node, thresholds).symbol(), seen)
}

/// Export document: summary plus the nodes it was computed from.
#[derive(Debug, Serialize)]
pub struct FleetExport<'a> {
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub summary: FleetSummary,
    pub nodes: &'a [NodeStatus],
}

impl<'a> FleetExport<'a> {
    pub fn new(
        nodes: &'a [NodeStatus],
        thresholds: &Thresholds,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            updated_at,
            summary: FleetSummary::from_nodes(nodes, thresholds),
            nodes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_types::{CheckSummary, NodeInfo, ReportingStatus};
    use std::collections::BTreeMap;

    fn node(vsn: &str, elapsed_ms: Option<u64>) -> NodeStatus {
        let mut node = NodeStatus::from_info(NodeInfo::new(vsn, vsn));
        if let Some(ms) = elapsed_ms {
            node.elapsed_times = BTreeMap::from([("nxcore".to_string(), ms)]);
            if ms < 600_000 {
                node.status = ReportingStatus::Reporting;
            }
        }
        node
    }

    #[test]
    fn test_counts() {
        let mut sick = node("W03", Some(1_000));
        sick.health = Some(CheckSummary {
            failures: 2,
            ..Default::default()
        });
        sick.sanity = Some(CheckSummary {
            warnings: 1,
            ..Default::default()
        });

        let mut broken = node("W04", None);
        broken.sanity = Some(CheckSummary {
            warnings: 3,
            failures: 1,
            ..Default::default()
        });

        let nodes = vec![node("W01", Some(5_000)), node("W02", Some(300_000)), sick, broken];
        let summary = FleetSummary::from_nodes(&nodes, &Thresholds::default());

        assert_eq!(summary.total, 4);
        assert_eq!(summary.reporting, 3);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.not_reporting, 1);
        assert_eq!(summary.health_failures, 1);
        assert_eq!(summary.sanity_fatal, 1);
        assert_eq!(summary.sanity_warning, 1);
        assert!(summary.line().starts_with("4 nodes: 3 reporting (1 late)"));
    }

    #[test]
    fn test_node_line() {
        let thresholds = Thresholds::default();

        assert_eq!(node_line(&node("W01", Some(5_000)), &thresholds), "W01      OK    5s ago");
        assert_eq!(node_line(&node("W02", Some(300_000)), &thresholds), "W02      LATE  5m ago");
        assert_eq!(node_line(&node("W04", None), &thresholds), "W04      STALE never");
    }

    #[test]
    fn test_export_json() {
        let nodes = vec![node("W01", Some(5_000))];
        let export = FleetExport::new(&nodes, &Thresholds::default(), chrono::DateTime::default());

        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["reporting"], 1);
        assert_eq!(value["nodes"][0]["vsn"], "W01");
        assert_eq!(value["nodes"][0]["status"], "reporting");
    }
}
