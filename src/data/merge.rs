//! Per-node status merging.
//!
//! [`StatusMerger`] folds an inventory snapshot and any number of partial
//! metric fetches into one [`NodeStatus`] per node. Each fetch owns one
//! volatile group; a node mentioned by a fetch gets that group rebuilt from
//! the fetch alone, every other node keeps what it had.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use fleetwatch_types::{
    CheckDetail, CheckOutcome, CheckSummary, MetricRecord, NodeInfo, NodeStatus, ReportingStatus,
    SystemVitals, Temperature,
};

/// Name of the metric whose timestamp marks a host as reporting.
pub const UPTIME_METRIC: &str = "sys.uptime";

/// Thresholds for reporting status and freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Elapsed time at or beyond which a node is not reporting.
    pub fail: Duration,
    /// Elapsed time beyond which a report is considered late.
    pub warning: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fail: Duration::from_secs(10 * 60),
            warning: Duration::from_secs(3 * 60),
        }
    }
}

impl Thresholds {
    /// Classify an elapsed time in milliseconds. `None` means never reported.
    pub fn classify(&self, elapsed_ms: Option<u64>) -> Freshness {
        match elapsed_ms {
            None => Freshness::Stale,
            Some(ms) if ms >= self.fail.as_millis() as u64 => Freshness::Stale,
            Some(ms) if ms > self.warning.as_millis() as u64 => Freshness::Warning,
            Some(_) => Freshness::Fresh,
        }
    }

    fn is_reporting(&self, elapsed_ms: u64) -> bool {
        (elapsed_ms as u128) < self.fail.as_millis()
    }
}

/// How recently a node last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Freshness {
    Fresh,
    Warning,
    Stale,
}

impl Freshness {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Freshness::Fresh => "OK",
            Freshness::Warning => "LATE",
            Freshness::Stale => "STALE",
        }
    }
}

/// Freshness of a node's best host.
pub fn freshness(node: &NodeStatus, thresholds: &Thresholds) -> Freshness {
    thresholds.classify(node.min_elapsed())
}

/// The volatile group a metric batch rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    System,
    Health,
    Sanity,
    Temperature,
}

impl BatchKind {
    pub const ALL: [BatchKind; 4] = [
        BatchKind::System,
        BatchKind::Health,
        BatchKind::Sanity,
        BatchKind::Temperature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::System => "system",
            BatchKind::Health => "health",
            BatchKind::Sanity => "sanity",
            BatchKind::Temperature => "temperature",
        }
    }

    /// Host-less records can't be attributed within these groups.
    fn requires_host(&self) -> bool {
        !matches!(self, BatchKind::Temperature)
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metric kind: {}", s))
    }
}

/// One successful metric fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBatch {
    pub kind: BatchKind,
    pub records: Vec<MetricRecord>,
}

impl MetricBatch {
    pub fn new(kind: BatchKind, records: Vec<MetricRecord>) -> Self {
        Self { kind, records }
    }
}

/// Merges inventory and metric batches into per-node status.
///
/// The evaluation instant is fixed at construction so that [`merge`](Self::merge)
/// is a pure function of its arguments.
#[derive(Debug, Clone)]
pub struct StatusMerger {
    thresholds: Thresholds,
    now: DateTime<Utc>,
}

impl StatusMerger {
    /// Create a merger evaluating elapsed times against the current time.
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            now: Utc::now(),
        }
    }

    /// Evaluate elapsed times against `now` instead.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Merge into a vsn-ordered list of node status.
    ///
    /// Nodes are seeded from `inventory`, or from `previous` when inventory
    /// is unavailable. Volatile groups are carried from `previous`, then
    /// replaced per node by any batch that mentions the node.
    pub fn merge(
        &self,
        previous: Option<&[NodeStatus]>,
        inventory: Option<&[NodeInfo]>,
        batches: &[MetricBatch],
    ) -> Vec<NodeStatus> {
        let mut nodes = seed(previous, inventory);
        let resolver = Resolver::new(&nodes);

        for batch in batches {
            let grouped = resolver.group(batch);
            debug!(
                kind = %batch.kind,
                records = batch.records.len(),
                nodes = grouped.len(),
                "merging batch"
            );

            for (vsn, records) in grouped {
                if let Some(node) = nodes.get_mut(&vsn) {
                    apply(node, batch.kind, &records);
                }
            }
        }

        nodes
            .into_values()
            .map(|mut node| {
                self.derive(&mut node);
                node
            })
            .collect()
    }

    fn derive(&self, node: &mut NodeStatus) {
        node.elapsed_times = node
            .system
            .as_ref()
            .map(|system| {
                system
                    .last_reported
                    .iter()
                    .map(|(host, at)| {
                        let elapsed = (self.now - *at).num_milliseconds().max(0) as u64;
                        (host.clone(), elapsed)
                    })
                    .collect()
            })
            .unwrap_or_default();

        node.status = match node.min_elapsed() {
            Some(ms) if self.thresholds.is_reporting(ms) => ReportingStatus::Reporting,
            _ => ReportingStatus::NotReporting,
        };
    }
}

fn seed(previous: Option<&[NodeStatus]>, inventory: Option<&[NodeInfo]>) -> BTreeMap<String, NodeStatus> {
    let carried: HashMap<&str, &NodeStatus> = previous
        .unwrap_or_default()
        .iter()
        .map(|n| (n.vsn(), n))
        .collect();

    match inventory {
        Some(inventory) => inventory
            .iter()
            .map(|info| {
                let mut node = NodeStatus::from_info(info.clone());
                if let Some(prev) = carried.get(info.vsn.as_str()) {
                    node.system = prev.system.clone();
                    node.health = prev.health.clone();
                    node.sanity = prev.sanity.clone();
                    node.temperature = prev.temperature.clone();
                }
                (info.vsn.clone(), node)
            })
            .collect(),
        None => previous
            .unwrap_or_default()
            .iter()
            .map(|n| (n.vsn().to_string(), n.clone()))
            .collect(),
    }
}

/// Maps a record to the seeded node it belongs to.
struct Resolver {
    vsns: BTreeSet<String>,
    by_id: HashMap<String, String>,
}

impl Resolver {
    fn new(nodes: &BTreeMap<String, NodeStatus>) -> Self {
        Self {
            vsns: nodes.keys().cloned().collect(),
            by_id: nodes
                .values()
                .filter(|n| !n.info.id.is_empty())
                .map(|n| (n.info.id.to_lowercase(), n.vsn().to_string()))
                .collect(),
        }
    }

    fn resolve(&self, record: &MetricRecord) -> Option<String> {
        let node = record.meta.node.as_deref()?;

        if let Some(vsn) = record.meta.vsn.as_deref() {
            if self.vsns.contains(vsn) {
                return Some(vsn.to_string());
            }
        }

        self.by_id.get(&node.to_lowercase()).cloned()
    }

    fn group<'a>(&self, batch: &'a MetricBatch) -> BTreeMap<String, Vec<&'a MetricRecord>> {
        let mut grouped: BTreeMap<String, Vec<&MetricRecord>> = BTreeMap::new();
        let mut dropped = 0usize;

        for record in &batch.records {
            if batch.kind.requires_host() && record.meta.host.is_none() {
                dropped += 1;
                continue;
            }
            match self.resolve(record) {
                Some(vsn) => grouped.entry(vsn).or_default().push(record),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(kind = %batch.kind, dropped, "dropped unattributable records");
        }

        grouped
    }
}

fn apply(node: &mut NodeStatus, kind: BatchKind, records: &[&MetricRecord]) {
    match kind {
        BatchKind::System => node.system = Some(system_vitals(records)),
        BatchKind::Health => node.health = Some(health_summary(records)),
        BatchKind::Sanity => node.sanity = Some(sanity_summary(records)),
        BatchKind::Temperature => node.temperature = latest_temperature(records),
    }
}

fn system_vitals(records: &[&MetricRecord]) -> SystemVitals {
    let mut vitals = SystemVitals::default();
    let mut seen: HashMap<(&str, &str), DateTime<Utc>> = HashMap::new();

    for record in records {
        let Some(host) = record.meta.host.as_deref() else {
            continue;
        };

        let key = (host, record.name.as_str());
        if seen.get(&key).is_some_and(|at| *at >= record.timestamp) {
            continue;
        }
        seen.insert(key, record.timestamp);

        if record.name == UPTIME_METRIC {
            vitals.last_reported.insert(host.to_string(), record.timestamp);
            match record.number() {
                Some(uptime) => vitals.uptimes.insert(host.to_string(), uptime),
                None => vitals.uptimes.remove(host),
            };
        } else {
            vitals
                .latest
                .entry(host.to_string())
                .or_default()
                .insert(record.name.clone(), record.value.clone());
        }
    }

    vitals
}

fn check_detail(record: &MetricRecord, outcome: CheckOutcome, value: f64) -> CheckDetail {
    CheckDetail {
        timestamp: record.timestamp,
        name: record.name.clone(),
        host: record.meta.host.clone(),
        value,
        outcome,
    }
}

/// Health probes report non-zero when healthy.
fn health_summary(records: &[&MetricRecord]) -> CheckSummary {
    let details = records
        .iter()
        .filter_map(|r| {
            let value = r.number()?;
            let outcome = if value != 0.0 {
                CheckOutcome::Pass
            } else {
                CheckOutcome::Fail
            };
            Some(check_detail(r, outcome, value))
        })
        .collect();

    CheckSummary::from_details(details)
}

/// Sanity tests report zero on success; a failure's weight comes from its
/// severity tag.
fn sanity_summary(records: &[&MetricRecord]) -> CheckSummary {
    let details = records
        .iter()
        .filter_map(|r| {
            let value = r.number()?;
            let outcome = if value == 0.0 {
                CheckOutcome::Pass
            } else if r.meta.severity.as_deref() == Some("warning") {
                CheckOutcome::Warning
            } else {
                CheckOutcome::Fail
            };
            Some(check_detail(r, outcome, value))
        })
        .collect();

    CheckSummary::from_details(details)
}

fn latest_temperature(records: &[&MetricRecord]) -> Option<Temperature> {
    records
        .iter()
        .filter_map(|r| r.number().map(|value| (r, value)))
        .fold(None::<(&&MetricRecord, f64)>, |best, (r, value)| match best {
            Some((b, _)) if b.timestamp >= r.timestamp => best,
            _ => Some((r, value)),
        })
        .map(|(r, value)| Temperature {
            timestamp: r.timestamp,
            value,
            sensor: r.meta.sensor.clone(),
        })
}
