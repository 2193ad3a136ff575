//! Timeline projections of usage rollups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::MetricRecord;

/// Usage rollup as returned by the telemetry service: vsn, then plugin image,
/// then the records for that pair.
pub type RollupResponse = BTreeMap<String, BTreeMap<String, Vec<MetricRecord>>>;

/// Per-timestamp breakdown of an entry's value.
///
/// By-node entries carry `apps` (short app name to value); by-app entries carry
/// `nodes` (vsn to value).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryMeta {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub apps: Option<BTreeMap<String, f64>>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub nodes: Option<BTreeMap<String, f64>>,
}

/// One point on a timeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    /// Sum of the breakdown in `meta`.
    pub value: f64,
    pub meta: EntryMeta,
}

impl TimelineEntry {
    /// Sum of whichever breakdown map is present.
    pub fn breakdown_total(&self) -> f64 {
        let apps: f64 = self.meta.apps.iter().flat_map(|m| m.values()).sum();
        let nodes: f64 = self.meta.nodes.iter().flat_map(|m| m.values()).sum();
        apps + nodes
    }
}

/// A labelled timeline, entries ascending by timestamp with no duplicates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimelineBucket {
    /// vsn (by node) or fully-qualified plugin image (by app).
    pub label: String,
    /// Human label: the vsn, or the short app name.
    pub display: String,
    pub entries: Vec<TimelineEntry>,
}

impl TimelineBucket {
    /// Total of all entry values.
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.value).sum()
    }

    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.entries.first().map(|e| e.timestamp)
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }
}

/// Both pivots of one rollup.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timelines {
    pub by_node: BTreeMap<String, TimelineBucket>,
    /// Ordered by short app name (case-insensitive), then full image.
    pub by_app: Vec<TimelineBucket>,
}

impl Timelines {
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty() && self.by_app.is_empty()
    }

    /// Find an app bucket by its fully-qualified image.
    pub fn app(&self, image: &str) -> Option<&TimelineBucket> {
        self.by_app.iter().find(|b| b.label == image)
    }
}
