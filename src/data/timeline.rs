//! Timeline projections of usage rollups.
//!
//! A rollup is keyed vsn, then plugin image. It is pivoted two ways:
//!
//! ```text
//! RollupResponse ──▶ filter_by_nodes() ──┬──▶ by_node(): one bucket per vsn, meta.apps breakdown
//!                                       └──▶ by_app():  one bucket per image, meta.nodes breakdown
//! ```
//!
//! In both pivots a bucket holds at most one entry per timestamp, and every
//! entry's `value` is the sum of its breakdown map.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use fleetwatch_types::{
    EntryMeta, MetricRecord, NodeInfo, RollupResponse, TimelineBucket, TimelineEntry, Timelines,
};

/// Shorten a plugin image to its app name.
///
/// Images pushed to a local `ip:port` registry keep their namespace
/// (`10.31.81.1:5000/local/my-app:1.0` becomes `local/my-app`); everything
/// else keeps only the last path segment (`registry.example.org/ns/my-app:2.1`
/// becomes `my-app`). The tag is always dropped.
pub fn shorten_plugin_name(image: &str) -> String {
    let rest = if has_ip_port(image) {
        image.split_once('/').map_or(image, |(_, rest)| rest)
    } else {
        image.rsplit_once('/').map_or(image, |(_, rest)| rest)
    };

    rest.split(':').next().unwrap_or(rest).to_string()
}

/// True if `s` contains `d+.d+.d+.d+:d+` anywhere.
fn has_ip_port(s: &str) -> bool {
    let bytes = s.as_bytes();
    (0..bytes.len()).any(|i| ip_port_at(bytes, i))
}

fn ip_port_at(bytes: &[u8], mut i: usize) -> bool {
    for sep in [b'.', b'.', b'.', b':'] {
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start || bytes.get(i) != Some(&sep) {
            return false;
        }
        i += 1;
    }
    bytes.get(i).is_some_and(u8::is_ascii_digit)
}

/// Keep only the vsns in `nodes`.
pub fn filter_by_nodes<I, S>(rollup: &RollupResponse, nodes: I) -> RollupResponse
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let visible: BTreeSet<String> = nodes.into_iter().map(|n| n.as_ref().to_string()).collect();

    rollup
        .iter()
        .filter(|(vsn, _)| visible.contains(vsn.as_str()))
        .map(|(vsn, plugins)| (vsn.clone(), plugins.clone()))
        .collect()
}

/// Both projections of `rollup`, restricted to the vsns in `nodes`.
pub fn aggregate<I, S>(rollup: &RollupResponse, nodes: I) -> Timelines
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let filtered = filter_by_nodes(rollup, nodes);
    let dropped = rollup.len() - filtered.len();
    if dropped > 0 {
        debug!(dropped, kept = filtered.len(), "rollup nodes outside the fleet");
    }

    Timelines {
        by_node: by_node(&filtered),
        by_app: by_app(&filtered),
    }
}

/// [`aggregate`] for an inventory roster.
pub fn aggregate_for(rollup: &RollupResponse, nodes: &[NodeInfo]) -> Timelines {
    aggregate(rollup, nodes.iter().map(|n| n.vsn.as_str()))
}

fn numeric(record: &MetricRecord) -> Option<f64> {
    record.number().filter(|v| v.is_finite())
}

type Accumulator = BTreeMap<DateTime<Utc>, (f64, BTreeMap<String, f64>)>;

fn add(acc: &mut Accumulator, timestamp: DateTime<Utc>, key: &str, value: f64) {
    let (total, breakdown) = acc.entry(timestamp).or_default();
    *total += value;
    *breakdown.entry(key.to_string()).or_default() += value;
}

fn into_entries(acc: Accumulator, into_meta: fn(BTreeMap<String, f64>) -> EntryMeta) -> Vec<TimelineEntry> {
    acc.into_iter()
        .map(|(timestamp, (value, breakdown))| TimelineEntry {
            timestamp,
            value,
            meta: into_meta(breakdown),
        })
        .collect()
}

/// One bucket per vsn summing every app at each timestamp.
pub fn by_node(rollup: &RollupResponse) -> BTreeMap<String, TimelineBucket> {
    let mut buckets = BTreeMap::new();

    for (vsn, plugins) in rollup {
        let mut acc = Accumulator::new();

        for (image, records) in plugins {
            let short = shorten_plugin_name(image);
            for record in records {
                if let Some(value) = numeric(record) {
                    add(&mut acc, record.timestamp, &short, value);
                }
            }
        }

        if acc.is_empty() {
            continue;
        }

        let entries = into_entries(acc, |apps| EntryMeta {
            apps: Some(apps),
            nodes: None,
        });
        buckets.insert(
            vsn.clone(),
            TimelineBucket {
                label: vsn.clone(),
                display: vsn.clone(),
                entries,
            },
        );
    }

    buckets
}

/// One bucket per plugin image summing every node at each timestamp,
/// ordered by short name (case-insensitive), then image.
pub fn by_app(rollup: &RollupResponse) -> Vec<TimelineBucket> {
    let mut by_image: BTreeMap<&str, Accumulator> = BTreeMap::new();

    for (vsn, plugins) in rollup {
        for (image, records) in plugins {
            for record in records {
                if let Some(value) = numeric(record) {
                    let acc = by_image.entry(image.as_str()).or_default();
                    add(acc, record.timestamp, vsn, value);
                }
            }
        }
    }

    let mut buckets: Vec<TimelineBucket> = by_image
        .into_iter()
        .map(|(image, acc)| TimelineBucket {
            label: image.to_string(),
            display: shorten_plugin_name(image),
            entries: into_entries(acc, |nodes| EntryMeta {
                apps: None,
                nodes: Some(nodes),
            }),
        })
        .collect();

    buckets.sort_by(|a, b| {
        a.display
            .to_lowercase()
            .cmp(&b.display.to_lowercase())
            .then_with(|| a.label.cmp(&b.label))
    });

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetwatch_types::MetricValue;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn usage(h: u32, value: f64) -> MetricRecord {
        MetricRecord::builder("plugin.duration", MetricValue::Number(value))
            .timestamp(hour(h))
            .build()
    }

    const COUNTER: &str = "registry.sagecontinuum.org/yonghokim/object-counter:0.5.1";
    const AVIAN: &str = "registry.sagecontinuum.org/dariodematties/Avian-Diversity:0.2";
    const LOCAL: &str = "10.31.81.1:5000/local/cloud-cover:1.0";

    fn rollup() -> RollupResponse {
        let mut rollup = RollupResponse::new();
        rollup.insert(
            "W01C".to_string(),
            BTreeMap::from([
                (COUNTER.to_string(), vec![usage(1, 10.0), usage(2, 20.0)]),
                (AVIAN.to_string(), vec![usage(1, 5.0)]),
            ]),
        );
        rollup.insert(
            "W02D".to_string(),
            BTreeMap::from([
                (COUNTER.to_string(), vec![usage(1, 1.0)]),
                (LOCAL.to_string(), vec![usage(3, 7.0)]),
            ]),
        );
        rollup.insert(
            "W999".to_string(),
            BTreeMap::from([(COUNTER.to_string(), vec![usage(1, 100.0)])]),
        );
        rollup
    }

    #[test]
    fn test_shorten_plugin_name() {
        assert_eq!(shorten_plugin_name("localhost:5000/sage/my-app:1.0"), "my-app");
        assert_eq!(shorten_plugin_name("registry.example.org/ns/my-app:2.1"), "my-app");
        assert_eq!(shorten_plugin_name("10.31.81.1:5000/local/my-app:1.0"), "local/my-app");
        assert_eq!(shorten_plugin_name("my-app"), "my-app");
        assert_eq!(shorten_plugin_name("my-app:latest"), "my-app");
    }

    #[test]
    fn test_ip_port_detection() {
        assert!(has_ip_port("10.31.81.1:5000/x"));
        assert!(has_ip_port("prefix-192.168.1.1:80"));
        assert!(!has_ip_port("localhost:5000/x"));
        assert!(!has_ip_port("10.31.81:5000/x"));
        assert!(!has_ip_port("10.31.81.1:/x"));
    }

    #[test]
    fn test_node_filter_applies_first() {
        let timelines = aggregate(&rollup(), ["W01C", "W02D"]);

        assert!(!timelines.by_node.contains_key("W999"));
        let counter = timelines.app(COUNTER).unwrap();
        assert_eq!(counter.total(), 31.0);
        assert!(counter
            .entries
            .iter()
            .all(|e| !e.meta.nodes.as_ref().unwrap().contains_key("W999")));
    }

    #[test]
    fn test_by_node_sums_apps_per_timestamp() {
        let timelines = aggregate(&rollup(), ["W01C", "W02D"]);
        let w01c = &timelines.by_node["W01C"];

        assert_eq!(w01c.entries.len(), 2);
        assert_eq!(w01c.entries[0].timestamp, hour(1));
        assert_eq!(w01c.entries[0].value, 15.0);

        let apps = w01c.entries[0].meta.apps.as_ref().unwrap();
        assert_eq!(apps["object-counter"], 10.0);
        assert_eq!(apps["Avian-Diversity"], 5.0);
        assert!(w01c.entries[0].meta.nodes.is_none());
    }

    #[test]
    fn test_values_match_breakdowns() {
        let timelines = aggregate(&rollup(), ["W01C", "W02D", "W999"]);

        for bucket in timelines.by_node.values().chain(timelines.by_app.iter()) {
            for entry in &bucket.entries {
                assert_eq!(entry.value, entry.breakdown_total(), "bucket {}", bucket.label);
            }
        }
    }

    #[test]
    fn test_timestamps_ascending_and_unique() {
        let mut data = rollup();
        data.get_mut("W01C")
            .unwrap()
            .insert(LOCAL.to_string(), vec![usage(2, 1.0), usage(1, 2.0), usage(2, 3.0)]);

        let timelines = aggregate(&data, ["W01C"]);
        for bucket in timelines.by_node.values().chain(timelines.by_app.iter()) {
            assert!(bucket.entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }

        let local = timelines.app(LOCAL).unwrap();
        assert_eq!(local.entries.len(), 2);
        assert_eq!(local.entries[1].value, 4.0);
        assert_eq!(local.entries[1].meta.nodes.as_ref().unwrap()["W01C"], 4.0);
    }

    #[test]
    fn test_by_app_ordered_by_short_name() {
        let timelines = aggregate(&rollup(), ["W01C", "W02D"]);
        let order: Vec<&str> = timelines.by_app.iter().map(|b| b.display.as_str()).collect();

        assert_eq!(order, vec!["Avian-Diversity", "local/cloud-cover", "object-counter"]);
    }

    #[test]
    fn test_same_short_name_ties_break_on_image() {
        let mut data = RollupResponse::new();
        data.insert(
            "W01C".to_string(),
            BTreeMap::from([
                ("registry.b.org/ns/app:1".to_string(), vec![usage(1, 1.0)]),
                ("registry.a.org/ns/App:1".to_string(), vec![usage(1, 1.0)]),
            ]),
        );

        let buckets = by_app(&data);
        assert_eq!(buckets[0].label, "registry.a.org/ns/App:1");
        assert_eq!(buckets[1].label, "registry.b.org/ns/app:1");
    }

    #[test]
    fn test_no_empty_buckets() {
        let mut data = rollup();
        data.insert(
            "W03E".to_string(),
            BTreeMap::from([(
                COUNTER.to_string(),
                vec![MetricRecord::builder("plugin.duration", MetricValue::from("n/a"))
                    .timestamp(hour(1))
                    .build()],
            )]),
        );
        data.insert("W04F".to_string(), BTreeMap::new());

        let timelines = aggregate(&data, ["W03E", "W04F"]);
        assert!(timelines.is_empty());
    }

    #[test]
    fn test_aggregate_for_inventory() {
        let nodes = vec![NodeInfo::new("W02D", "b")];
        let timelines = aggregate_for(&rollup(), &nodes);

        assert_eq!(timelines.by_node.len(), 1);
        assert_eq!(timelines.by_app.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let a = aggregate(&rollup(), ["W02D", "W01C"]);
        let b = aggregate(&rollup(), ["W01C", "W02D"]);
        assert_eq!(a, b);
    }
}
