//! Metric records as produced by the telemetry service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// A single timestamped observation.
///
/// Records are immutable once decoded. The `meta` block identifies where the
/// observation came from (node, host, plugin, sensor).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricRecord {
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,

    /// Metric name, e.g. `sys.uptime` or `sys.sanity_status.os`. Rollup
    /// records omit it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,

    /// Observed value.
    pub value: MetricValue,

    /// Origin of the observation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub meta: RecordMeta,
}

impl MetricRecord {
    /// Create a builder for a record with the given name and value.
    ///
    /// The timestamp defaults to the Unix epoch; set it with
    /// [`MetricRecordBuilder::timestamp`].
    pub fn builder(name: impl Into<String>, value: MetricValue) -> MetricRecordBuilder {
        MetricRecordBuilder::new(name, value)
    }

    /// Numeric value of the record, if it has one.
    pub fn number(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

/// A metric value: the service emits both numbers and strings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Returns the numeric value, parsing text that holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Returns the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// Provenance of a record.
///
/// `node` is optional at decode time: records without it are excluded during
/// aggregation instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordMeta {
    /// Node identifier (hardware id, lower-case hex in practice).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub node: Option<String>,

    /// Compute host on the node that emitted the record.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub host: Option<String>,

    /// Fleet-assigned node name.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub vsn: Option<String>,

    /// Plugin image that produced the record.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub plugin: Option<String>,

    /// Sensor the reading came from.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub sensor: Option<String>,

    /// Test severity (`fatal` or `warning`), set on sanity results.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub severity: Option<String>,

    /// Any other tags.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub extra: BTreeMap<String, String>,
}

/// Builder for [`MetricRecord`], mostly useful in tests and fixtures.
#[derive(Debug)]
pub struct MetricRecordBuilder {
    record: MetricRecord,
}

impl MetricRecordBuilder {
    fn new(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            record: MetricRecord {
                timestamp: DateTime::<Utc>::default(),
                name: name.into(),
                value,
                meta: RecordMeta::default(),
            },
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.record.meta.node = Some(node.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.record.meta.host = Some(host.into());
        self
    }

    pub fn vsn(mut self, vsn: impl Into<String>) -> Self {
        self.record.meta.vsn = Some(vsn.into());
        self
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.record.meta.plugin = Some(plugin.into());
        self
    }

    pub fn sensor(mut self, sensor: impl Into<String>) -> Self {
        self.record.meta.sensor = Some(sensor.into());
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.record.meta.severity = Some(severity.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.meta.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> MetricRecord {
        self.record
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_numeric_record() {
        let json = r#"{
            "timestamp": "2024-03-01T12:00:00.123456789Z",
            "name": "sys.uptime",
            "value": 86400.5,
            "meta": {"node": "000048b02d05a0a4", "host": "000048b02d05a0a4.ws-nxcore", "vsn": "W01C", "zone": "core"}
        }"#;

        let record: MetricRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name, "sys.uptime");
        assert_eq!(record.number(), Some(86400.5));
        assert_eq!(record.meta.vsn.as_deref(), Some("W01C"));
        assert_eq!(record.meta.extra.get("zone").map(String::as_str), Some("core"));
    }

    #[test]
    fn test_deserialize_text_value() {
        let json = r#"{"timestamp":"2024-03-01T12:00:00Z","name":"upload","value":"https://storage/x.jpg","meta":{"node":"abc"}}"#;

        let record: MetricRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.value.as_str(), Some("https://storage/x.jpg"));
        assert_eq!(record.number(), None);
    }

    #[test]
    fn test_missing_node_still_decodes() {
        let json = r#"{"timestamp":"2024-03-01T12:00:00Z","name":"sys.uptime","value":1,"meta":{}}"#;

        let record: MetricRecord = serde_json::from_str(json).unwrap();
        assert!(record.meta.node.is_none());
    }

    #[test]
    fn test_text_number_parses() {
        assert_eq!(MetricValue::from("42.5").as_f64(), Some(42.5));
        assert_eq!(MetricValue::from("n/a").as_f64(), None);
    }
}
