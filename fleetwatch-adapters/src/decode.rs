//! Wire decoding shared by the HTTP clients and local fixtures.
//!
//! Metric queries come back as newline-delimited JSON: a line that fails to
//! decode is skipped on its own and the rest of the response is still used.
//! Inventory and rollup responses are single documents, so a bad document is
//! a [`SourceError::Parse`].

use fleetwatch_types::{MetricRecord, NodeInfo, RollupResponse};
use serde::Deserialize;
use tracing::debug;

use crate::SourceError;

/// Decode every well-formed record in `text`, skipping blank and malformed lines.
pub fn decode_records(text: &str) -> Vec<MetricRecord> {
    let mut skipped = 0usize;

    let records: Vec<MetricRecord> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                skipped += 1;
                debug!(line = n + 1, error = %e, "skipping malformed record");
                None
            }
        })
        .collect();

    if skipped > 0 {
        debug!(decoded = records.len(), skipped, "decoded records with skips");
    }

    records
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RollupDocument {
    Envelope { data: RollupResponse },
    Bare(RollupResponse),
}

/// Decode a rollup document: either the `{"data": {...}}` envelope or a bare
/// map. Values are kept as given; aggregation decides what to skip. An empty
/// body is an empty rollup.
pub fn decode_rollup(text: &str) -> Result<RollupResponse, SourceError> {
    if text.trim().is_empty() {
        return Ok(RollupResponse::new());
    }
    let document: RollupDocument = serde_json::from_str(text)?;
    Ok(match document {
        RollupDocument::Envelope { data } => data,
        RollupDocument::Bare(rollup) => rollup,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateDocument {
    Envelope { data: Vec<NodeInfo> },
    Bare(Vec<NodeInfo>),
}

/// Decode an inventory document: either the service's `{"data": [...]}`
/// envelope or a bare array.
pub fn decode_inventory(text: &str) -> Result<Vec<NodeInfo>, SourceError> {
    let document: StateDocument = serde_json::from_str(text)?;
    Ok(match document {
        StateDocument::Envelope { data } => data,
        StateDocument::Bare(nodes) => nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_skips_bad_lines() {
        let text = concat!(
            r#"{"timestamp":"2024-03-01T12:00:00Z","name":"sys.uptime","value":10,"meta":{"node":"a","host":"a.nxcore"}}"#,
            "\n",
            "not json at all\n",
            "\n",
            r#"{"timestamp":"2024-03-01T12:00:05Z","name":"sys.uptime","value":15,"meta":{"node":"b"}}"#,
            "\n",
            r#"{"timestamp":"2024-03-01T12:00:05Z","name":"sys.uptime"}"#,
        );

        let records = decode_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].meta.node.as_deref(), Some("a"));
        assert_eq!(records[1].number(), Some(15.0));
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_records("").is_empty());
        assert!(decode_records("\n\n").is_empty());
    }

    #[test]
    fn test_decode_rollup() {
        let text = r#"{
            "W01C": {
                "registry.sagecontinuum.org/yonghokim/object-counter:0.5.1": [
                    {"timestamp": "2024-03-01T00:00:00Z", "name": "plugin.duration", "value": 3, "meta": {"node": "a"}}
                ]
            }
        }"#;

        let rollup = decode_rollup(text).unwrap();
        assert_eq!(rollup["W01C"].len(), 1);
        assert!(decode_rollup("").unwrap().is_empty());
        assert!(matches!(decode_rollup("[1,2"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_decode_rollup_without_names_in_envelope() {
        let text = r#"{"data": {
            "W01C": {
                "10.31.81.1:5000/local/counter:1.0": [
                    {"timestamp": "2024-03-01T00:00:00Z", "value": 3, "meta": {"vsn": "W01C"}},
                    {"timestamp": "2024-03-01T01:00:00Z", "value": 5, "meta": {"vsn": "W01C"}}
                ]
            },
            "W02D": {}
        }}"#;

        let rollup = decode_rollup(text).unwrap();
        assert_eq!(rollup.len(), 2);
        let records = &rollup["W01C"]["10.31.81.1:5000/local/counter:1.0"];
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].number(), Some(5.0));
        assert!(records[0].name.is_empty());
        assert!(rollup["W02D"].is_empty());
    }

    #[test]
    fn test_decode_rollup_bare_without_names() {
        let text = r#"{"W01C": {"img": [{"timestamp": "2024-03-01T00:00:00Z", "value": 3, "meta": {"node": "a"}}]}}"#;

        let rollup = decode_rollup(text).unwrap();
        assert_eq!(rollup["W01C"]["img"][0].number(), Some(3.0));
        assert!(decode_rollup(r#"{"data": {"W01C": {}}}"#).unwrap().contains_key("W01C"));
    }

    #[test]
    fn test_decode_inventory_envelope_and_bare() {
        let envelope = r#"{"data": [{"vsn": "W01C", "id": "000048B02D05A0A4"}]}"#;
        let bare = r#"[{"vsn": "W01C", "id": "000048B02D05A0A4"}]"#;

        assert_eq!(decode_inventory(envelope).unwrap()[0].vsn, "W01C");
        assert_eq!(decode_inventory(bare).unwrap()[0].id, "000048B02D05A0A4");
        assert!(matches!(decode_inventory("{}"), Err(SourceError::Parse(_))));
    }
}
