//! Directory-based source.
//!
//! Serves fixtures laid out as:
//!
//! ```text
//! <dir>/inventory.json   node roster ({"data": [...]} or a bare array)
//! <dir>/rollup.json      usage rollup, vsn -> image -> records
//! <dir>/*.ndjson         metric records, one per line
//! ```
//!
//! Metric queries pool every `.ndjson` file and apply the query's field
//! patterns and `tail` locally. Time bounds are not applied.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use fleetwatch_adapters::decode;
use fleetwatch_types::{
    InventoryFilter, MetricRecord, MetricsQuery, NodeInfo, RollupQuery, RollupResponse,
};

use super::{matches_query, RecordSource, SourceError};

pub const INVENTORY_FILE: &str = "inventory.json";
pub const ROLLUP_FILE: &str = "rollup.json";
pub const RECORDS_EXTENSION: &str = "ndjson";

/// A parsed file and the modification time it was read at.
#[derive(Debug, Clone)]
struct Cached<T> {
    modified: Option<SystemTime>,
    value: Arc<T>,
}

/// The cached value, if it was read at the file's current modification time.
fn fresh<T>(cached: Option<&Cached<T>>, modified: Option<SystemTime>) -> Option<Arc<T>> {
    cached
        .filter(|c| modified.is_some() && c.modified == modified)
        .map(|c| c.value.clone())
}

/// A source that reads fixtures from a directory.
///
/// Each file is re-parsed only when its modification time changes.
#[derive(Debug)]
pub struct DirectorySource {
    dir: PathBuf,
    description: String,
    inventory: Mutex<Option<Cached<Vec<NodeInfo>>>>,
    rollup: Mutex<Option<Cached<RollupResponse>>>,
    records: Mutex<HashMap<PathBuf, Cached<Vec<MetricRecord>>>>,
}

impl DirectorySource {
    /// Create a new directory source for the given path.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let description = format!("dir: {}", dir.display());
        Self {
            dir,
            description,
            inventory: Mutex::new(None),
            rollup: Mutex::new(None),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the directory being served.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    async fn modified(path: &Path) -> Option<SystemTime> {
        tokio::fs::metadata(path).await.ok()?.modified().ok()
    }

    /// Return the cached value if the file is unchanged, otherwise read and
    /// parse it again.
    async fn load<T>(
        path: &Path,
        slot: &Mutex<Option<Cached<T>>>,
        parse: impl FnOnce(&str) -> Result<T, SourceError>,
    ) -> Result<Arc<T>, SourceError> {
        let modified = Self::modified(path).await;

        let cached = fresh(slot.lock().as_ref(), modified);
        if let Some(value) = cached {
            return Ok(value);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let value = Arc::new(parse(&content)?);
        debug!(path = %path.display(), "loaded fixture");

        *slot.lock() = Some(Cached {
            modified,
            value: value.clone(),
        });

        Ok(value)
    }

    async fn record_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RECORDS_EXTENSION) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    async fn load_records(&self, path: &Path) -> Result<Arc<Vec<MetricRecord>>, SourceError> {
        let modified = Self::modified(path).await;

        let cached = fresh(self.records.lock().get(path), modified);
        if let Some(value) = cached {
            return Ok(value);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let value = Arc::new(decode::decode_records(&content));

        self.records.lock().insert(
            path.to_path_buf(),
            Cached {
                modified,
                value: value.clone(),
            },
        );

        Ok(value)
    }
}

/// Keep the newest `tail` records of each (name, node, host) series,
/// preserving input order otherwise.
fn apply_tail(records: Vec<MetricRecord>, tail: u32) -> Vec<MetricRecord> {
    type SeriesKey = (String, Option<String>, Option<String>);

    let mut series: BTreeMap<SeriesKey, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        let key = (r.name.clone(), r.meta.node.clone(), r.meta.host.clone());
        series.entry(key).or_default().push(i);
    }

    let mut keep = vec![false; records.len()];
    for mut indices in series.into_values() {
        indices.sort_by_key(|&i| records[i].timestamp);
        for &i in indices.iter().rev().take(tail as usize) {
            keep[i] = true;
        }
    }

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, keep)| keep.then_some(r))
        .collect()
}

#[async_trait]
impl RecordSource for DirectorySource {
    async fn fetch_inventory(&self, filter: &InventoryFilter) -> Result<Vec<NodeInfo>, SourceError> {
        let path = self.dir.join(INVENTORY_FILE);
        let nodes = Self::load(&path, &self.inventory, decode::decode_inventory).await?;
        Ok(filter.apply(nodes.as_ref().clone()))
    }

    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricRecord>, SourceError> {
        let mut matched = Vec::new();

        for path in self.record_files().await? {
            let records = self.load_records(&path).await?;
            matched.extend(records.iter().filter(|r| matches_query(r, query)).cloned());
        }

        Ok(match query.tail {
            Some(tail) => apply_tail(matched, tail),
            None => matched,
        })
    }

    async fn fetch_rollup(&self, _query: &RollupQuery) -> Result<RollupResponse, SourceError> {
        let path = self.dir.join(ROLLUP_FILE);
        let rollup = Self::load(&path, &self.rollup, decode::decode_rollup).await?;
        Ok(rollup.as_ref().clone())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const INVENTORY: &str = r#"{"data": [
        {"vsn": "W01C", "id": "000048B02D05A0A4", "project": "SAGE"},
        {"vsn": "W02D", "id": "000048B02D0766CD", "project": "DAWN"}
    ]}"#;

    fn write(dir: &TempDir, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn line(ts: &str, name: &str, node: &str, host: &str, value: f64) -> String {
        format!(
            r#"{{"timestamp":"{}","name":"{}","value":{},"meta":{{"node":"{}","host":"{}","vsn":"W01C"}}}}"#,
            ts, name, value, node, host
        )
    }

    #[test]
    fn test_directory_source_new() {
        let source = DirectorySource::new("/tmp/fixtures");
        assert_eq!(source.path(), Path::new("/tmp/fixtures"));
        assert_eq!(source.description(), "dir: /tmp/fixtures");
    }

    #[tokio::test]
    async fn test_inventory_applies_filter() {
        let dir = TempDir::new().unwrap();
        write(&dir, INVENTORY_FILE, INVENTORY);
        let source = DirectorySource::new(dir.path());

        let all = source.fetch_inventory(&InventoryFilter::new()).await.unwrap();
        assert_eq!(all.len(), 2);

        let sage = source
            .fetch_inventory(&InventoryFilter::new().project("sage"))
            .await
            .unwrap();
        assert_eq!(sage.len(), 1);
        assert_eq!(sage[0].vsn, "W01C");

        let ignored = source
            .fetch_inventory(&InventoryFilter::new().ignore(["000048b02d0766cd"]))
            .await
            .unwrap();
        assert_eq!(ignored.len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_pool_files_and_filter() {
        let dir = TempDir::new().unwrap();
        let system = [
            line("2024-03-01T12:00:00Z", "sys.uptime", "a", "nxcore", 1.0),
            "garbage".to_string(),
            line("2024-03-01T12:01:00Z", "sys.uptime", "a", "nxcore", 61.0),
        ]
        .join("\n");
        write(&dir, "system.ndjson", &system);
        write(
            &dir,
            "sanity.ndjson",
            &line("2024-03-01T12:00:00Z", "sys.sanity_status.os", "a", "nxcore", 0.0),
        );
        write(&dir, "notes.txt", "ignored");
        let source = DirectorySource::new(dir.path());

        let all_sys = source.fetch_metrics(&MetricsQuery::new("-1d").filter("name", "sys.*")).await.unwrap();
        assert_eq!(all_sys.len(), 3);

        let sanity = source.fetch_metrics(&MetricsQuery::sanity()).await.unwrap();
        assert_eq!(sanity.len(), 1);

        let latest = source.fetch_metrics(&MetricsQuery::system()).await.unwrap();
        let uptimes: Vec<_> = latest.iter().filter(|r| r.name == "sys.uptime").collect();
        assert_eq!(uptimes.len(), 1);
        assert_eq!(uptimes[0].number(), Some(61.0));
    }

    #[tokio::test]
    async fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path());

        assert!(matches!(
            source.fetch_inventory(&InventoryFilter::new()).await,
            Err(SourceError::Io(_))
        ));
        assert!(source.fetch_metrics(&MetricsQuery::system()).await.unwrap().is_empty());
        assert!(source.fetch_rollup(&RollupQuery::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_inventory_is_parse_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, INVENTORY_FILE, "not valid json");
        let source = DirectorySource::new(dir.path());

        assert!(matches!(
            source.fetch_inventory(&InventoryFilter::new()).await,
            Err(SourceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_rollup_and_reload() {
        let dir = TempDir::new().unwrap();
        write(&dir, ROLLUP_FILE, r#"{"W01C": {}}"#);
        let source = DirectorySource::new(dir.path());

        let first = source.fetch_rollup(&RollupQuery::default()).await.unwrap();
        assert!(first.contains_key("W01C"));

        // Cached copy is served while the file is unchanged
        let again = source.fetch_rollup(&RollupQuery::default()).await.unwrap();
        assert_eq!(first, again);

        // Rewrite with a different mtime
        std::thread::sleep(std::time::Duration::from_millis(20));
        write(&dir, ROLLUP_FILE, r#"{"W02D": {}}"#);
        let file = std::fs::File::options()
            .write(true)
            .open(dir.path().join(ROLLUP_FILE))
            .unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();

        let reloaded = source.fetch_rollup(&RollupQuery::default()).await.unwrap();
        assert!(reloaded.contains_key("W02D"));
    }

    #[test]
    fn test_apply_tail() {
        let records: Vec<MetricRecord> = [
            ("2024-03-01T12:00:00Z", "a"),
            ("2024-03-01T12:02:00Z", "a"),
            ("2024-03-01T12:01:00Z", "a"),
            ("2024-03-01T12:00:00Z", "b"),
        ]
        .iter()
        .map(|(ts, node)| {
            serde_json::from_str(&line(ts, "sys.uptime", node, "nxcore", 1.0)).unwrap()
        })
        .collect();

        let kept = apply_tail(records, 2);
        let stamps: Vec<String> = kept.iter().map(|r| r.timestamp.format("%M").to_string()).collect();
        assert_eq!(stamps, vec!["02", "01", "00"]);
        assert_eq!(kept[2].meta.node.as_deref(), Some("b"));
    }
}
