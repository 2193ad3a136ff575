//! End-to-end scheduler runs against in-memory and fixture-directory sources.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use fleetwatch::config::MetricSpec;
use fleetwatch::source::matches_query;
use fleetwatch::{
    BatchKind, DirectorySource, Publication, RecordSource, Scheduler, SchedulerPhase, Settings,
    SourceError, StatusPipeline, Thresholds, TimelinePipeline,
};
use fleetwatch_types::{
    InventoryFilter, MetricRecord, MetricValue, MetricsQuery, NodeInfo, NodeStatus,
    ReportingStatus, RollupQuery, RollupResponse,
};

#[derive(Debug, Default)]
struct MemorySource {
    nodes: Vec<NodeInfo>,
    records: Vec<MetricRecord>,
    metrics_down: AtomicBool,
    inventory_calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_inventory(&self, filter: &InventoryFilter) -> Result<Vec<NodeInfo>, SourceError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(filter.apply(self.nodes.clone()))
    }

    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<Vec<MetricRecord>, SourceError> {
        if self.metrics_down.load(Ordering::SeqCst) {
            return Err(SourceError::Timeout);
        }
        Ok(self
            .records
            .iter()
            .filter(|r| matches_query(r, query))
            .cloned()
            .collect())
    }

    async fn fetch_rollup(&self, _query: &RollupQuery) -> Result<RollupResponse, SourceError> {
        Err(SourceError::Status {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn description(&self) -> &str {
        "memory"
    }
}

fn fleet() -> Vec<NodeInfo> {
    vec![
        NodeInfo::new("W0A1", "000048B02D05A0A1"),
        NodeInfo::new("W0B2", "000048B02D05B0B2"),
    ]
}

fn uptime(vsn: &str, node: &str, host: &str) -> MetricRecord {
    MetricRecord::builder("sys.uptime", MetricValue::Number(3600.0))
        .timestamp(Utc::now())
        .node(node)
        .host(host)
        .vsn(vsn)
        .build()
}

fn pipeline(source: Arc<MemorySource>) -> StatusPipeline {
    StatusPipeline::new(
        source,
        InventoryFilter::new(),
        MetricSpec::defaults(),
        Thresholds::default(),
    )
}

async fn first_ready(rx: &mut tokio::sync::watch::Receiver<Publication<Vec<NodeStatus>>>) -> Arc<Vec<NodeStatus>> {
    let publication = rx.wait_for(|p| p.is_ready()).await.unwrap().clone();
    publication.value().cloned().unwrap()
}

#[tokio::test]
async fn test_fresh_uptime_marks_only_that_node_reporting() {
    let source = Arc::new(MemorySource {
        nodes: fleet(),
        records: vec![uptime("W0A1", "000048b02d05a0a1", "000048b02d05a0a1.ws-nxcore")],
        ..Default::default()
    });

    let handle = Scheduler::new(pipeline(source), Duration::from_secs(3600)).spawn();
    let nodes = first_ready(&mut handle.subscribe()).await;

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].vsn(), "W0A1");
    assert_eq!(nodes[0].status, ReportingStatus::Reporting);
    assert_eq!(nodes[1].vsn(), "W0B2");
    assert_eq!(nodes[1].status, ReportingStatus::NotReporting);
    assert!(nodes[1].system.is_none());

    handle.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_metric_outage_keeps_previous_groups() {
    let source = Arc::new(MemorySource {
        nodes: fleet(),
        records: vec![uptime("W0A1", "000048b02d05a0a1", "000048b02d05a0a1.ws-nxcore")],
        ..Default::default()
    });

    let handle = Scheduler::new(pipeline(source.clone()), Duration::from_millis(10)).spawn();
    let mut rx = handle.subscribe();
    let first = first_ready(&mut rx).await;

    source.metrics_down.store(true, Ordering::SeqCst);
    let calls = source.inventory_calls.load(Ordering::SeqCst);
    rx.wait_for(|p| p.cycle().is_some_and(|c| c > calls as u64 + 1))
        .await
        .unwrap();
    let later = rx.borrow().value().cloned().unwrap();

    assert_eq!(later.len(), 2);
    assert_eq!(later[0].system, first[0].system);
    assert_eq!(later[0].status, ReportingStatus::Reporting);

    handle.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_fetch_in_flight_publishes_nothing() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(MemorySource {
        nodes: fleet(),
        gate: Some(gate.clone()),
        ..Default::default()
    });

    let handle = Scheduler::new(pipeline(source.clone()), Duration::from_millis(10)).spawn();
    handle
        .phases()
        .wait_for(|p| *p == SchedulerPhase::Fetching)
        .await
        .unwrap();

    handle.stop();
    gate.add_permits(1);
    handle
        .phases()
        .wait_for(|p| *p == SchedulerPhase::Cancelled)
        .await
        .unwrap();

    assert_eq!(source.inventory_calls.load(Ordering::SeqCst), 1);
    assert!(matches!(handle.latest(), Publication::Pending));
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_timeline_without_rollup_still_publishes_fleet() {
    let source = Arc::new(MemorySource {
        nodes: fleet(),
        ..Default::default()
    });
    let pipeline = TimelinePipeline::new(source, InventoryFilter::new(), RollupQuery::default());

    let handle = Scheduler::new(pipeline, Duration::from_secs(3600)).spawn();
    let mut rx = handle.subscribe();
    let view = rx.wait_for(|p| p.is_ready()).await.unwrap().value().cloned().unwrap();

    assert_eq!(view.nodes.len(), 2);
    assert!(view.timelines.is_empty());

    handle.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_directory_fixture_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let write = |name: &str, content: &str| {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    };

    write(
        "inventory.json",
        r#"{"data": [
            {"vsn": "W0A1", "node_id": "000048B02D05A0A1", "project": "SAGE"},
            {"vsn": "W0B2", "node_id": "000048B02D05B0B2", "project": "SAGE"},
            {"vsn": "W0C3", "node_id": "000048B02D0766CD", "project": "SAGE"}
        ]}"#,
    );
    let now = Utc::now().to_rfc3339();
    write(
        "system.ndjson",
        &format!(
            r#"{{"timestamp":"{now}","name":"sys.uptime","value":10,"meta":{{"node":"000048b02d05b0b2","host":"000048b02d05b0b2.ws-nxcore","vsn":"W0B2"}}}}
{{"timestamp":"{now}","name":"sys.health.net.ping","value":0,"meta":{{"node":"000048b02d05b0b2","host":"000048b02d05b0b2.ws-nxcore","vsn":"W0B2"}}}}"#
        ),
    );

    let settings = Settings::default();
    let source = Arc::new(DirectorySource::new(dir.path()));
    let pipeline = StatusPipeline::from_settings(source, &settings);

    let handle = Scheduler::new(pipeline, settings.poll.interval).spawn();
    let nodes = first_ready(&mut handle.subscribe()).await;

    // W0C3's id is on the default ignore list
    let vsns: Vec<_> = nodes.iter().map(|n| n.vsn()).collect();
    assert_eq!(vsns, vec!["W0A1", "W0B2"]);
    assert!(!nodes[0].is_reporting());
    assert!(nodes[1].is_reporting());

    let health = nodes[1].health.as_ref().unwrap();
    assert_eq!(health.failures, 1);
    assert_eq!(BatchKind::ALL.len(), settings.metrics.len());

    handle.stop();
    handle.join().await.unwrap();
}
