//! What a scheduler cycle fetches and how it is assembled.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use fleetwatch_types::{
    InventoryFilter, MetricRecord, NodeInfo, NodeStatus, RollupQuery, RollupResponse, Timelines,
};

use super::settle::{settle, settle_all, Settled};
use super::CycleError;
use crate::config::{MetricSpec, Settings};
use crate::data::{timeline, BatchKind, MetricBatch, StatusMerger, Thresholds};
use crate::source::RecordSource;

/// One kind of periodic work: a concurrent fetch, then a pure assembly step.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Everything one cycle's fetches produced, failures included.
    type Fetched: Send;

    /// The published value.
    type Output: Send + Sync + 'static;

    /// Issue every fetch concurrently and wait for all to settle.
    async fn fetch(&self) -> Self::Fetched;

    /// Combine the fetched data with the previous output.
    ///
    /// Returns an error only when nothing usable was fetched and there is
    /// no previous output to fall back on.
    fn assemble(
        &self,
        previous: Option<&Self::Output>,
        fetched: Self::Fetched,
    ) -> Result<Self::Output, CycleError>;
}

/// Results of one status cycle.
#[derive(Debug)]
pub struct StatusFetch {
    pub inventory: Settled<Vec<NodeInfo>>,
    pub metrics: Vec<(BatchKind, Settled<Vec<MetricRecord>>)>,
}

/// Inventory plus metric batches, merged into per-node status.
#[derive(Debug, Clone)]
pub struct StatusPipeline {
    source: Arc<dyn RecordSource>,
    inventory: InventoryFilter,
    metrics: Vec<MetricSpec>,
    thresholds: Thresholds,
}

impl StatusPipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        inventory: InventoryFilter,
        metrics: Vec<MetricSpec>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            source,
            inventory,
            metrics,
            thresholds,
        }
    }

    pub fn from_settings(source: Arc<dyn RecordSource>, settings: &Settings) -> Self {
        Self::new(
            source,
            settings.inventory.filter(),
            settings.metrics.clone(),
            settings.thresholds,
        )
    }
}

#[async_trait]
impl Pipeline for StatusPipeline {
    type Fetched = StatusFetch;
    type Output = Vec<NodeStatus>;

    async fn fetch(&self) -> StatusFetch {
        let source = self.source.as_ref();

        let inventory = settle("inventory", source.fetch_inventory(&self.inventory));
        let metrics = settle_all(
            self.metrics
                .iter()
                .map(|spec| (spec.kind.as_str(), source.fetch_metrics(&spec.query))),
        );

        let (inventory, metrics) = futures_util::join!(inventory, metrics);

        StatusFetch {
            inventory,
            metrics: self.metrics.iter().map(|spec| spec.kind).zip(metrics).collect(),
        }
    }

    fn assemble(
        &self,
        previous: Option<&Vec<NodeStatus>>,
        fetched: StatusFetch,
    ) -> Result<Vec<NodeStatus>, CycleError> {
        let all_failed =
            !fetched.inventory.is_ok() && fetched.metrics.iter().all(|(_, settled)| !settled.is_ok());

        if all_failed && previous.is_none() {
            let errors = std::iter::once(fetched.inventory.error())
                .chain(fetched.metrics.iter().map(|(_, settled)| settled.error()))
                .flatten()
                .collect();
            return Err(CycleError::AllSourcesFailed(errors));
        }

        let inventory = fetched.inventory.ok();
        let batches: Vec<MetricBatch> = fetched
            .metrics
            .into_iter()
            .filter_map(|(kind, settled)| settled.ok().map(|records| MetricBatch::new(kind, records)))
            .collect();

        let merger = StatusMerger::new(self.thresholds);
        let nodes = merger.merge(previous.map(Vec::as_slice), inventory.as_deref(), &batches);
        debug!(nodes = nodes.len(), batches = batches.len(), "status assembled");

        Ok(nodes)
    }
}

/// The visible fleet and its usage timelines.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct TimelineView {
    pub nodes: Vec<NodeInfo>,
    pub timelines: Timelines,
}

/// Results of one timeline cycle.
#[derive(Debug)]
pub struct TimelineFetch {
    pub inventory: Settled<Vec<NodeInfo>>,
    pub rollup: Settled<RollupResponse>,
}

/// Inventory plus usage rollup, projected by node and by app.
#[derive(Debug, Clone)]
pub struct TimelinePipeline {
    source: Arc<dyn RecordSource>,
    inventory: InventoryFilter,
    rollup: RollupQuery,
}

impl TimelinePipeline {
    pub fn new(source: Arc<dyn RecordSource>, inventory: InventoryFilter, rollup: RollupQuery) -> Self {
        Self {
            source,
            inventory,
            rollup,
        }
    }

    pub fn from_settings(source: Arc<dyn RecordSource>, settings: &Settings) -> Self {
        Self::new(source, settings.inventory.filter(), settings.rollup.clone())
    }
}

#[async_trait]
impl Pipeline for TimelinePipeline {
    type Fetched = TimelineFetch;
    type Output = TimelineView;

    async fn fetch(&self) -> TimelineFetch {
        let source = self.source.as_ref();
        let (inventory, rollup) = futures_util::join!(
            settle("inventory", source.fetch_inventory(&self.inventory)),
            settle("rollup", source.fetch_rollup(&self.rollup)),
        );
        TimelineFetch { inventory, rollup }
    }

    fn assemble(
        &self,
        previous: Option<&TimelineView>,
        fetched: TimelineFetch,
    ) -> Result<TimelineView, CycleError> {
        if !fetched.inventory.is_ok() && !fetched.rollup.is_ok() {
            return match previous {
                Some(previous) => Ok(previous.clone()),
                None => Err(CycleError::AllSourcesFailed(
                    [fetched.inventory.error(), fetched.rollup.error()]
                        .into_iter()
                        .flatten()
                        .collect(),
                )),
            };
        }

        let nodes = match fetched.inventory.ok() {
            Some(nodes) => nodes,
            None => previous.map(|p| p.nodes.clone()).unwrap_or_default(),
        };

        let timelines = match fetched.rollup.ok() {
            Some(rollup) => timeline::aggregate_for(&rollup, &nodes),
            None => previous.map(|p| p.timelines.clone()).unwrap_or_default(),
        };

        Ok(TimelineView { nodes, timelines })
    }
}
