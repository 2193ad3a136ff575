//! # fleetwatch
//!
//! Polling, merging and timeline aggregation for sensor-fleet telemetry.
//!
//! A fleet of edge nodes reports system metrics, health checks, sanity
//! tests and sensor readings to a telemetry service, while a separate
//! inventory service lists the nodes themselves. This crate fetches both on
//! a schedule and folds them into one status record per node, plus usage
//! timelines by node and by app.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Scheduler                             │
//! │  ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐  │
//! │  │  source  │───▶│  settle  │───▶│   data   │───▶│ publish  │  │
//! │  │ (fetch)  │    │  (all)   │    │ (merge)  │    │ (watch)  │  │
//! │  └──────────┘    └──────────┘    └──────────┘    └──────────┘  │
//! │       ▲                                                        │
//! │       └── HttpRecordSource | DirectorySource                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Upstream abstraction ([`RecordSource`] trait) with an HTTP
//!   implementation and a fixture-directory implementation
//! - **[`data`]**: Pure transformations: status merging, timeline aggregation,
//!   facet filtering and fleet summaries
//! - **[`schedule`]**: Settle-all fetching and the periodic [`Scheduler`]
//! - **[`config`]**: Layered [`Settings`] from file and environment
//!
//! ## Usage
//!
//! ### One merge, by hand
//!
//! ```
//! use fleetwatch::{MetricBatch, BatchKind, StatusMerger, Thresholds};
//! use fleetwatch_types::{MetricRecord, MetricValue, NodeInfo};
//!
//! let inventory = vec![NodeInfo::new("W01C", "000048B02D05A0A4")];
//! let uptime = MetricRecord::builder("sys.uptime", MetricValue::Number(3600.0))
//!     .timestamp(chrono::Utc::now())
//!     .node("000048b02d05a0a4")
//!     .host("000048b02d05a0a4.ws-nxcore")
//!     .build();
//!
//! let merger = StatusMerger::new(Thresholds::default());
//! let batches = [MetricBatch::new(BatchKind::System, vec![uptime])];
//! let nodes = merger.merge(None, Some(inventory.as_slice()), &batches);
//! assert!(nodes[0].is_reporting());
//! ```
//!
//! ### Polling a fixture directory
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetwatch::{DirectorySource, Scheduler, Settings, StatusPipeline};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::default();
//! let source = Arc::new(DirectorySource::new("fixtures"));
//! let pipeline = StatusPipeline::from_settings(source, &settings);
//!
//! let handle = Scheduler::new(pipeline, settings.poll.interval).spawn();
//! let mut updates = handle.subscribe();
//! updates.changed().await.unwrap();
//! handle.stop();
//! # });
//! ```

pub mod config;
pub mod data;
pub mod schedule;
pub mod source;

// Re-export main types for convenience
pub use config::{ConfigError, MetricSpec, Settings};
pub use data::{
    freshness, get_filter_state, BatchKind, Facet, FacetView, FilterState, FleetExport,
    FleetSummary, Freshness, MetricBatch, StatusMerger, Thresholds,
};
pub use schedule::{
    CycleError, Pipeline, Publication, Scheduler, SchedulerHandle, SchedulerPhase, StatusPipeline,
    TimelinePipeline, TimelineView,
};
pub use source::{DirectorySource, HttpRecordSource, RecordSource, SourceError};
