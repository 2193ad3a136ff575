//! # fleetwatch-types
//!
//! Core types for sensor-fleet telemetry. This crate defines the records the
//! upstream telemetry service emits, the per-node status view the merger
//! produces, and the timeline projections built from usage rollups.
//!
//! ## Design Goals
//!
//! - **Plain data**: every type is a cloneable value with no I/O attached
//! - **Optional serialization**: enable the `serde` feature to (de)serialize
//!   the wire and export formats
//! - **Static vs volatile split**: [`NodeInfo`] carries what inventory owns,
//!   [`NodeStatus`] layers replace-as-a-unit telemetry groups on top of it
//!
//! ## Features
//!
//! - `serde`: JSON serialization via serde (also enables `chrono/serde`)
//!
//! ## Example
//!
//! ```rust
//! use fleetwatch_types::{MetricRecord, MetricValue, NodeInfo, NodeStatus, ReportingStatus};
//!
//! let info = NodeInfo::new("W01C", "000048B02D05A0A4");
//! let status = NodeStatus::from_info(info);
//!
//! // Nothing has reported yet
//! assert_eq!(status.status, ReportingStatus::NotReporting);
//!
//! let record = MetricRecord::builder("sys.uptime", MetricValue::Number(3600.0))
//!     .node("000048b02d05a0a4")
//!     .host("000048b02d05a0a4.ws-nxcore")
//!     .vsn("W01C")
//!     .build();
//! assert_eq!(record.meta.vsn.as_deref(), Some("W01C"));
//! ```

mod node;
mod query;
mod record;
mod timeline;

pub use node::*;
pub use query::*;
pub use record::*;
pub use timeline::*;
