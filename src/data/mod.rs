//! Pure transformations over fetched telemetry.
//!
//! Nothing in this module performs I/O; the scheduler feeds it whatever the
//! sources returned.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "10m", "500ms")
//! - [`merge`]: Per-node status from inventory plus metric batches ([`StatusMerger`])
//! - [`timeline`]: By-node and by-app projections of usage rollups
//! - [`filter`]: Facet selection and free-text query ([`FilterState`])
//! - [`summary`]: Fleet-wide counts and export ([`FleetSummary`])
//!
//! ## Data Flow
//!
//! ```text
//! inventory + MetricBatch[] ──▶ StatusMerger::merge() ──▶ NodeStatus[] ──┐
//!                                                                       ├──▶ filter::apply()
//! RollupResponse ──────────────▶ timeline::aggregate() ──▶ Timelines      │
//!                                                                       └──▶ FleetSummary
//! ```

pub mod duration;
pub mod filter;
pub mod merge;
pub mod summary;
pub mod timeline;

pub use filter::{get_filter_state, Facet, FacetView, Faceted, FilterState};
pub use merge::{freshness, BatchKind, Freshness, MetricBatch, StatusMerger, Thresholds};
pub use summary::{FleetExport, FleetSummary};
