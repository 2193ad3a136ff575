//! # fleetwatch-adapters
//!
//! Clients for the upstream services a sensor-fleet dashboard polls.
//!
//! ## Supported Services
//!
//! - **Telemetry** (`http` feature) - metric queries answered with
//!   newline-delimited JSON, plus hourly/daily usage rollups
//! - **Inventory** (`http` feature) - the node roster with static attributes
//!
//! Decoding lives in [`decode`] and is always available, so local fixtures
//! can share the same per-line tolerance as the HTTP clients.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetwatch_adapters::beekeeper::BeekeeperClient;
//! use fleetwatch_types::InventoryFilter;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BeekeeperClient::builder()
//!         .endpoint("https://api.sagecontinuum.org")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let nodes = client.state(&InventoryFilter::new().project("SAGE")).await?;
//!     println!("{} nodes", nodes.len());
//!     Ok(())
//! }
//! ```

pub mod decode;
pub mod error;

#[cfg(feature = "http")]
pub mod beehive;

#[cfg(feature = "http")]
pub mod beekeeper;

pub use error::SourceError;

// Re-export types for convenience
pub use fleetwatch_types::{MetricRecord, MetricsQuery, NodeInfo, RollupQuery, RollupResponse};
