//! Layered configuration.
//!
//! Settings are read from an optional TOML file, then from environment
//! variables prefixed `FLEETWATCH` (`FLEETWATCH__POLL__INTERVAL=30s`). The
//! binary applies its command-line overrides on top.
//!
//! ```toml
//! [endpoints]
//! beehive = "https://data.sagecontinuum.org/api/v1"
//!
//! [poll]
//! interval = "30s"
//!
//! [thresholds]
//! fail = "10m"
//! warning = "3m"
//!
//! [[metrics]]
//! kind = "system"
//! start = "-4d"
//! tail = 1
//! filter = { name = "sys.*", vsn = ".*" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use fleetwatch_adapters::{beehive, beekeeper};
use fleetwatch_types::{InventoryFilter, MetricsQuery, RollupQuery};

use crate::data::duration::parse_duration;
use crate::data::{BatchKind, Thresholds};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FLEETWATCH";

/// Node ids of lab and test devices hidden from the fleet by default.
pub const DEFAULT_IGNORE: &[&str] = &[
    "0000000000000001",
    "000048B02D059C6A",
    "000048B02D07627C",
    "000048B02D0766CD",
    "000048B02D0766D2",
    "000048B02D15BC65",
    "000048B02D15C1AA",
    "000048B02D15D52F",
    "SURYALAPTOP00000",
];

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Upstream service URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub beehive: String,
    pub beekeeper: String,
    /// Rollup URL; defaults to `{beehive}/rollup`.
    pub rollup: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InventorySettings {
    pub project: Option<String>,
    pub ignore: Vec<String>,
}

impl InventorySettings {
    pub fn filter(&self) -> InventoryFilter {
        let filter = InventoryFilter::new().ignore(self.ignore.iter());
        match &self.project {
            Some(project) => filter.project(project),
            None => filter,
        }
    }
}

/// One metric fetch issued every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub kind: BatchKind,
    pub query: MetricsQuery,
}

impl MetricSpec {
    pub fn new(kind: BatchKind, query: MetricsQuery) -> Self {
        Self { kind, query }
    }

    /// The standard fetches: system, health, sanity and temperature.
    pub fn defaults() -> Vec<MetricSpec> {
        vec![
            MetricSpec::new(BatchKind::System, MetricsQuery::system()),
            MetricSpec::new(BatchKind::Health, MetricsQuery::health()),
            MetricSpec::new(BatchKind::Sanity, MetricsQuery::sanity()),
            MetricSpec::new(BatchKind::Temperature, MetricsQuery::temperature()),
        ]
    }
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub http: HttpSettings,
    pub poll: PollSettings,
    pub thresholds: Thresholds,
    pub inventory: InventorySettings,
    pub metrics: Vec<MetricSpec>,
    pub rollup: RollupQuery,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints {
                beehive: beehive::DEFAULT_ENDPOINT.to_string(),
                beekeeper: beekeeper::DEFAULT_ENDPOINT.to_string(),
                rollup: None,
            },
            http: HttpSettings {
                timeout: Duration::from_secs(10),
            },
            poll: PollSettings {
                interval: Duration::from_secs(5),
            },
            thresholds: Thresholds::default(),
            inventory: InventorySettings {
                project: None,
                ignore: DEFAULT_IGNORE.iter().map(|id| id.to_string()).collect(),
            },
            metrics: MetricSpec::defaults(),
            rollup: RollupQuery::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let raw: RawSettings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        raw.resolve()
    }
}

// Serialized form: durations are strings and every section is optional.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    endpoints: RawEndpoints,
    http: RawHttp,
    poll: RawPoll,
    thresholds: RawThresholds,
    inventory: RawInventory,
    metrics: Option<Vec<RawMetricSpec>>,
    rollup: RawRollup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEndpoints {
    beehive: Option<String>,
    beekeeper: Option<String>,
    rollup: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttp {
    timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPoll {
    interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThresholds {
    fail: Option<String>,
    warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInventory {
    project: Option<String>,
    ignore: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawMetricSpec {
    kind: BatchKind,
    start: String,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    tail: Option<u32>,
    #[serde(default)]
    filter: BTreeMap<String, String>,
    #[serde(default)]
    bucket: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRollup {
    start: Option<String>,
    end: Option<String>,
    window: Option<String>,
}

fn duration(key: &str, value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(s) => parse_duration(&s).map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl RawSettings {
    fn resolve(self) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();

        let thresholds = Thresholds {
            fail: duration("thresholds.fail", self.thresholds.fail, defaults.thresholds.fail)?,
            warning: duration(
                "thresholds.warning",
                self.thresholds.warning,
                defaults.thresholds.warning,
            )?,
        };
        if thresholds.warning > thresholds.fail {
            return Err(ConfigError::Invalid {
                key: "thresholds.warning".to_string(),
                message: "must not exceed thresholds.fail".to_string(),
            });
        }

        let metrics = match self.metrics {
            Some(specs) => specs
                .into_iter()
                .map(|spec| MetricSpec {
                    kind: spec.kind,
                    query: MetricsQuery {
                        start: spec.start,
                        end: spec.end,
                        tail: spec.tail,
                        filter: spec.filter,
                        bucket: spec.bucket,
                    },
                })
                .collect(),
            None => defaults.metrics,
        };

        let rollup = RollupQuery {
            start: self.rollup.start.unwrap_or(defaults.rollup.start),
            end: self.rollup.end.or(defaults.rollup.end),
            window: self.rollup.window.unwrap_or(defaults.rollup.window),
        };

        Ok(Settings {
            endpoints: Endpoints {
                beehive: self.endpoints.beehive.unwrap_or(defaults.endpoints.beehive),
                beekeeper: self.endpoints.beekeeper.unwrap_or(defaults.endpoints.beekeeper),
                rollup: self.endpoints.rollup,
            },
            http: HttpSettings {
                timeout: duration("http.timeout", self.http.timeout, defaults.http.timeout)?,
            },
            poll: PollSettings {
                interval: duration("poll.interval", self.poll.interval, defaults.poll.interval)?,
            },
            thresholds,
            inventory: InventorySettings {
                project: self.inventory.project,
                ignore: self.inventory.ignore.unwrap_or(defaults.inventory.ignore),
            },
            metrics,
            rollup,
        })
    }
}
