//! Facet filtering and free-text query over merged node status.
//!
//! Filter state travels as flat key/value parameters, one key per facet with
//! comma-separated, double-quoted values:
//!
//! ```text
//! status="reporting","not-reporting"&city="Chicago, IL"&query=nxcore
//! ```
//!
//! [`get_filter_state`] parses those parameters for a given view and
//! [`FilterState::to_params`] writes them back.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use fleetwatch_types::NodeStatus;

/// Parameter key carrying the free-text query.
pub const QUERY_KEY: &str = "query";

/// A filterable attribute of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facet {
    Status,
    Project,
    Focus,
    City,
    State,
    Sensor,
    Phase,
}

impl Facet {
    pub const ALL: [Facet; 7] = [
        Facet::Status,
        Facet::Project,
        Facet::Focus,
        Facet::City,
        Facet::State,
        Facet::Sensor,
        Facet::Phase,
    ];

    /// Parameter key for this facet.
    pub fn key(&self) -> &'static str {
        match self {
            Facet::Status => "status",
            Facet::Project => "project",
            Facet::Focus => "focus",
            Facet::City => "city",
            Facet::State => "state",
            Facet::Sensor => "sensor",
            Facet::Phase => "phase",
        }
    }

    pub fn from_key(key: &str) -> Option<Facet> {
        Facet::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which facets a listing exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacetView {
    /// Fleet status (admin) listing.
    #[default]
    Status,
    /// Public node listing.
    Nodes,
}

impl FacetView {
    pub fn facets(&self) -> &'static [Facet] {
        match self {
            FacetView::Status => &[
                Facet::Status,
                Facet::Project,
                Facet::Focus,
                Facet::City,
                Facet::State,
                Facet::Phase,
            ],
            FacetView::Nodes => &[
                Facet::Project,
                Facet::Focus,
                Facet::City,
                Facet::State,
                Facet::Sensor,
                Facet::Phase,
            ],
        }
    }

    pub fn recognizes(&self, facet: Facet) -> bool {
        self.facets().contains(&facet)
    }
}

impl FromStr for FacetView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(FacetView::Status),
            "nodes" => Ok(FacetView::Nodes),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// Selected values per facet plus an optional free-text query.
///
/// Facets with no values are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub facets: BTreeMap<Facet, BTreeSet<String>>,
    pub query: Option<String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add values to a facet. Empty values are dropped.
    pub fn with<I, S>(mut self, facet: Facet, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v: &String| !v.is_empty())
            .collect();
        if !values.is_empty() {
            self.facets.entry(facet).or_default().extend(values);
        }
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.trim().is_empty()).then(|| query.trim().to_string());
        self
    }

    pub fn values(&self, facet: Facet) -> Option<&BTreeSet<String>> {
        self.facets.get(&facet)
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty() && self.query.is_none()
    }

    /// Encode as transport parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .facets
            .iter()
            .map(|(facet, values)| (facet.key().to_string(), encode_values(values)))
            .collect();

        if let Some(query) = &self.query {
            params.push((QUERY_KEY.to_string(), query.clone()));
        }

        params
    }
}

/// Parse transport parameters into filter state for `view`.
///
/// Keys the view doesn't recognize are ignored. Repeated keys accumulate.
pub fn get_filter_state<I, K, V>(params: I, view: FacetView) -> FilterState
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut state = FilterState::new();

    for (key, value) in params {
        let (key, value) = (key.as_ref(), value.as_ref());

        if key == QUERY_KEY {
            state = state.with_query(value);
            continue;
        }

        match Facet::from_key(key) {
            Some(facet) if view.recognizes(facet) => {
                state = state.with(facet, split_values(value));
            }
            _ => {}
        }
    }

    state
}

/// Split a comma-separated value list, honoring double quotes.
///
/// Inside quotes a comma is literal and `""` is one quote character.
/// Whitespace outside quotes around a value is trimmed; empty values are
/// dropped.
pub fn split_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut pending_space = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            ',' => {
                pending_space.clear();
                if !current.is_empty() {
                    values.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => pending_space.push(c),
            _ => {
                if !current.is_empty() {
                    current.push_str(&pending_space);
                }
                pending_space.clear();
                if c == '"' {
                    in_quotes = true;
                } else {
                    current.push(c);
                }
            }
        }
    }

    if !current.is_empty() {
        values.push(current);
    }

    values
}

/// Encode values as comma-joined, double-quoted tokens.
pub fn encode_values<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Records that expose facet values.
pub trait Faceted {
    /// All values the record holds for `facet`; multi-valued facets return
    /// more than one.
    fn facet_values(&self, facet: Facet) -> Vec<&str>;
}

impl Faceted for NodeStatus {
    fn facet_values(&self, facet: Facet) -> Vec<&str> {
        let info = &self.info;
        match facet {
            Facet::Status => vec![self.status.as_str()],
            Facet::Project => info.project.as_deref().into_iter().collect(),
            Facet::Focus => info.focus.as_deref().into_iter().collect(),
            Facet::City => info.city.as_deref().into_iter().collect(),
            Facet::State => info.state.as_deref().into_iter().collect(),
            Facet::Phase => info.phase.as_deref().into_iter().collect(),
            Facet::Sensor => info.sensors.iter().map(|s| s.hw_model.as_str()).collect(),
        }
    }
}

/// True if `record` satisfies every non-empty facet in `state`.
pub fn matches<T: Faceted>(record: &T, state: &FilterState) -> bool {
    state.facets.iter().all(|(facet, wanted)| {
        wanted.is_empty()
            || record
                .facet_values(*facet)
                .into_iter()
                .any(|v| wanted.contains(v))
    })
}

/// Records matching the facet selection: AND across facets, OR within one.
/// The query in `state` is not applied; see [`query_data`].
pub fn filter<T: Faceted + Clone>(records: &[T], state: &FilterState) -> Vec<T> {
    records.iter().filter(|r| matches(*r, state)).cloned().collect()
}

/// Records whose field values, concatenated and lower-cased, contain the
/// lower-cased query. An empty query keeps everything.
pub fn query_data<T: Serialize + Clone>(records: &[T], query: &str) -> Vec<T> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|r| searchable_text(*r).contains(&query))
        .cloned()
        .collect()
}

/// Apply both the facet selection and the query in `state`.
pub fn apply<T: Faceted + Serialize + Clone>(records: &[T], state: &FilterState) -> Vec<T> {
    let faceted = filter(records, state);
    match &state.query {
        Some(query) => query_data(&faceted, query),
        None => faceted,
    }
}

fn searchable_text<T: Serialize>(record: &T) -> String {
    let mut text = String::new();
    if let Ok(value) = serde_json::to_value(record) {
        push_leaves(&value, &mut text);
    }
    text.to_lowercase()
}

fn push_leaves(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => items.iter().for_each(|v| push_leaves(v, out)),
        Value::Object(fields) => fields.values().for_each(|v| push_leaves(v, out)),
    }
}

/// Sorted, de-duplicated, non-empty values present for `facet`.
pub fn facet_options<T: Faceted>(records: &[T], facet: Facet) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.facet_values(facet))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Move reporting nodes ahead of the rest, otherwise keeping order.
pub fn sort_reporting_first(nodes: &mut [NodeStatus]) {
    nodes.sort_by_key(|n| !n.is_reporting());
}
