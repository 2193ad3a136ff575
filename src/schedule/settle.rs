//! Settle-all combinators.
//!
//! Every fetch in a cycle runs to completion; one failing never cancels or
//! hides the others.

use std::future::Future;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::source::SourceError;

/// The outcome of one labelled fetch.
#[derive(Debug)]
pub struct Settled<T> {
    pub label: String,
    pub outcome: Result<T, SourceError>,
}

impl<T> Settled<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The value, discarding the error.
    pub fn ok(self) -> Option<T> {
        self.outcome.ok()
    }

    /// The error message, if the fetch failed.
    pub fn error(&self) -> Option<String> {
        self.outcome
            .as_ref()
            .err()
            .map(|e| format!("{}: {}", self.label, e))
    }
}

/// Await a fetch and capture its outcome. Failures are logged.
pub async fn settle<T, F>(label: impl Into<String>, fetch: F) -> Settled<T>
where
    F: Future<Output = Result<T, SourceError>>,
{
    let label = label.into();
    let outcome = fetch.await;

    match &outcome {
        Ok(_) => debug!(source = %label, "fetch settled"),
        Err(e) => warn!(source = %label, error = %e, "fetch failed"),
    }

    Settled { label, outcome }
}

/// Run every fetch concurrently and wait for all of them, in input order.
pub async fn settle_all<T, F, I, L>(fetches: I) -> Vec<Settled<T>>
where
    I: IntoIterator<Item = (L, F)>,
    L: Into<String>,
    F: Future<Output = Result<T, SourceError>>,
{
    join_all(fetches.into_iter().map(|(label, fetch)| settle(label, fetch))).await
}
