//! Periodic polling.
//!
//! A [`Scheduler`] drives one [`Pipeline`] on a tokio task:
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Merging ─▶ Published ─▶ Waiting ─┐
//!            ▲                                        │
//!            └────────────────────────────────────────┘
//!
//! stop() from any state ─▶ Cancelled
//! ```
//!
//! Fetches are not aborted by [`SchedulerHandle::stop`]; their results are
//! discarded instead. Waiting is interrupted immediately.

mod pipeline;
mod settle;

pub use pipeline::{Pipeline, StatusFetch, StatusPipeline, TimelineFetch, TimelinePipeline, TimelineView};
pub use settle::{settle, settle_all, Settled};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::duration::format_duration;

/// Errors a cycle can end with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    /// Every source failed and nothing was published before.
    #[error("all sources failed: {}", .0.join("; "))]
    AllSourcesFailed(Vec<String>),
}

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerPhase {
    #[default]
    Idle,
    Fetching,
    Merging,
    Published,
    Waiting,
    Cancelled,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Fetching => "fetching",
            SchedulerPhase::Merging => "merging",
            SchedulerPhase::Published => "published",
            SchedulerPhase::Waiting => "waiting",
            SchedulerPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The latest result exposed to callers.
#[derive(Debug)]
pub enum Publication<T> {
    /// No cycle has completed yet.
    Pending,
    /// The most recent successful cycle.
    Ready {
        value: Arc<T>,
        updated_at: DateTime<Utc>,
        cycle: u64,
    },
    /// Nothing has been published and the last cycle failed entirely.
    Failed { errors: Vec<String> },
}

impl<T> Clone for Publication<T> {
    fn clone(&self) -> Self {
        match self {
            Publication::Pending => Publication::Pending,
            Publication::Ready {
                value,
                updated_at,
                cycle,
            } => Publication::Ready {
                value: value.clone(),
                updated_at: *updated_at,
                cycle: *cycle,
            },
            Publication::Failed { errors } => Publication::Failed {
                errors: errors.clone(),
            },
        }
    }
}

impl<T> Publication<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Publication::Ready { .. })
    }

    /// The published value, if any.
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            Publication::Ready { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn cycle(&self) -> Option<u64> {
        match self {
            Publication::Ready { cycle, .. } => Some(*cycle),
            _ => None,
        }
    }
}

/// Runs a pipeline periodically.
#[derive(Debug)]
pub struct Scheduler<P> {
    pipeline: P,
    interval: Duration,
}

impl<P: Pipeline> Scheduler<P> {
    pub fn new(pipeline: P, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    /// Start polling on a new task. The first cycle begins immediately.
    pub fn spawn(self) -> SchedulerHandle<P::Output> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(SchedulerPhase::Idle);
        let (publication_tx, publication_rx) = watch::channel(Publication::Pending);

        let task = tokio::spawn(run(
            self.pipeline,
            self.interval,
            stop_rx,
            phase_tx,
            publication_tx,
        ));

        SchedulerHandle {
            stop_tx,
            phase_rx,
            publication_rx,
            task,
        }
    }
}

/// True once stop was requested or the handle is gone.
fn stopped(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}

async fn run<P: Pipeline>(
    pipeline: P,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    phase_tx: watch::Sender<SchedulerPhase>,
    publication_tx: watch::Sender<Publication<P::Output>>,
) {
    info!(interval = %format_duration(interval), "scheduler started");

    let mut previous: Option<Arc<P::Output>> = None;
    let mut cycle = 0u64;

    while !stopped(&stop_rx) {
        phase_tx.send_replace(SchedulerPhase::Fetching);
        let fetched = pipeline.fetch().await;

        // In-flight results are dropped once stop was requested
        if stopped(&stop_rx) {
            debug!("discarding fetch completed after stop");
            break;
        }

        phase_tx.send_replace(SchedulerPhase::Merging);
        match pipeline.assemble(previous.as_deref(), fetched) {
            Ok(_) if stopped(&stop_rx) => {
                debug!("discarding merge completed after stop");
                break;
            }
            Ok(value) => {
                cycle += 1;
                let value = Arc::new(value);
                previous = Some(value.clone());
                publication_tx.send_replace(Publication::Ready {
                    value,
                    updated_at: Utc::now(),
                    cycle,
                });
                phase_tx.send_replace(SchedulerPhase::Published);
                debug!(cycle, "published");
            }
            Err(CycleError::AllSourcesFailed(errors)) => {
                warn!(errors = errors.len(), "cycle failed");
                if previous.is_none() {
                    publication_tx.send_replace(Publication::Failed { errors });
                }
            }
        }

        phase_tx.send_replace(SchedulerPhase::Waiting);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => {}
        }
    }

    phase_tx.send_replace(SchedulerPhase::Cancelled);
    info!(cycles = cycle, "scheduler stopped");
}

/// Handle to a running scheduler. Dropping it stops the scheduler.
#[derive(Debug)]
pub struct SchedulerHandle<T> {
    stop_tx: watch::Sender<bool>,
    phase_rx: watch::Receiver<SchedulerPhase>,
    publication_rx: watch::Receiver<Publication<T>>,
    task: JoinHandle<()>,
}

impl<T> SchedulerHandle<T> {
    /// Request a stop. Takes effect at the next phase boundary.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase_rx.borrow()
    }

    /// Watch phase transitions.
    pub fn phases(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase_rx.clone()
    }

    /// Watch publications.
    pub fn subscribe(&self) -> watch::Receiver<Publication<T>> {
        self.publication_rx.clone()
    }

    /// The current publication.
    pub fn latest(&self) -> Publication<T> {
        self.publication_rx.borrow().clone()
    }

    /// Wait for the scheduler task to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}
