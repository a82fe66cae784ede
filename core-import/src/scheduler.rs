//! # Scheduler
//!
//! Runs track jobs with a bounded number in flight. Primary jobs are always
//! dispatched before auxiliary ones. A failed job frees its slot like a
//! finished one and its error is collected in the report; remaining jobs
//! keep running.

use crate::error::{ImportError, Result};
use crate::protocol::{COMMAND_AUXILIARY, COMMAND_PRIMARY};
use crate::traits::AudioTrackSink;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Kind of track a job loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// A speaker track.
    Primary,
    /// A sound effect track.
    Auxiliary,
}

impl JobKind {
    /// Command code sent in the login frame.
    pub fn command(&self) -> u32 {
        match self {
            JobKind::Primary => COMMAND_PRIMARY,
            JobKind::Auxiliary => COMMAND_AUXILIARY,
        }
    }
}

/// One track to load.
#[derive(Clone)]
pub struct Job {
    pub kind: JobKind,
    pub track: Arc<dyn AudioTrackSink>,
    /// Server-side track index, 1-based.
    pub track_index: u32,
    /// Row of the status board this job writes to.
    pub status_slot: usize,
}

impl Job {
    pub fn new(
        kind: JobKind,
        track: Arc<dyn AudioTrackSink>,
        track_index: u32,
        status_slot: usize,
    ) -> Self {
        Self {
            kind,
            track,
            track_index,
            status_slot,
        }
    }

    pub fn name(&self) -> &str {
        self.track.name()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("kind", &self.kind)
            .field("track", &self.track.name())
            .field("track_index", &self.track_index)
            .field("status_slot", &self.status_slot)
            .finish()
    }
}

/// Executes a single job to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job, cancel: CancellationToken) -> Result<()>;
}

/// How one job ended.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub kind: JobKind,
    pub track_index: u32,
    pub status_slot: usize,
    pub result: Result<()>,
}

impl JobOutcome {
    fn for_job(job: &Job, result: Result<()>) -> Self {
        Self {
            name: job.name().to_string(),
            kind: job.kind,
            track_index: job.track_index,
            status_slot: job.status_slot,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of every job, ordered by status slot.
#[derive(Debug, Default)]
pub struct SchedulerReport {
    pub outcomes: Vec<JobOutcome>,
}

impl SchedulerReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Bounded job pool.
#[derive(Debug, Clone)]
pub struct Scheduler {
    budget: usize,
}

impl Scheduler {
    /// `budget` is the maximum number of jobs in flight.
    pub fn new(budget: usize) -> Result<Self> {
        if budget == 0 {
            return Err(ImportError::InvalidConfig(
                "worker budget must be > 0".to_string(),
            ));
        }
        Ok(Self { budget })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Run every job and wait for all of them.
    ///
    /// Once `cancel` fires no further job is dispatched; queued jobs are
    /// reported as [`ImportError::Cancelled`] and running jobs are expected to
    /// observe the token themselves.
    #[instrument(skip_all, fields(budget = self.budget, jobs = jobs.len()))]
    pub async fn run_all(
        &self,
        runner: Arc<dyn JobRunner>,
        jobs: Vec<Job>,
        cancel: CancellationToken,
    ) -> SchedulerReport {
        let (mut primary, mut auxiliary): (VecDeque<Job>, VecDeque<Job>) = jobs
            .into_iter()
            .partition(|job| job.kind == JobKind::Primary);

        let mut in_flight = JoinSet::new();
        let mut outcomes = Vec::with_capacity(primary.len() + auxiliary.len());

        loop {
            while in_flight.len() < self.budget && !cancel.is_cancelled() {
                let Some(job) = primary.pop_front().or_else(|| auxiliary.pop_front()) else {
                    break;
                };
                debug!(job = %job.name(), kind = ?job.kind, "Dispatching job");
                in_flight.spawn(run_job(runner.clone(), job, cancel.clone()));
            }

            if cancel.is_cancelled() {
                for job in primary.drain(..).chain(auxiliary.drain(..)) {
                    debug!(job = %job.name(), "Job cancelled before dispatch");
                    outcomes.push(JobOutcome::for_job(&job, Err(ImportError::Cancelled)));
                }
            }

            match in_flight.join_next().await {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(e)) => error!(error = %e, "Job task ended abnormally"),
                None => break,
            }
        }

        outcomes.sort_by_key(|outcome| outcome.status_slot);
        let report = SchedulerReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "All jobs completed"
        );
        report
    }
}

async fn run_job(runner: Arc<dyn JobRunner>, job: Job, cancel: CancellationToken) -> JobOutcome {
    let identity = JobOutcome::for_job(&job, Ok(()));

    let result = AssertUnwindSafe(runner.run(job, cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(ImportError::Internal(format!(
                "job panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

    JobOutcome { result, ..identity }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
