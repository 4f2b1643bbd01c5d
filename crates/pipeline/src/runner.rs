//! Supervised job execution.
//!
//! [`JobRunnerHandle::submit`] registers a job and queues it; the
//! long-lived [`JobRunner`] pulls queued jobs and executes up to `workers`
//! of them at once. Every job runs as its own Tokio task inside a
//! `JoinSet`, so a panicking job is observed and recorded as failed instead
//! of vanishing with its task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipforge_core::job::Job;
use clipforge_core::types::JobId;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::PipelineError;
use crate::orchestrator::{JobOrchestrator, JobRequest, JobWork};

/// Recorded on jobs that panicked mid-run.
pub const PANIC_MESSAGE: &str = "Job processing panicked";

/// Recorded on jobs that were still pending or running at shutdown.
pub const SHUTDOWN_MESSAGE: &str = "Job interrupted by server shutdown";

/// Default grace period for running jobs at shutdown.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Submits jobs to a [`JobRunner`]. Cheap to clone.
#[derive(Clone)]
pub struct JobRunnerHandle {
    orchestrator: Arc<JobOrchestrator>,
    sender: mpsc::UnboundedSender<JobWork>,
}

impl JobRunnerHandle {
    /// Validate and register a job, then queue it for execution.
    ///
    /// Returns the freshly created job; processing happens in the
    /// background.
    pub async fn submit(&self, request: JobRequest) -> Result<Job, PipelineError> {
        let (job, work) = self.orchestrator.create_job(request).await?;
        if self.sender.send(work).is_err() {
            tracing::error!(job_id = %job.id(), "Job runner is not accepting work");
            self.orchestrator
                .fail_job(job.id(), SHUTDOWN_MESSAGE)
                .await;
            return Err(PipelineError::QueueClosed);
        }
        Ok(job)
    }

    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.orchestrator
    }
}

pub struct JobRunner {
    orchestrator: Arc<JobOrchestrator>,
    receiver: mpsc::UnboundedReceiver<JobWork>,
    workers: usize,
    drain_timeout: Duration,
}

impl JobRunner {
    /// Create a runner executing up to `workers` jobs concurrently, and the
    /// handle used to feed it.
    pub fn new(orchestrator: Arc<JobOrchestrator>, workers: usize) -> (Self, JobRunnerHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = JobRunnerHandle {
            orchestrator: Arc::clone(&orchestrator),
            sender,
        };
        let runner = Self {
            orchestrator,
            receiver,
            workers: workers.max(1),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        };
        (runner, handle)
    }

    /// Override how long shutdown waits for running jobs.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run until `cancel` fires or every handle is dropped.
    ///
    /// On shutdown, queued jobs are failed, running jobs get
    /// `drain_timeout` to finish, and whatever is still running after that
    /// is aborted and failed.
    pub async fn run(mut self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut running: JoinSet<()> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, JobId> = HashMap::new();

        tracing::info!(workers = self.workers, "Job runner started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                work = self.receiver.recv() => match work {
                    Some(work) => {
                        let job_id = work.job_id();
                        let task_id = self.spawn(&mut running, &permits, &cancel, work);
                        in_flight.insert(task_id, job_id);
                    }
                    None => {
                        tracing::info!("All job handles dropped, runner stopping");
                        break;
                    }
                },
                Some(joined) = running.join_next_with_id() => {
                    self.reap(joined, &mut in_flight).await;
                }
            }
        }

        self.receiver.close();
        while let Ok(work) = self.receiver.try_recv() {
            self.orchestrator
                .fail_job(work.job_id(), SHUTDOWN_MESSAGE)
                .await;
        }

        if !running.is_empty() {
            tracing::info!(
                running = running.len(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Waiting for running jobs",
            );
        }
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = running.join_next_with_id().await {
                self.reap(joined, &mut in_flight).await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = running.len(),
                "Drain timeout elapsed, aborting running jobs",
            );
            running.abort_all();
            while let Some(joined) = running.join_next_with_id().await {
                self.reap(joined, &mut in_flight).await;
            }
        }

        tracing::info!("Job runner stopped");
    }

    fn spawn(
        &self,
        running: &mut JoinSet<()>,
        permits: &Arc<Semaphore>,
        cancel: &CancellationToken,
        work: JobWork,
    ) -> tokio::task::Id {
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(permits);
        let cancel = cancel.clone();
        let job_id = work.job_id();

        let job = async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            // Jobs still waiting for a worker when shutdown starts never run.
            if cancel.is_cancelled() {
                orchestrator.fail_job(job_id, SHUTDOWN_MESSAGE).await;
                return;
            }
            tracing::info!("Job started");
            orchestrator.run(work).await;
            tracing::info!("Job finished");
        };

        running
            .spawn(job.instrument(tracing::info_span!("job", %job_id)))
            .id()
    }

    /// Record the end of a job task. Panicked or aborted jobs are failed.
    async fn reap(
        &self,
        joined: Result<(tokio::task::Id, ()), JoinError>,
        in_flight: &mut HashMap<tokio::task::Id, JobId>,
    ) {
        let err = match joined {
            Ok((task_id, ())) => {
                in_flight.remove(&task_id);
                return;
            }
            Err(err) => err,
        };

        let Some(job_id) = in_flight.remove(&err.id()) else {
            tracing::error!(error = %err, "Unknown job task ended abnormally");
            return;
        };

        if err.is_panic() {
            tracing::error!(%job_id, error = %err, "Job panicked");
            self.orchestrator.fail_job(job_id, PANIC_MESSAGE).await;
        } else {
            tracing::warn!(%job_id, "Job aborted");
            self.orchestrator.fail_job(job_id, SHUTDOWN_MESSAGE).await;
        }
    }
}
