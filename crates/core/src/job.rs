//! Job and task state machines.
//!
//! A [`Job`] is one batch submission; each submitted item becomes a [`Task`].
//! The task list is fixed at creation and every state change goes through a
//! transition method, so the invariants below hold no matter which component
//! drives the job:
//!
//! - tasks move `queued -> processing -> {completed | failed}` and never
//!   revert (a queued task may also be force-failed);
//! - a completed task carries an output URL and no error, a failed task an
//!   error and no output URL;
//! - the job status is settled once, after every task is terminal, and a
//!   merge-eligible job always passes through `merging`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_job_id, JobId, Timestamp};

/// Minimum number of completed tasks for the merge phase to run.
pub const MIN_MERGE_INPUTS: usize = 2;

/// Job-level error recorded when no task produced an output.
pub const ALL_TASKS_FAILED: &str = "All tasks failed";

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Aggregate job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Merging,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One submitted item (image + prompt) inside a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Name of the source file; correlates results back to the submission.
    pub filename: String,
    /// Per-item generation instruction.
    pub prompt: String,
    status: TaskStatus,
    output_url: Option<String>,
    error: Option<String>,
}

impl Task {
    /// Create a task in the `queued` state.
    pub fn new(filename: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            prompt: prompt.into(),
            status: TaskStatus::Queued,
            output_url: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Result URL; only present once the task has completed.
    pub fn output_url(&self) -> Option<&str> {
        self.output_url.as_deref()
    }

    /// Failure reason; only present once the task has failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `queued -> processing`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        match self.status {
            TaskStatus::Queued => {
                self.status = TaskStatus::Processing;
                Ok(())
            }
            other => Err(self.invalid_transition(other, TaskStatus::Processing)),
        }
    }

    /// `processing -> completed`, recording the output URL.
    pub fn complete(&mut self, output_url: impl Into<String>) -> Result<(), CoreError> {
        let output_url = output_url.into();
        if output_url.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Task '{}' cannot complete without an output URL",
                self.filename
            )));
        }
        match self.status {
            TaskStatus::Processing => {
                self.status = TaskStatus::Completed;
                self.output_url = Some(output_url);
                Ok(())
            }
            other => Err(self.invalid_transition(other, TaskStatus::Completed)),
        }
    }

    /// `queued | processing -> failed`, recording the failure reason.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        match self.status {
            TaskStatus::Queued | TaskStatus::Processing => {
                self.status = TaskStatus::Failed;
                self.error = Some(error.into());
                Ok(())
            }
            other => Err(self.invalid_transition(other, TaskStatus::Failed)),
        }
    }

    fn invalid_transition(&self, from: TaskStatus, to: TaskStatus) -> CoreError {
        CoreError::Conflict(format!(
            "Task '{}' cannot move from {} to {}",
            self.filename,
            from.as_str(),
            to.as_str()
        ))
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Aggregate decision taken once every task is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// At least one output and no merge to run.
    Completed,
    /// No task produced an output.
    Failed,
    /// Merge requested and viable; carries the outputs in task order.
    Merge { output_urls: Vec<String> },
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One batch generation request spanning multiple tasks.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    tasks: Vec<Task>,
    started_at: Timestamp,
    merge_requested: bool,
    merged_output_url: Option<String>,
    error: Option<String>,
    finished_at: Option<Timestamp>,
}

impl Job {
    /// Create a job in `processing` with one queued task per `(filename,
    /// prompt)` pair, in the given order.
    pub fn new<I, F, P>(items: I, merge_requested: bool) -> Self
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: Into<String>,
    {
        Self::with_id(new_job_id(), chrono::Utc::now(), items, merge_requested)
    }

    /// Like [`Job::new`] with an explicit identifier and start time.
    pub fn with_id<I, F, P>(
        id: JobId,
        started_at: Timestamp,
        items: I,
        merge_requested: bool,
    ) -> Self
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: Into<String>,
    {
        Self {
            id,
            status: JobStatus::Processing,
            tasks: items
                .into_iter()
                .map(|(filename, prompt)| Task::new(filename, prompt))
                .collect(),
            started_at,
            merge_requested,
            merged_output_url: None,
            error: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn merge_requested(&self) -> bool {
        self.merge_requested
    }

    pub fn merged_output_url(&self) -> Option<&str> {
        self.merged_output_url.as_deref()
    }

    /// Job-level failure reason (orchestration, merge, or all tasks failed).
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.count_with(TaskStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count_with(TaskStatus::Failed)
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.iter().all(|t| t.status().is_terminal())
    }

    fn count_with(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }

    // ---- task transitions ----

    pub fn start_task(&mut self, index: usize) -> Result<(), CoreError> {
        self.task_mut(index)?.start()
    }

    pub fn complete_task(
        &mut self,
        index: usize,
        output_url: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.task_mut(index)?.complete(output_url)
    }

    pub fn fail_task(&mut self, index: usize, error: impl Into<String>) -> Result<(), CoreError> {
        self.task_mut(index)?.fail(error)
    }

    /// Tasks may only change while the job is still processing.
    fn task_mut(&mut self, index: usize) -> Result<&mut Task, CoreError> {
        if self.status != JobStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Job {} is {} and its tasks can no longer change",
                self.id,
                self.status.as_str()
            )));
        }
        let id = self.id;
        self.tasks.get_mut(index).ok_or_else(|| CoreError::NotFound {
            entity: "Task",
            id: format!("{id}/{index}"),
        })
    }

    // ---- job transitions ----

    /// The aggregate decision for this job, or `None` while any task is
    /// still pending or the job has already been settled.
    pub fn settlement(&self) -> Option<Settlement> {
        if self.status != JobStatus::Processing || !self.all_tasks_terminal() {
            return None;
        }
        let output_urls: Vec<String> = self
            .tasks
            .iter()
            .filter_map(|t| t.output_url().map(str::to_owned))
            .collect();

        Some(if output_urls.is_empty() {
            Settlement::Failed
        } else if self.merge_requested && output_urls.len() >= MIN_MERGE_INPUTS {
            Settlement::Merge { output_urls }
        } else {
            Settlement::Completed
        })
    }

    /// Apply [`Job::settlement`]: `processing -> completed | failed | merging`.
    pub fn settle(&mut self) -> Result<Settlement, CoreError> {
        let settlement = self.settlement().ok_or_else(|| {
            CoreError::Conflict(format!(
                "Job {} cannot settle: status {}, {} of {} tasks terminal",
                self.id,
                self.status.as_str(),
                self.completed_count() + self.failed_count(),
                self.total()
            ))
        })?;

        match &settlement {
            Settlement::Completed => self.finish(JobStatus::Completed),
            Settlement::Failed => {
                self.error = Some(ALL_TASKS_FAILED.to_string());
                self.finish(JobStatus::Failed);
            }
            Settlement::Merge { .. } => self.status = JobStatus::Merging,
        }
        Ok(settlement)
    }

    /// `merging -> completed` with the merged output.
    pub fn finish_merge(&mut self, merged_output_url: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_merging()?;
        self.merged_output_url = Some(merged_output_url.into());
        self.finish(JobStatus::Completed);
        Ok(())
    }

    /// `merging -> failed` with the merge error.
    pub fn fail_merge(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.ensure_merging()?;
        self.error = Some(error.into());
        self.finish(JobStatus::Failed);
        Ok(())
    }

    /// Fail the whole job on an orchestration-level error.
    ///
    /// Every queued or processing task is force-failed with `error`; tasks
    /// that already reached a terminal state keep their outcome.
    pub fn abort(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        let error = error.into();
        for task in self.tasks.iter_mut().filter(|t| !t.status().is_terminal()) {
            task.fail(error.clone())?;
        }
        self.error = Some(error);
        self.finish(JobStatus::Failed);
        Ok(())
    }

    fn ensure_merging(&self) -> Result<(), CoreError> {
        if self.status == JobStatus::Merging {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Job {} is {}, not merging",
                self.id,
                self.status.as_str()
            )))
        }
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(chrono::Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job_of(n: usize, merge: bool) -> Job {
        Job::new(
            (0..n).map(|i| (format!("img-{i}.png"), format!("prompt {i}"))),
            merge,
        )
    }

    fn run_task(job: &mut Job, index: usize, outcome: Result<&str, &str>) {
        job.start_task(index).unwrap();
        match outcome {
            Ok(url) => job.complete_task(index, url).unwrap(),
            Err(e) => job.fail_task(index, e).unwrap(),
        }
    }

    // -- Creation --

    #[test]
    fn new_job_starts_processing_with_queued_tasks_in_order() {
        let job = job_of(3, false);
        assert_eq!(job.status(), JobStatus::Processing);
        assert_eq!(job.total(), 3);
        assert!(job.tasks().iter().all(|t| t.status() == TaskStatus::Queued));
        assert_eq!(job.tasks()[2].filename, "img-2.png");
        assert!(job.merged_output_url().is_none());
        assert!(job.finished_at().is_none());
    }

    // -- Task transitions --

    #[test]
    fn task_cannot_complete_without_starting() {
        let mut task = Task::new("a.png", "p");
        assert_matches!(task.complete("https://x/out.mp4"), Err(CoreError::Conflict(_)));
        assert_eq!(task.status(), TaskStatus::Queued);
    }

    #[test]
    fn completed_task_has_url_and_no_error() {
        let mut task = Task::new("a.png", "p");
        task.start().unwrap();
        task.complete("https://x/out.mp4").unwrap();
        assert_eq!(task.output_url(), Some("https://x/out.mp4"));
        assert!(task.error().is_none());
    }

    #[test]
    fn terminal_task_never_reverts() {
        let mut task = Task::new("a.png", "p");
        task.start().unwrap();
        task.fail("boom").unwrap();
        assert!(task.start().is_err());
        assert!(task.complete("https://x/out.mp4").is_err());
        assert!(task.fail("again").is_err());
        assert_eq!(task.error(), Some("boom"));
        assert!(task.output_url().is_none());
    }

    #[test]
    fn empty_output_url_is_rejected() {
        let mut task = Task::new("a.png", "p");
        task.start().unwrap();
        assert_matches!(task.complete("  "), Err(CoreError::Validation(_)));
        assert_eq!(task.status(), TaskStatus::Processing);
    }

    #[test]
    fn out_of_range_task_is_not_found() {
        let mut job = job_of(1, false);
        assert_matches!(job.start_task(5), Err(CoreError::NotFound { .. }));
    }

    // -- Settlement --

    #[test]
    fn settlement_waits_for_every_task() {
        let mut job = job_of(2, false);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        assert!(job.settlement().is_none());
        assert!(job.settle().is_err());
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn partial_success_completes_job() {
        let mut job = job_of(2, false);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        run_task(&mut job, 1, Err("provider error"));
        assert_eq!(job.settle().unwrap(), Settlement::Completed);
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.completed_count(), 1);
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn all_failed_fails_job_without_merged_output() {
        let mut job = job_of(2, true);
        run_task(&mut job, 0, Err("a"));
        run_task(&mut job, 1, Err("b"));
        assert_eq!(job.settle().unwrap(), Settlement::Failed);
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some(ALL_TASKS_FAILED));
        assert!(job.merged_output_url().is_none());
    }

    #[test]
    fn merge_with_two_outputs_goes_through_merging() {
        let mut job = job_of(3, true);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        run_task(&mut job, 1, Err("nope"));
        run_task(&mut job, 2, Ok("https://x/2.mp4"));

        let settlement = job.settle().unwrap();
        assert_eq!(
            settlement,
            Settlement::Merge {
                output_urls: vec!["https://x/0.mp4".into(), "https://x/2.mp4".into()]
            }
        );
        assert_eq!(job.status(), JobStatus::Merging);

        job.finish_merge("https://x/merged.mp4").unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.merged_output_url(), Some("https://x/merged.mp4"));
    }

    #[test]
    fn merge_with_single_output_completes_directly() {
        let mut job = job_of(2, true);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        run_task(&mut job, 1, Err("nope"));
        assert_eq!(job.settle().unwrap(), Settlement::Completed);
        assert!(job.merged_output_url().is_none());
    }

    #[test]
    fn merge_failure_fails_job() {
        let mut job = job_of(2, true);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        run_task(&mut job, 1, Ok("https://x/1.mp4"));
        job.settle().unwrap();
        job.fail_merge("concat failed").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("concat failed"));
        assert!(job.merged_output_url().is_none());
    }

    #[test]
    fn merge_transitions_require_merging_state() {
        let mut job = job_of(1, false);
        assert!(job.finish_merge("https://x/m.mp4").is_err());
        assert!(job.fail_merge("x").is_err());
    }

    #[test]
    fn tasks_are_frozen_after_settlement() {
        let mut job = job_of(1, false);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        job.settle().unwrap();
        assert_matches!(job.fail_task(0, "late"), Err(CoreError::Conflict(_)));
    }

    // -- Abort --

    #[test]
    fn abort_fails_pending_tasks_and_keeps_finished_ones() {
        let mut job = job_of(3, false);
        run_task(&mut job, 0, Ok("https://x/0.mp4"));
        job.start_task(1).unwrap();

        job.abort("Invalid API credential").unwrap();

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.tasks()[0].status(), TaskStatus::Completed);
        assert_eq!(job.tasks()[1].error(), Some("Invalid API credential"));
        assert_eq!(job.tasks()[2].error(), Some("Invalid API credential"));
        assert_eq!(job.total(), 3);
    }

    #[test]
    fn abort_on_terminal_job_is_rejected() {
        let mut job = job_of(1, false);
        job.abort("x").unwrap();
        assert_matches!(job.abort("y"), Err(CoreError::Conflict(_)));
        assert_eq!(job.error(), Some("x"));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(JobStatus::Merging.as_str(), "merging");
        assert_eq!(TaskStatus::Queued.as_str(), "queued");
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
