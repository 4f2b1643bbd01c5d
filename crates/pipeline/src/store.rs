//! Job persistence.
//!
//! Every job mutation goes through [`JobStore::update`], which runs the
//! mutator on a copy and only stores it when the transition succeeds, so
//! readers never observe a half-applied change.

use std::collections::HashMap;

use async_trait::async_trait;
use clipforge_core::error::CoreError;
use clipforge_core::job::Job;
use clipforge_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

/// A state transition applied to a stored job.
pub type JobMutator = Box<dyn FnOnce(&mut Job) -> Result<(), CoreError> + Send>;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `Conflict` if the id is taken.
    async fn create(&self, job: Job) -> Result<(), CoreError>;

    /// Snapshot of a job.
    async fn get(&self, id: JobId) -> Result<Option<Job>, CoreError>;

    /// Apply `mutate` atomically and return the updated snapshot.
    ///
    /// If the mutator fails the stored job is left unchanged.
    async fn update(&self, id: JobId, mutate: JobMutator) -> Result<Job, CoreError>;

    /// Remove a job. Returns `true` if it existed.
    async fn delete(&self, id: JobId) -> Result<bool, CoreError>;

    /// Remove every job that started before `cutoff`, whatever its status.
    /// Returns the number of jobs removed.
    async fn sweep(&self, cutoff: Timestamp) -> Result<usize, CoreError>;

    /// All jobs, oldest first.
    async fn list(&self) -> Result<Vec<Job>, CoreError>;
}

/// Process-local job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id()) {
            return Err(CoreError::Conflict(format!("Job {} already exists", job.id())));
        }
        jobs.insert(job.id(), job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, CoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: JobId, mutate: JobMutator) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&id).ok_or_else(|| CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        })?;

        let mut next = stored.clone();
        mutate(&mut next)?;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: JobId) -> Result<bool, CoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn sweep(&self, cutoff: Timestamp) -> Result<usize, CoreError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.started_at() >= cutoff);
        Ok(before - jobs.len())
    }

    async fn list(&self) -> Result<Vec<Job>, CoreError> {
        let mut all: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        all.sort_by_key(|job| (job.started_at(), job.id()));
        Ok(all)
    }
}
