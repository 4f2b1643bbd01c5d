//! Job orchestration: validate a batch, then drive its tasks in order,
//! settle the aggregate status, and run the merge phase.

use std::sync::Arc;

use clipforge_core::error::CoreError;
use clipforge_core::generation::GenerationParams;
use clipforge_core::job::{Job, JobStatus};
use clipforge_core::types::JobId;
use clipforge_provider::{GenerationProvider, ProviderError};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, TaskError};
use crate::merge::{FirstOutputMerger, OutputMerger};
use crate::processor::{SourceImage, TaskProcessor};
use crate::store::JobStore;

/// A batch submission: `images[i]` is generated with `prompts[i]`.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub images: Vec<SourceImage>,
    pub prompts: Vec<String>,
    pub params: GenerationParams,
}

/// Everything needed to execute a registered job.
#[derive(Debug)]
pub struct JobWork {
    job_id: JobId,
    items: Vec<(SourceImage, String)>,
    params: GenerationParams,
}

impl JobWork {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    processor: TaskProcessor,
    merger: Arc<dyn OutputMerger>,
    verify_credential: bool,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: TaskProcessor,
        merger: Arc<dyn OutputMerger>,
        verify_credential: bool,
    ) -> Self {
        Self {
            store,
            processor,
            merger,
            verify_credential,
        }
    }

    /// Orchestrator with the default merger.
    pub fn from_config(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn GenerationProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            store,
            TaskProcessor::from_config(provider, config),
            Arc::new(FirstOutputMerger),
            config.verify_credential,
        )
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn processor(&self) -> &TaskProcessor {
        &self.processor
    }

    /// Validate a submission and register its job.
    ///
    /// Nothing is stored and the provider is not contacted when the request
    /// is rejected.
    pub async fn create_job(&self, request: JobRequest) -> Result<(Job, JobWork), PipelineError> {
        if let Err(ProviderError::MissingCredential) = self.processor.provider().check_credential()
        {
            return Err(CoreError::Config(
                "Generation provider credential is not configured".to_string(),
            )
            .into());
        }

        let JobRequest {
            images,
            prompts,
            params,
        } = request;

        if images.is_empty() {
            return Err(CoreError::Validation("At least one image is required".into()).into());
        }
        if prompts.is_empty() {
            return Err(CoreError::Validation("At least one prompt is required".into()).into());
        }
        if images.len() != prompts.len() {
            return Err(CoreError::Validation(format!(
                "Received {} images but {} prompts",
                images.len(),
                prompts.len()
            ))
            .into());
        }
        params.validate()?;

        let job = Job::new(
            images
                .iter()
                .zip(&prompts)
                .map(|(image, prompt)| (image.filename.clone(), prompt.clone())),
            params.merge,
        );
        self.store.create(job.clone()).await?;

        tracing::info!(
            job_id = %job.id(),
            tasks = job.total(),
            mode = params.mode.as_str(),
            model = %params.model,
            merge = params.merge,
            "Job created",
        );

        let work = JobWork {
            job_id: job.id(),
            items: images.into_iter().zip(prompts).collect(),
            params,
        };
        Ok((job, work))
    }

    /// Execute a registered job to a terminal state.
    pub async fn run(&self, work: JobWork) {
        let JobWork {
            job_id,
            items,
            params,
        } = work;

        match self.preflight().await {
            Ok(()) => {}
            Err(e) if e.is_credential_problem() => {
                let message = TaskError::from(e).classify();
                tracing::warn!(%job_id, error = %message, "Job preflight failed");
                self.fail_job(job_id, message).await;
                return;
            }
            // Anything else surfaces on the tasks themselves.
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Credential check inconclusive, continuing");
            }
        }

        for (index, (image, prompt)) in items.into_iter().enumerate() {
            if let Err(e) = self
                .processor
                .process(&*self.store, job_id, index, image, &prompt, &params)
                .await
            {
                tracing::error!(%job_id, task = index, error = %e, "Failed to record task outcome");
                self.fail_job(job_id, format!("Job processing error: {e}"))
                    .await;
                return;
            }
        }

        if let Err(e) = self.settle(job_id).await {
            tracing::error!(%job_id, error = %e, "Failed to settle job");
            self.fail_job(job_id, format!("Job processing error: {e}"))
                .await;
        }
    }

    /// Force-fail every pending task and the job itself.
    ///
    /// A job that already reached a terminal state is left alone.
    pub async fn fail_job(&self, job_id: JobId, message: impl Into<String>) {
        let message = message.into();
        match self
            .store
            .update(job_id, Box::new(move |job: &mut Job| job.abort(message)))
            .await
        {
            Ok(_) => tracing::info!(%job_id, "Job marked failed"),
            Err(CoreError::Conflict(_)) => {
                tracing::debug!(%job_id, "Job already terminal, not failing it");
            }
            Err(e) => tracing::error!(%job_id, error = %e, "Failed to mark job failed"),
        }
    }

    async fn preflight(&self) -> Result<(), ProviderError> {
        let provider = self.processor.provider();
        provider.check_credential()?;
        if self.verify_credential {
            provider.verify_credential().await?;
        }
        Ok(())
    }

    async fn settle(&self, job_id: JobId) -> Result<(), CoreError> {
        let job = self
            .store
            .update(job_id, Box::new(|job: &mut Job| job.settle().map(|_| ())))
            .await?;

        match job.status() {
            JobStatus::Merging => self.merge(&job).await,
            JobStatus::Completed => {
                tracing::info!(
                    %job_id,
                    completed = job.completed_count(),
                    failed = job.failed_count(),
                    "Job completed",
                );
                Ok(())
            }
            _ => {
                tracing::warn!(%job_id, total = job.total(), "Job failed: no task produced an output");
                Ok(())
            }
        }
    }

    async fn merge(&self, job: &Job) -> Result<(), CoreError> {
        let job_id = job.id();
        let output_urls: Vec<String> = job
            .tasks()
            .iter()
            .filter_map(|t| t.output_url().map(str::to_owned))
            .collect();
        tracing::info!(%job_id, inputs = output_urls.len(), "Merging outputs");

        match self.merger.merge(&output_urls).await {
            Ok(merged_url) => {
                tracing::info!(%job_id, %merged_url, "Job completed with merged output");
                self.store
                    .update(job_id, Box::new(move |job: &mut Job| job.finish_merge(merged_url)))
                    .await?;
            }
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Merge failed");
                let message = e.to_string();
                self.store
                    .update(job_id, Box::new(move |job: &mut Job| job.fail_merge(message)))
                    .await?;
            }
        }
        Ok(())
    }
}
