//! Per-item processing: upload, generate, poll, record.

use std::sync::Arc;
use std::time::Duration;

use clipforge_core::error::CoreError;
use clipforge_core::generation::GenerationParams;
use clipforge_core::job::Job;
use clipforge_core::retry::RetryPolicy;
use clipforge_core::types::JobId;
use clipforge_provider::{GenerationProvider, Prediction, PredictionStatus, ProviderError};
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::error::TaskError;
use crate::store::JobStore;

/// Default delay between prediction polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of polls before a prediction is considered stuck.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Bounds of the prediction poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// One uploaded image from a batch submission.
#[derive(Clone)]
pub struct SourceImage {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl SourceImage {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// Turns one (image, prompt) pair into a generated output URL.
pub struct TaskProcessor {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
    poll: PollConfig,
    sync_wait: bool,
}

impl TaskProcessor {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        retry: RetryPolicy,
        poll: PollConfig,
        sync_wait: bool,
    ) -> Self {
        Self {
            provider,
            retry,
            poll,
            sync_wait,
        }
    }

    pub fn from_config(provider: Arc<dyn GenerationProvider>, config: &PipelineConfig) -> Self {
        Self::new(provider, config.retry, config.poll, config.sync_wait)
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// Run task `index` of a job and record its outcome in the store.
    ///
    /// Generation failures end up on the task; only store errors (the job
    /// vanished or was already settled) are returned.
    pub async fn process(
        &self,
        store: &dyn JobStore,
        job_id: JobId,
        index: usize,
        image: SourceImage,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<(), CoreError> {
        store
            .update(job_id, Box::new(move |job: &mut Job| job.start_task(index)))
            .await?;

        let filename = image.filename.clone();
        match self.generate(image, prompt, params).await {
            Ok(output_url) => {
                tracing::info!(task = index, %filename, %output_url, "Task completed");
                store
                    .update(
                        job_id,
                        Box::new(move |job: &mut Job| job.complete_task(index, output_url)),
                    )
                    .await?;
            }
            Err(e) => {
                let message = e.classify();
                tracing::warn!(task = index, %filename, error = %e, "Task failed");
                store
                    .update(job_id, Box::new(move |job: &mut Job| job.fail_task(index, message)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Upload the image and generate from it. Returns the output URL.
    pub async fn generate(
        &self,
        image: SourceImage,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, TaskError> {
        let asset = self
            .provider
            .upload_asset(image.content, &image.mime_type, &image.filename)
            .await?;
        tracing::debug!(filename = %image.filename, url = %asset.serving_url, "Image uploaded");

        let input = params.prediction_input(prompt, &asset.serving_url);
        let prediction = self.run_prediction(&params.model, &input).await?;
        output_url(&prediction)
    }

    /// Create a prediction and wait for it to succeed, retrying failed
    /// attempts per the retry policy.
    ///
    /// A prediction that ends `failed` or `canceled` counts as a failed
    /// attempt. Poll timeouts are not retried.
    pub async fn run_prediction(&self, model: &str, input: &Value) -> Result<Prediction, TaskError> {
        self.retry
            .run_if(
                move || async move {
                    let created = self
                        .provider
                        .create_prediction(model, input, self.sync_wait)
                        .await?;
                    tracing::debug!(
                        prediction_id = %created.id,
                        status = created.status.as_str(),
                        "Prediction created",
                    );
                    let finished = self.await_prediction(created).await?;
                    ensure_succeeded(finished)
                },
                TaskError::is_retryable,
            )
            .await
    }

    /// Poll until the prediction is terminal or the poll budget runs out.
    async fn await_prediction(&self, mut prediction: Prediction) -> Result<Prediction, TaskError> {
        let mut attempts = 0u32;
        while !prediction.status.is_terminal() {
            if attempts >= self.poll.max_attempts {
                return Err(TaskError::Timeout {
                    prediction_id: prediction.id,
                    attempts,
                });
            }
            tokio::time::sleep(self.poll.interval).await;
            attempts += 1;

            match self.provider.poll_prediction(&prediction.id).await {
                Ok(next) => prediction = next,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        prediction_id = %prediction.id,
                        attempt = attempts,
                        error = %e,
                        "Prediction poll failed",
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(prediction)
    }
}

fn ensure_succeeded(prediction: Prediction) -> Result<Prediction, TaskError> {
    match prediction.status {
        PredictionStatus::Succeeded => Ok(prediction),
        _ => Err(ProviderError::Prediction {
            status: None,
            message: prediction.error_message(),
        }
        .into()),
    }
}

/// First usable output URL of a succeeded prediction.
pub fn output_url(prediction: &Prediction) -> Result<String, TaskError> {
    prediction
        .first_output_url()
        .map(str::to_owned)
        .ok_or_else(|| TaskError::EmptyOutput {
            prediction_id: prediction.id.clone(),
        })
}
