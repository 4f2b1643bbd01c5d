//! Handlers for the `/jobs` resource.
//!
//! Submission registers the job and queues it for the background runner;
//! clients then poll `GET /jobs/{id}` until the status is terminal.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clipforge_core::error::CoreError;
use clipforge_core::generation::{GenerationMode, GenerationParams};
use clipforge_core::job::{Job, JobStatus, Task, TaskStatus};
use clipforge_core::types::{JobId, Timestamp};
use clipforge_pipeline::{JobRequest, SourceImage};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Content type assumed for image parts that do not declare one.
const FALLBACK_IMAGE_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Client-facing projection of a [`Task`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub filename: String,
    pub prompt: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            filename: task.filename.clone(),
            prompt: task.prompt.clone(),
            status: task.status(),
            output_url: task.output_url().map(str::to_owned),
            error: task.error().map(str::to_owned),
        }
    }
}

/// Client-facing projection of a [`Job`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub tasks: Vec<TaskView>,
    pub total: usize,
    pub completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Timestamp,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id(),
            status: job.status(),
            tasks: job.tasks().iter().map(TaskView::from).collect(),
            total: job.total(),
            completed: job.completed_count(),
            merged_output_url: job.merged_output_url().map(str::to_owned),
            error: job.error().map(str::to_owned),
            started_at: job.started_at(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a path id. Malformed ids are reported as unknown jobs.
fn parse_job_id(raw: &str) -> AppResult<JobId> {
    uuid::Uuid::parse_str(raw).map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: raw.to_string(),
        })
    })
}

fn job_not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    })
}

/// Collect prompt values. A value holding a JSON array of strings
/// contributes each element; anything else is a single prompt.
fn push_prompts(prompts: &mut Vec<String>, value: String) {
    if value.trim_start().starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(&value) {
            prompts.extend(list);
            return;
        }
    }
    prompts.push(value);
}

fn parse_bool(field: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" | "" => Ok(false),
        other => Err(AppError::BadRequest(format!(
            "'{field}' must be true or false, got '{other}'"
        ))),
    }
}

/// Raw form values before defaults are applied.
#[derive(Default)]
struct SubmissionForm {
    images: Vec<SourceImage>,
    prompts: Vec<String>,
    model: Option<String>,
    resolution: Option<String>,
    duration: Option<String>,
    camera_fixed: Option<String>,
    merge: Option<String>,
    mode: Option<String>,
}

impl SubmissionForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "images" {
                let filename = field
                    .file_name()
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| AppError::BadRequest("Image parts must have a filename".into()))?
                    .to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or(FALLBACK_IMAGE_TYPE)
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                form.images
                    .push(SourceImage::new(filename, mime_type, data.to_vec()));
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            match name.as_str() {
                "prompts" => push_prompts(&mut form.prompts, text),
                "model" => form.model = Some(text),
                "resolution" => form.resolution = Some(text),
                "duration" => form.duration = Some(text),
                "cameraFixed" => form.camera_fixed = Some(text),
                "merge" => form.merge = Some(text),
                "mode" => form.mode = Some(text),
                _ => {} // ignore unknown fields
            }
        }

        Ok(form)
    }

    fn into_request(self) -> AppResult<JobRequest> {
        let mode = match self.mode.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.parse::<GenerationMode>()?,
            _ => GenerationMode::default(),
        };

        let mut params = GenerationParams::for_mode(mode);
        if let Some(model) = self.model.filter(|m| !m.trim().is_empty()) {
            params.model = model.trim().to_string();
        }
        if let Some(resolution) = self.resolution.filter(|r| !r.trim().is_empty()) {
            params.resolution = resolution.trim().to_string();
        }
        if let Some(duration) = self.duration.filter(|d| !d.trim().is_empty()) {
            params.duration_secs = duration.trim().parse().map_err(|_| {
                AppError::BadRequest(format!("'duration' must be a whole number, got '{duration}'"))
            })?;
        }
        if let Some(camera_fixed) = self.camera_fixed {
            params.camera_fixed = parse_bool("cameraFixed", &camera_fixed)?;
        }
        if let Some(merge) = self.merge {
            params.merge = parse_bool("merge", &merge)?;
        }

        Ok(JobRequest {
            images: self.images,
            prompts: self.prompts,
            params,
        })
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accepts a multipart form with repeated `images` file parts and matching
/// `prompts`. Returns 202 with the job in `processing` and every task
/// `queued`; generation continues in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let request = SubmissionForm::read(multipart).await?.into_request()?;
    let job = state.jobs.submit(request).await?;

    tracing::info!(job_id = %job.id(), tasks = job.total(), "Job submitted");

    Ok((StatusCode::ACCEPTED, Json(JobView::from(&job))))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// All known jobs, oldest first.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.store().list().await?;
    let views: Vec<JobView> = jobs.iter().map(JobView::from).collect();
    Ok(Json(views))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Current status of a job and each of its tasks.
pub async fn get_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = parse_job_id(&raw_id)?;
    let job = state
        .store()
        .get(job_id)
        .await?
        .ok_or_else(|| job_not_found(job_id))?;
    Ok(Json(JobView::from(&job)))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Forget a job. A job that is still running keeps executing, but its
/// results are discarded.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    let job_id = parse_job_id(&raw_id)?;
    if state.store().delete(job_id).await? {
        tracing::info!(%job_id, "Job deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(job_not_found(job_id))
    }
}
