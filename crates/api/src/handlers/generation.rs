//! One-shot generation outside the batch pipeline.

use axum::extract::State;
use axum::Json;
use clipforge_core::error::CoreError;
use clipforge_core::generation::{
    reference_image_input, validate_model_id, DEFAULT_REFERENCE_IMAGE_MODEL, MAX_REFERENCE_IMAGES,
};
use clipforge_pipeline::processor::output_url;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppResult;
use crate::state::AppState;

const DEFAULT_ASPECT_RATIO: &str = "16:9";
const DEFAULT_REFERENCE_RESOLUTION: &str = "1080p";

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

fn default_reference_resolution() -> String {
    DEFAULT_REFERENCE_RESOLUTION.to_string()
}

/// Body of `POST /generate/reference-image`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImageRequest {
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_reference_resolution")]
    pub resolution: String,
    /// Tags the prompt uses to address each reference image (`@tag`).
    #[serde(default)]
    pub reference_tags: Vec<String>,
    #[validate(length(min = 1, message = "at least one reference image is required"))]
    pub reference_images: Vec<String>,
    /// Overrides the default reference-image model.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImageResponse {
    pub success: bool,
    pub image_url: String,
    pub prediction_id: String,
    pub reference_count: usize,
}

/// Tags for each reference image: the caller's tags, padded with
/// `ref1`, `ref2`, ... when fewer tags than images were given.
fn reference_tags(given: &[String], images: usize) -> Vec<String> {
    (0..images)
        .map(|i| match given.get(i).map(|t| t.trim()) {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => format!("ref{}", i + 1),
        })
        .collect()
}

/// POST /api/v1/generate/reference-image
///
/// Generates one image conditioned on up to three reference images and
/// waits for the result. Provider failures are returned with the provider's
/// status code.
pub async fn generate_reference_image(
    State(state): State<AppState>,
    Json(input): Json<ReferenceImageRequest>,
) -> AppResult<Json<ReferenceImageResponse>> {
    input.validate()?;
    if input.prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt is required".into()).into());
    }
    if input.reference_images.len() > MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_REFERENCE_IMAGES} reference images are supported, got {}",
            input.reference_images.len()
        ))
        .into());
    }

    let model = input
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_REFERENCE_IMAGE_MODEL);
    validate_model_id(model)?;
    state.provider.check_credential()?;

    let tags = reference_tags(&input.reference_tags, input.reference_images.len());
    let provider_input = reference_image_input(
        input.prompt.trim(),
        &input.aspect_ratio,
        &input.resolution,
        &tags,
        &input.reference_images,
    );

    let prediction = state
        .jobs
        .orchestrator()
        .processor()
        .run_prediction(model, &provider_input)
        .await?;
    let image_url = output_url(&prediction)?;

    tracing::info!(
        prediction_id = %prediction.id,
        references = input.reference_images.len(),
        "Reference image generated",
    );

    Ok(Json(ReferenceImageResponse {
        success: true,
        image_url,
        prediction_id: prediction.id,
        reference_count: input.reference_images.len(),
    }))
}
