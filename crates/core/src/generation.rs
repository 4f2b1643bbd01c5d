//! Generation parameters, defaults, and prediction input construction.
//!
//! The provider expects a model-specific `input` object. The builders here
//! keep that mapping in one place so the task processor and the one-shot
//! reference-image route agree on field names.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// What a batch job produces from each image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Image-to-video.
    #[default]
    Video,
    /// Prompt-guided image edit.
    Image,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }

    /// Model used when the request does not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Video => DEFAULT_VIDEO_MODEL,
            Self::Image => DEFAULT_IMAGE_EDIT_MODEL,
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            other => Err(CoreError::Validation(format!(
                "Invalid mode '{other}'. Must be one of: video, image"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_VIDEO_MODEL: &str = "bytedance/seedance-1-lite";
pub const DEFAULT_IMAGE_EDIT_MODEL: &str = "black-forest-labs/flux-kontext-pro";
pub const DEFAULT_REFERENCE_IMAGE_MODEL: &str = "runwayml/gen4-image";

pub const DEFAULT_RESOLUTION: &str = "1080p";
pub const DEFAULT_DURATION_SECS: u32 = 5;

/// Resolutions accepted by the video models.
pub const VALID_RESOLUTIONS: &[&str] = &["480p", "720p", "1080p"];

/// Bounds on clip duration in seconds.
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 12;

/// Upper bound on reference images for the one-shot route.
pub const MAX_REFERENCE_IMAGES: usize = 3;

// ---------------------------------------------------------------------------
// Batch parameters
// ---------------------------------------------------------------------------

/// Parameters shared by every task of a batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    /// Provider model identifier, `owner/name` or `owner/name:version`.
    pub model: String,
    pub resolution: String,
    pub duration_secs: u32,
    pub camera_fixed: bool,
    /// Whether to combine the outputs once every task is done.
    pub merge: bool,
    pub mode: GenerationMode,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::for_mode(GenerationMode::default())
    }
}

impl GenerationParams {
    /// Defaults for `mode`, including its default model.
    pub fn for_mode(mode: GenerationMode) -> Self {
        Self {
            model: mode.default_model().to_string(),
            resolution: DEFAULT_RESOLUTION.to_string(),
            duration_secs: DEFAULT_DURATION_SECS,
            camera_fixed: false,
            merge: false,
            mode,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_model_id(&self.model)?;
        if !VALID_RESOLUTIONS.contains(&self.resolution.as_str()) {
            return Err(CoreError::Validation(format!(
                "Invalid resolution '{}'. Must be one of: {}",
                self.resolution,
                VALID_RESOLUTIONS.join(", ")
            )));
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(CoreError::Validation(format!(
                "duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds"
            )));
        }
        Ok(())
    }

    /// Provider `input` object for one task.
    pub fn prediction_input(&self, prompt: &str, image_url: &str) -> Value {
        match self.mode {
            GenerationMode::Video => json!({
                "prompt": prompt,
                "image": image_url,
                "resolution": self.resolution,
                "duration": self.duration_secs,
                "camera_fixed": self.camera_fixed,
            }),
            GenerationMode::Image => json!({
                "prompt": prompt,
                "input_image": image_url,
            }),
        }
    }
}

/// Model ids look like `owner/name`, optionally followed by `:version`.
pub fn validate_model_id(model: &str) -> Result<(), CoreError> {
    let name = model.split_once(':').map_or(model, |(name, _)| name);
    let valid = match name.split_once('/') {
        Some((owner, model_name)) => {
            !owner.is_empty() && !model_name.is_empty() && !model_name.contains('/')
        }
        None => false,
    };
    if valid && !model.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid model '{model}'. Expected 'owner/name' or 'owner/name:version'"
        )))
    }
}

// ---------------------------------------------------------------------------
// Reference-image generation
// ---------------------------------------------------------------------------

/// Provider `input` object for reference-conditioned image generation.
pub fn reference_image_input(
    prompt: &str,
    aspect_ratio: &str,
    resolution: &str,
    reference_tags: &[String],
    reference_images: &[String],
) -> Value {
    json!({
        "prompt": prompt,
        "aspect_ratio": aspect_ratio,
        "resolution": resolution,
        "reference_tags": reference_tags,
        "reference_images": reference_images,
    })
}
