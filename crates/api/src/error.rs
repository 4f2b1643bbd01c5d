use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clipforge_core::error::CoreError;
use clipforge_pipeline::{PipelineError, TaskError};
use clipforge_provider::ProviderError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain, provider and pipeline errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error": ..., "code": ...}`; provider failures
/// also carry a `details` field with the provider's own response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `clipforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failed call to the generation provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A one-shot generation that did not produce an output.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The job runner is not accepting work.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Core(e) => Self::Core(e),
            PipelineError::Provider(e) => Self::Provider(e),
            PipelineError::Task(e) => Self::Task(e),
            PipelineError::QueueClosed => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Core(CoreError::Validation(errors.to_string()))
    }
}

struct ErrorParts {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ErrorParts {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let parts = match &self {
            // --- Domain errors ---
            AppError::Core(core) => classify_core_error(core),

            // --- Provider errors ---
            AppError::Provider(err) => classify_provider_error(err),
            AppError::Task(TaskError::Provider(err)) => classify_provider_error(err),
            AppError::Task(err @ TaskError::Timeout { .. }) => {
                ErrorParts::new(StatusCode::GATEWAY_TIMEOUT, "GENERATION_TIMEOUT", err.to_string())
            }
            AppError::Task(err @ TaskError::EmptyOutput { .. }) => {
                ErrorParts::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", err.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::Unavailable(msg) => {
                ErrorParts::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.clone())
            }
            AppError::BadRequest(msg) => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ErrorParts::internal()
            }
        };

        let mut body = json!({
            "error": parts.message,
            "code": parts.code,
        });
        if let Some(details) = parts.details {
            body["details"] = details;
        }

        (parts.status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> ErrorParts {
    match err {
        CoreError::NotFound { entity, id } => ErrorParts::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => {
            ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        CoreError::Conflict(msg) => ErrorParts::new(StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Config(msg) => {
            tracing::error!(error = %msg, "Server misconfiguration");
            ErrorParts::new(StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg.clone())
        }
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            ErrorParts::internal()
        }
    }
}

/// Map a provider failure to a response, mirroring the provider's HTTP
/// status where it reported one.
fn classify_provider_error(err: &ProviderError) -> ErrorParts {
    match err {
        ProviderError::MissingCredential | ProviderError::MalformedCredential(_) => {
            tracing::error!(error = %err, "Provider credential unusable");
            ErrorParts::new(StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", err.to_string())
        }
        ProviderError::Auth { status } => ErrorParts::new(
            mirror_status(Some(*status)),
            "PROVIDER_AUTH_ERROR",
            err.to_string(),
        ),
        ProviderError::Connectivity(_) => {
            ErrorParts::new(StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE", err.to_string())
        }
        ProviderError::Upload { status, body } => ErrorParts {
            details: Some(serde_json::from_str(body).unwrap_or_else(|_| json!(body))),
            ..ErrorParts::new(mirror_status(Some(*status)), "PROVIDER_ERROR", "Asset upload failed")
        },
        ProviderError::Prediction { status, message } => {
            ErrorParts::new(mirror_status(*status), "PROVIDER_ERROR", message.clone())
        }
        ProviderError::InvalidResponse(_) => {
            ErrorParts::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", err.to_string())
        }
    }
}

/// The provider's error status, or 500 when there is none (or it is not an
/// error status).
fn mirror_status(status: Option<u16>) -> StatusCode {
    status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
