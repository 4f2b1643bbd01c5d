use clipforge_core::error::CoreError;
use clipforge_provider::ProviderError;

/// Prefix of task errors caused by the configured credential.
pub const CREDENTIAL_ERROR_PREFIX: &str = "Invalid API credential";

/// Prefix of task errors caused by network failures.
pub const CONNECTIVITY_ERROR_PREFIX: &str = "Connectivity error";

/// Why a single task (or a one-shot generation) did not produce an output.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The prediction was still running after the poll budget was spent.
    #[error("Timed out waiting for prediction {prediction_id} after {attempts} polls")]
    Timeout {
        prediction_id: String,
        attempts: u32,
    },

    /// The prediction succeeded but carried no usable output URL.
    #[error("Prediction {prediction_id} finished without an output URL")]
    EmptyOutput { prediction_id: String },
}

impl TaskError {
    /// Message recorded on a failed task.
    ///
    /// Credential problems and network failures get a fixed, recognisable
    /// prefix; everything else is the provider's own message.
    pub fn classify(&self) -> String {
        match self {
            Self::Provider(e) if e.is_credential_problem() => {
                format!("{CREDENTIAL_ERROR_PREFIX}: {e}")
            }
            Self::Provider(ProviderError::Connectivity(detail)) => {
                format!("{CONNECTIVITY_ERROR_PREFIX}: could not reach the generation provider ({detail})")
            }
            other => other.to_string(),
        }
    }

    /// Whether another generation attempt may succeed. Timeouts and empty
    /// outputs are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout { .. } | Self::EmptyOutput { .. } => false,
        }
    }

    /// HTTP status reported by the provider, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider(e) => e.status_code(),
            _ => None,
        }
    }
}

/// Errors surfaced to callers of the pipeline (submission, lookups).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Task(#[from] TaskError),

    /// The runner has stopped and no longer accepts jobs.
    #[error("Job queue is closed")]
    QueueClosed,
}
