/// Errors from the generation provider layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No API token is configured on this server.
    #[error("Provider API token is not configured")]
    MissingCredential,

    /// The configured token cannot be sent as a bearer credential.
    #[error("Provider API token is malformed: {0}")]
    MalformedCredential(String),

    /// The provider rejected the credential.
    #[error("Provider rejected the API token ({status})")]
    Auth {
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// The request never produced a usable HTTP exchange (DNS, TLS,
    /// connection reset) or the provider was unavailable.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Asset upload returned a non-2xx status.
    #[error("Upload failed ({status}): {body}")]
    Upload {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Prediction creation was rejected, or the prediction itself failed.
    #[error("{message}")]
    Prediction {
        /// HTTP status code when the HTTP call failed; `None` when the
        /// prediction reached a failed state.
        status: Option<u16>,
        message: String,
    },

    /// The provider answered with a body we could not decode.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// HTTP status reported by the provider, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Auth { status } | Self::Upload { status, .. } => Some(*status),
            Self::Prediction { status, .. } => *status,
            _ => None,
        }
    }

    /// Token or format problems with the configured credential.
    pub fn is_credential_problem(&self) -> bool {
        match self {
            Self::MissingCredential | Self::MalformedCredential(_) | Self::Auth { .. } => true,
            Self::Upload { status, .. } => is_auth_status(*status),
            Self::Prediction {
                status: Some(status),
                ..
            } => is_auth_status(*status),
            _ => false,
        }
    }

    /// Whether repeating the same call could plausibly succeed.
    ///
    /// Credential problems and client errors (4xx other than 408/409/429)
    /// are permanent.
    pub fn is_retryable(&self) -> bool {
        if self.is_credential_problem() {
            return false;
        }
        match self.status_code() {
            Some(status @ 400..=499) => matches!(status, 408 | 409 | 429),
            _ => true,
        }
    }
}

fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}
