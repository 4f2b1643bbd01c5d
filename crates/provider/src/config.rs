/// Base URL of the hosted prediction API.
pub const DEFAULT_API_URL: &str = "https://api.replicate.com/v1";

/// Provider connection settings loaded from the environment.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Base HTTP URL, without a trailing slash.
    pub api_url: String,
    /// API token. `None` when unset or blank; operations then fail with
    /// [`ProviderError::MissingCredential`](crate::ProviderError::MissingCredential).
    pub api_token: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var               | Default                          |
    /// |-----------------------|----------------------------------|
    /// | `REPLICATE_API_URL`   | `https://api.replicate.com/v1`   |
    /// | `REPLICATE_API_TOKEN` | none                             |
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("REPLICATE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let api_token = std::env::var("REPLICATE_API_TOKEN").ok();
        Self::new(api_url, api_token)
    }

    pub fn has_token(&self) -> bool {
        self.api_token.is_some()
    }
}
