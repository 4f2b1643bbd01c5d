//! REST client for the hosted prediction API.
//!
//! Wraps the account, file upload, and prediction endpoints using
//! [`reqwest`]. Every call carries the configured bearer token.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::prediction::{Prediction, UploadedAsset};
use crate::provider::GenerationProvider;

/// Media type used when the declared one cannot be parsed.
const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// HTTP client for the prediction API.
pub struct ReplicateApi {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl ReplicateApi {
    /// Create a new API client from configuration.
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
        }
    }

    // ---- private helpers ----

    /// Build the `Authorization` header value, validating the token first.
    fn auth_header(&self) -> Result<HeaderValue, ProviderError> {
        let token = self
            .api_token
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;
        if token.contains(char::is_whitespace) {
            return Err(ProviderError::MalformedCredential(
                "token contains whitespace".into(),
            ));
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ProviderError::MalformedCredential("token contains invalid characters".into())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Endpoint for creating a prediction: model-scoped for `owner/name`,
    /// version-scoped for `owner/name:version`.
    fn prediction_request(&self, model: &str, input: &Value) -> (String, Value) {
        match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_url),
                serde_json::json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{model}/predictions", self.api_url),
                serde_json::json!({ "input": input }),
            ),
        }
    }

    /// Read status and body of a failed response.
    async fn failure(response: reqwest::Response) -> (u16, String) {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        (status, body)
    }

    /// Error for a non-2xx prediction response, preferring the provider's
    /// `detail` text over the raw body.
    async fn prediction_failure(response: reqwest::Response) -> ProviderError {
        let (status, body) = Self::failure(response).await;
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        ProviderError::Prediction {
            status: Some(status),
            message,
        }
    }
}

/// `type/subtype` with no whitespace, optionally followed by parameters.
fn is_media_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => {
            !kind.is_empty()
                && !subtype.is_empty()
                && !subtype.contains('/')
                && !essence.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[async_trait]
impl GenerationProvider for ReplicateApi {
    fn check_credential(&self) -> Result<(), ProviderError> {
        self.auth_header().map(|_| ())
    }

    /// Sends `GET /account`.
    async fn verify_credential(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/account", self.api_url))
            .header(AUTHORIZATION, self.auth_header()?)
            .send()
            .await
            .map_err(|e| ProviderError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let (code, body) = Self::failure(response).await;
        if code == 401 || code == 403 {
            Err(ProviderError::Auth { status: code })
        } else {
            Err(ProviderError::Connectivity(format!(
                "provider returned {code}: {body}"
            )))
        }
    }

    /// Sends a multipart `POST /files` with the content in the `content`
    /// part.
    async fn upload_asset(
        &self,
        content: Vec<u8>,
        mime_type: &str,
        name: &str,
    ) -> Result<UploadedAsset, ProviderError> {
        let auth = self.auth_header()?;
        let size = content.len();

        let mime_type = if is_media_type(mime_type) {
            mime_type
        } else {
            tracing::warn!(mime_type, name, "Unparseable media type, uploading as binary");
            FALLBACK_MIME_TYPE
        };
        let part = Part::bytes(content)
            .file_name(name.to_string())
            .mime_str(mime_type)?;

        let response = self
            .client
            .post(format!("{}/files", self.api_url))
            .header(AUTHORIZATION, auth)
            .multipart(Form::new().part("content", part))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = Self::failure(response).await;
            return Err(ProviderError::Upload { status, body });
        }

        let raw: Value = response.json().await?;
        let asset = UploadedAsset::from_response(raw).ok_or_else(|| {
            ProviderError::InvalidResponse("upload response has no urls.get".into())
        })?;

        tracing::debug!(name, size, serving_url = %asset.serving_url, "Asset uploaded");
        Ok(asset)
    }

    /// Sends `POST /models/{model}/predictions` (or `POST /predictions` for
    /// pinned versions), with `Prefer: wait` when `wait` is set.
    async fn create_prediction(
        &self,
        model: &str,
        input: &Value,
        wait: bool,
    ) -> Result<Prediction, ProviderError> {
        let (url, body) = self.prediction_request(model, input);

        let mut request = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header()?)
            .json(&body);
        if wait {
            request = request.header("Prefer", "wait");
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::prediction_failure(response).await);
        }

        let prediction: Prediction = response.json().await?;
        tracing::debug!(
            model,
            prediction_id = %prediction.id,
            status = prediction.status.as_str(),
            "Prediction created",
        );
        Ok(prediction)
    }

    /// Sends `GET /predictions/{id}`.
    async fn poll_prediction(&self, id: &str) -> Result<Prediction, ProviderError> {
        let response = self
            .client
            .get(format!("{}/predictions/{id}", self.api_url))
            .header(AUTHORIZATION, self.auth_header()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::prediction_failure(response).await);
        }
        Ok(response.json().await?)
    }
}
