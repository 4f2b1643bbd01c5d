//! Typed provider payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state reported by the provider for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Aborted,
    /// A status this client does not know yet; treated as still running.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Aborted
        )
    }
}

/// A unit of generation work on the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    /// Either a single URL or a sequence of URLs, depending on the model.
    #[serde(default)]
    pub output: Value,
    /// Provider-reported failure; usually a string.
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// The result URL: the output itself when it is a string, otherwise the
    /// first element of a sequence.
    pub fn first_output_url(&self) -> Option<&str> {
        let url = match &self.output {
            Value::String(url) => Some(url.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        };
        url.filter(|u| !u.trim().is_empty())
    }

    /// Human-readable failure reason for a failed or canceled prediction.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(msg)) if !msg.is_empty() => msg.clone(),
            Some(Value::Null) | None => {
                format!("prediction {} ended as {}", self.id, self.status.as_str())
            }
            Some(other) => other.to_string(),
        }
    }
}

/// Result of an asset upload.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Durable reference URL that can be used as a prediction input.
    pub serving_url: String,
    /// The provider's response body, unmodified.
    pub raw: Value,
}

impl UploadedAsset {
    /// Extract the serving URL (`urls.get`) from an upload response.
    pub fn from_response(raw: Value) -> Option<Self> {
        let serving_url = raw
            .pointer("/urls/get")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())?
            .to_string();
        Some(Self { serving_url, raw })
    }
}
