//! The seam between the job pipeline and the external generation API.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::prediction::{Prediction, UploadedAsset};

/// Operations the pipeline needs from a generation provider.
///
/// [`ReplicateApi`](crate::ReplicateApi) is the production implementation;
/// tests substitute in-memory doubles.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Local check that a usable credential is configured. Makes no
    /// network call.
    fn check_credential(&self) -> Result<(), ProviderError>;

    /// Issue a lightweight authenticated request.
    async fn verify_credential(&self) -> Result<(), ProviderError>;

    /// Upload binary content and return its serving URL.
    async fn upload_asset(
        &self,
        content: Vec<u8>,
        mime_type: &str,
        name: &str,
    ) -> Result<UploadedAsset, ProviderError>;

    /// Submit a generation request. With `wait` the provider may hold the
    /// request open until the prediction finishes; the returned prediction
    /// can still be non-terminal and must then be polled.
    async fn create_prediction(
        &self,
        model: &str,
        input: &Value,
        wait: bool,
    ) -> Result<Prediction, ProviderError>;

    /// Fetch the current state of a prediction.
    async fn poll_prediction(&self, id: &str) -> Result<Prediction, ProviderError>;
}
