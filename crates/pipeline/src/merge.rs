//! Merge phase: combine the outputs of a finished job into one artifact.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Nothing to merge")]
    NoInputs,

    #[error("Merge failed: {0}")]
    Failed(String),
}

/// Combines completed task outputs (in task order) into a single URL.
#[async_trait]
pub trait OutputMerger: Send + Sync {
    async fn merge(&self, output_urls: &[String]) -> Result<String, MergeError>;
}

/// Placeholder merger that returns the first output unchanged.
///
/// Real concatenation is done by an external media service; until one is
/// wired in, the merged URL points at the first clip.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstOutputMerger;

#[async_trait]
impl OutputMerger for FirstOutputMerger {
    async fn merge(&self, output_urls: &[String]) -> Result<String, MergeError> {
        output_urls.first().cloned().ok_or(MergeError::NoInputs)
    }
}
