//! Client for the external generation API.
//!
//! Provides the [`GenerationProvider`] seam used by the job pipeline, typed
//! prediction payloads, the provider error taxonomy, and [`ReplicateApi`],
//! the HTTP implementation built on [`reqwest`].

pub mod api;
pub mod config;
pub mod error;
pub mod prediction;
pub mod provider;

pub use api::ReplicateApi;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use prediction::{Prediction, PredictionStatus, UploadedAsset};
pub use provider::GenerationProvider;
