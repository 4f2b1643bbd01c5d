use std::sync::Arc;

use clipforge_pipeline::{JobRunnerHandle, JobStore};
use clipforge_provider::GenerationProvider;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Entry point for submitting batch jobs to the background runner.
    pub jobs: JobRunnerHandle,
    /// Generation provider used by the one-shot routes.
    pub provider: Arc<dyn GenerationProvider>,
}

impl AppState {
    /// The job store behind the runner.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        self.jobs.orchestrator().store()
    }
}
