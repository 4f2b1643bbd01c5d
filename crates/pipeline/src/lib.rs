//! Batch generation pipeline.
//!
//! A submitted batch becomes a [`Job`](clipforge_core::job::Job) in the
//! [`JobStore`](store::JobStore). The [`JobRunner`](runner::JobRunner)
//! hands each queued job to the [`JobOrchestrator`](orchestrator::JobOrchestrator),
//! which drives every task through the [`TaskProcessor`](processor::TaskProcessor)
//! in order, settles the aggregate status, and runs the optional merge
//! phase.

pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod processor;
pub mod runner;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, TaskError};
pub use merge::{FirstOutputMerger, MergeError, OutputMerger};
pub use orchestrator::{JobOrchestrator, JobRequest, JobWork};
pub use processor::{PollConfig, SourceImage, TaskProcessor};
pub use runner::{JobRunner, JobRunnerHandle};
pub use store::{InMemoryJobStore, JobMutator, JobStore};
