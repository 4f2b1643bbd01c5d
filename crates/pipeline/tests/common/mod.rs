#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::generation::GenerationParams;
use clipforge_core::retry::RetryPolicy;
use clipforge_pipeline::{
    FirstOutputMerger, InMemoryJobStore, JobOrchestrator, JobRequest, JobStore, OutputMerger,
    PollConfig, SourceImage, TaskProcessor,
};
use clipforge_provider::{
    GenerationProvider, Prediction, ProviderError, UploadedAsset,
};
use serde_json::{json, Value};

/// How the stub answers credential checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Valid,
    Missing,
    Malformed,
    Rejected,
    /// Valid, but the verification request cannot reach the provider.
    Unreachable,
}

/// Scripted in-memory provider.
///
/// By default every upload succeeds and every prediction succeeds
/// immediately with a unique output URL. Scripted responses are consumed
/// first, in order.
pub struct StubProvider {
    credential: Credential,
    failing_uploads: HashSet<String>,
    panicking_uploads: HashSet<String>,
    create_script: Mutex<VecDeque<Result<Prediction, ProviderError>>>,
    poll_script: Mutex<VecDeque<Result<Prediction, ProviderError>>>,
    never_finishes: bool,
    pub uploads: AtomicUsize,
    pub creates: AtomicUsize,
    pub polls: AtomicUsize,
    pub verifies: AtomicUsize,
    pub inputs: Mutex<Vec<Value>>,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self {
            credential: Credential::Valid,
            failing_uploads: HashSet::new(),
            panicking_uploads: HashSet::new(),
            create_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            never_finishes: false,
            uploads: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            verifies: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn failing_upload_for(mut self, filename: &str) -> Self {
        self.failing_uploads.insert(filename.to_string());
        self
    }

    pub fn panicking_upload_for(mut self, filename: &str) -> Self {
        self.panicking_uploads.insert(filename.to_string());
        self
    }

    pub fn with_create_responses(self, responses: Vec<Result<Prediction, ProviderError>>) -> Self {
        self.create_script.lock().unwrap().extend(responses);
        self
    }

    pub fn with_poll_responses(self, responses: Vec<Result<Prediction, ProviderError>>) -> Self {
        self.poll_script.lock().unwrap().extend(responses);
        self
    }

    /// Predictions start and stay `processing` forever.
    pub fn never_finishing(mut self) -> Self {
        self.never_finishes = true;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
            + self.creates.load(Ordering::SeqCst)
            + self.polls.load(Ordering::SeqCst)
            + self.verifies.load(Ordering::SeqCst)
    }
}

pub fn prediction(id: &str, status: &str, output: Value) -> Prediction {
    serde_json::from_value(json!({"id": id, "status": status, "output": output})).unwrap()
}

pub fn failed_prediction(id: &str, error: &str) -> Prediction {
    serde_json::from_value(json!({"id": id, "status": "failed", "error": error})).unwrap()
}

#[async_trait]
impl GenerationProvider for StubProvider {
    fn check_credential(&self) -> Result<(), ProviderError> {
        match self.credential {
            Credential::Missing => Err(ProviderError::MissingCredential),
            Credential::Malformed => Err(ProviderError::MalformedCredential(
                "contains whitespace".into(),
            )),
            Credential::Valid | Credential::Rejected | Credential::Unreachable => Ok(()),
        }
    }

    async fn verify_credential(&self) -> Result<(), ProviderError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.check_credential()?;
        match self.credential {
            Credential::Rejected => Err(ProviderError::Auth { status: 401 }),
            Credential::Unreachable => {
                Err(ProviderError::Connectivity("connection reset".into()))
            }
            _ => Ok(()),
        }
    }

    async fn upload_asset(
        &self,
        content: Vec<u8>,
        _mime_type: &str,
        name: &str,
    ) -> Result<UploadedAsset, ProviderError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.panicking_uploads.contains(name) {
            panic!("stub provider panicked uploading {name}");
        }
        if self.failing_uploads.contains(name) {
            return Err(ProviderError::Upload {
                status: 500,
                body: format!("upload of {name} failed"),
            });
        }
        let raw = json!({
            "id": format!("file-{n}"),
            "size": content.len(),
            "urls": {"get": format!("https://files.test/{name}")}
        });
        Ok(UploadedAsset::from_response(raw).unwrap())
    }

    async fn create_prediction(
        &self,
        _model: &str,
        input: &Value,
        _wait: bool,
    ) -> Result<Prediction, ProviderError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());
        if let Some(scripted) = self.create_script.lock().unwrap().pop_front() {
            return scripted;
        }
        if self.never_finishes {
            return Ok(prediction(&format!("pred-{n}"), "starting", Value::Null));
        }
        Ok(prediction(
            &format!("pred-{n}"),
            "succeeded",
            json!([format!("https://cdn.test/out-{n}.mp4")]),
        ))
    }

    async fn poll_prediction(&self, id: &str) -> Result<Prediction, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.poll_script.lock().unwrap().pop_front() {
            return scripted;
        }
        if self.never_finishes {
            return Ok(prediction(id, "processing", Value::Null));
        }
        Ok(prediction(
            id,
            "succeeded",
            json!(format!("https://cdn.test/{id}.mp4")),
        ))
    }
}

/// Merger that always fails.
pub struct BrokenMerger;

#[async_trait]
impl OutputMerger for BrokenMerger {
    async fn merge(&self, _output_urls: &[String]) -> Result<String, clipforge_pipeline::MergeError> {
        Err(clipforge_pipeline::MergeError::Failed("ffmpeg exited with 1".into()))
    }
}

pub struct Harness {
    pub provider: Arc<StubProvider>,
    pub store: Arc<InMemoryJobStore>,
    pub orchestrator: Arc<JobOrchestrator>,
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_secs(2),
    }
}

pub fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(5),
        max_attempts: 3,
    }
}

pub fn harness(provider: StubProvider) -> Harness {
    harness_with_merger(provider, Arc::new(FirstOutputMerger))
}

pub fn harness_with_merger(provider: StubProvider, merger: Arc<dyn OutputMerger>) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryJobStore::new());
    let processor = TaskProcessor::new(
        provider.clone() as Arc<dyn GenerationProvider>,
        retry_policy(),
        poll_config(),
        false,
    );
    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone() as Arc<dyn JobStore>,
        processor,
        merger,
        true,
    ));
    Harness {
        provider,
        store,
        orchestrator,
    }
}

pub fn image(filename: &str) -> SourceImage {
    SourceImage::new(filename, "image/png", vec![0x89, b'P', b'N', b'G'])
}

/// A request with one image per filename, prompted `"prompt for <file>"`.
pub fn request(filenames: &[&str], merge: bool) -> JobRequest {
    JobRequest {
        images: filenames.iter().map(|f| image(f)).collect(),
        prompts: filenames.iter().map(|f| format!("prompt for {f}")).collect(),
        params: GenerationParams {
            merge,
            ..GenerationParams::default()
        },
    }
}
