#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use clipforge_api::config::ServerConfig;
use clipforge_api::router::build_app_router;
use clipforge_api::state::AppState;
use clipforge_core::retry::RetryPolicy;
use clipforge_pipeline::{
    FirstOutputMerger, InMemoryJobStore, JobOrchestrator, JobRunner, JobStore, PollConfig,
    TaskProcessor,
};
use clipforge_provider::{GenerationProvider, Prediction, ProviderError, UploadedAsset};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// Provider double
// ---------------------------------------------------------------------------

/// In-memory provider. Uploads and predictions succeed immediately unless
/// configured otherwise.
#[derive(Default)]
pub struct FakeProvider {
    pub missing_credential: bool,
    pub reject_credential: bool,
    /// Fail every upload with this status.
    pub upload_status: Option<u16>,
    /// Reject every prediction with this status.
    pub prediction_status: Option<u16>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    fn check_credential(&self) -> Result<(), ProviderError> {
        if self.missing_credential {
            Err(ProviderError::MissingCredential)
        } else {
            Ok(())
        }
    }

    async fn verify_credential(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_credential()?;
        if self.reject_credential {
            return Err(ProviderError::Auth { status: 401 });
        }
        Ok(())
    }

    async fn upload_asset(
        &self,
        _content: Vec<u8>,
        mime_type: &str,
        name: &str,
    ) -> Result<UploadedAsset, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.upload_status {
            return Err(ProviderError::Upload {
                status,
                body: json!({"detail": "upload rejected"}).to_string(),
            });
        }
        let raw = json!({
            "id": format!("file-{name}"),
            "content_type": mime_type,
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
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.prediction_status {
            return Err(ProviderError::Prediction {
                status: Some(status),
                message: format!("rejected with {status}"),
            });
        }
        let prompt = input["prompt"].as_str().unwrap_or("").replace(' ', "-");
        Ok(serde_json::from_value(json!({
            "id": format!("pred-{n}"),
            "status": "succeeded",
            "output": [format!("https://cdn.test/{prompt}.mp4")]
        }))
        .unwrap())
    }

    async fn poll_prediction(&self, id: &str) -> Result<Prediction, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::from_value(json!({"id": id, "status": "processing"})).unwrap())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// A router backed by a running job runner. The runner stops when the
/// `TestApp` is dropped.
pub struct TestApp {
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<InMemoryJobStore>,
    cancel: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the full application router with all middleware layers, mirroring
/// `main.rs`, on top of the given provider double.
pub fn build_test_app(provider: FakeProvider) -> TestApp {
    let config = test_config();
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryJobStore::new());

    let processor = TaskProcessor::new(
        provider.clone() as Arc<dyn GenerationProvider>,
        RetryPolicy::no_retry(),
        PollConfig {
            interval: Duration::from_millis(10),
            max_attempts: 3,
        },
        false,
    );
    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone() as Arc<dyn JobStore>,
        processor,
        Arc::new(FirstOutputMerger),
        true,
    ));
    let (runner, jobs) = JobRunner::new(orchestrator, 2);
    let cancel = CancellationToken::new();
    tokio::spawn(runner.run(cancel.clone()));

    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        provider: provider.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        provider,
        store,
        cancel,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

const BOUNDARY: &str = "clipforge-test-boundary";

/// One part of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// `images` file part with PNG-ish bytes.
pub fn image_part(filename: &str) -> Part<'_> {
    Part::File {
        name: "images",
        filename,
        content_type: "image/png",
        data: b"\x89PNG fake image",
    }
}

pub async fn post_multipart(app: &TestApp, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// Poll `GET /api/v1/jobs/{id}` until the job reports a terminal status.
pub async fn wait_for_job(app: &TestApp, job_id: &str) -> Value {
    for _ in 0..200 {
        let json = body_json(get(app, &format!("/api/v1/jobs/{job_id}")).await).await;
        if json["status"] == "completed" || json["status"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}
