use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clipforge_pipeline::{InMemoryJobStore, JobOrchestrator, JobRunner, JobStore, PipelineConfig};
use clipforge_provider::{GenerationProvider, ProviderConfig, ReplicateApi};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge_api::background::job_retention;
use clipforge_api::config::ServerConfig;
use clipforge_api::router::build_app_router;
use clipforge_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(
        workers = pipeline_config.workers,
        retry_attempts = pipeline_config.retry.max_attempts,
        poll_interval_secs = pipeline_config.poll.interval.as_secs(),
        max_poll_attempts = pipeline_config.poll.max_attempts,
        "Loaded pipeline configuration"
    );

    // --- Provider ---
    let provider_config = ProviderConfig::from_env();
    let provider: Arc<dyn GenerationProvider> = Arc::new(ReplicateApi::new(&provider_config));
    match provider.check_credential() {
        Ok(()) => tracing::info!(api_url = %provider_config.api_url, "Generation provider configured"),
        Err(e) => tracing::warn!(error = %e, "Generation provider is not usable; job submission will fail"),
    }

    // --- Job pipeline ---
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let orchestrator = Arc::new(JobOrchestrator::from_config(
        Arc::clone(&store),
        Arc::clone(&provider),
        &pipeline_config,
    ));
    let (runner, jobs) = JobRunner::new(orchestrator, pipeline_config.workers);
    let runner = runner.with_drain_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    let cancel = CancellationToken::new();
    let runner_handle = tokio::spawn(runner.run(cancel.clone()));
    let retention_handle = tokio::spawn(job_retention::run(
        Arc::clone(&store),
        pipeline_config.retention_hours,
        job_retention::SWEEP_INTERVAL,
        cancel.clone(),
    ));
    tracing::info!("Background services started (job runner, job retention)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        provider,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    // The runner applies its own drain timeout; allow a little extra for
    // failing the jobs it had to abort.
    let runner_grace = Duration::from_secs(config.shutdown_timeout_secs + 5);
    if tokio::time::timeout(runner_grace, runner_handle).await.is_err() {
        tracing::warn!("Job runner did not stop in time");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Background services stopped");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "clipforge_api=debug,clipforge_pipeline=debug,clipforge_provider=info,tower_http=debug"
            .into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
