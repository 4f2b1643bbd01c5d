pub mod assets;
pub mod generation;
pub mod health;
pub mod jobs;
pub mod provider;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                              submit batch (POST), list (GET)
/// /jobs/{id}                         status (GET), delete (DELETE)
///
/// /generate/reference-image          one-shot reference image (POST)
///
/// /assets                            upload a file to the provider (POST)
///
/// /provider/status                   credential check (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/generate", generation::router())
        .nest("/assets", assets::router())
        .nest("/provider", provider::router())
}
