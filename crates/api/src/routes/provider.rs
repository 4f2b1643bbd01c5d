use axum::routing::get;
use axum::Router;

use crate::handlers::provider;
use crate::state::AppState;

/// Routes mounted at `/provider`.
///
/// ```text
/// GET    /status          -> provider_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(provider::provider_status))
}
