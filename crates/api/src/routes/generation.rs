use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at `/generate`.
///
/// ```text
/// POST   /reference-image -> generate_reference_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/reference-image",
        post(generation::generate_reference_image),
    )
}
