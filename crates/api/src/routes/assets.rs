use axum::routing::post;
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

/// Routes mounted at `/assets`.
///
/// ```text
/// POST   /                -> upload_asset
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(assets::upload_asset))
}
