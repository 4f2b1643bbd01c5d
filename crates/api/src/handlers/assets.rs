//! Direct asset upload to the generation provider.

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/v1/assets
///
/// Accepts a multipart form with a required `file` part and forwards it to
/// the provider. The provider's upload response is returned verbatim so the
/// caller can use its serving URL as a generation input.
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue; // ignore unknown fields
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .map(str::to_owned)
            .ok_or_else(|| AppError::BadRequest("The 'file' part must declare a content type".into()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        file = Some((filename, mime_type, data.to_vec()));
    }

    let (filename, mime_type, data) =
        file.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    let size = data.len();
    let asset = state
        .provider
        .upload_asset(data, &mime_type, &filename)
        .await?;

    tracing::info!(%filename, size, url = %asset.serving_url, "Asset uploaded");
    Ok(Json(asset.raw))
}
