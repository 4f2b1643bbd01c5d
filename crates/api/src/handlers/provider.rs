//! Provider credential diagnostics.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    /// A credential is configured and well-formed.
    pub configured: bool,
    /// The provider accepted the credential.
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/v1/provider/status
///
/// Always 200; problems are reported in the body. The provider is only
/// contacted when a credential is configured.
pub async fn provider_status(State(state): State<AppState>) -> Json<ProviderStatus> {
    if let Err(e) = state.provider.check_credential() {
        return Json(ProviderStatus {
            configured: false,
            verified: false,
            error: Some(e.to_string()),
        });
    }

    let status = match state.provider.verify_credential().await {
        Ok(()) => ProviderStatus {
            configured: true,
            verified: true,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Provider credential verification failed");
            ProviderStatus {
                configured: true,
                verified: false,
                error: Some(e.to_string()),
            }
        }
    };
    Json(status)
}
