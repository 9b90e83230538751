use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the current health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.backends().session_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "session store health check failed");
            }
        }
        None => warn!("session store unavailable (degraded mode)"),
    }

    if state.backends().is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
