use std::time::Duration;

use axum::{Json, extract::State, http::StatusCode};
use tracing::error;

use triton_types::api::HealthStatus;

use crate::state::AppState;

const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Liveness of the store. Reports 503 instead of taking the process down.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let failure = match tokio::time::timeout(PING_TIMEOUT, state.db.ping()).await {
        Ok(Ok(())) => {
            return (
                StatusCode::OK,
                Json(HealthStatus {
                    status: "up".into(),
                    message: Some("It's healthy".into()),
                    error: None,
                }),
            );
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => "ping timed out".to_string(),
    };

    error!("Health check failed: {}", failure);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthStatus {
            status: "down".into(),
            message: None,
            error: Some(format!("db down: {failure}")),
        }),
    )
}
