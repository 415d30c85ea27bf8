//! Health check handlers.

use axum::extract::State;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// # Errors
///
/// Returns [`AppError::Unavailable`] (503) if storage is not reachable.
pub async fn readiness(State(state): State<AppState>) -> Result<&'static str> {
    state.store().ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::Unavailable("storage unreachable".to_string())
    })?;
    Ok("ready")
}
