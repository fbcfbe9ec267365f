//! Health check endpoint, served outside the authentication gate.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe. Always 200 while the process is serving.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
