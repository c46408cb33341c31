//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use core_kernel::{AdapterHealth, HealthCheckResult};

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub adapters: Vec<HealthCheckResult>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check over the claim store and the similarity oracle
///
/// Only an unhealthy claim store makes the service unready; an unreachable
/// oracle degrades to simulated verification.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let adapters = state.service.health().await;

    let store_down = adapters
        .first()
        .map_or(true, |store| !store.is_operational());
    let all_healthy = adapters.iter().all(|a| a.status == AdapterHealth::Healthy);

    let (code, status) = if store_down {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else if all_healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::OK, "degraded")
    };

    (
        code,
        Json(ReadinessResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            adapters,
        }),
    )
}
