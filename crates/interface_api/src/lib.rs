//! HTTP API Layer
//!
//! REST API for claim intake, triage and vehicle verification using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for claims, verification and admin routes
//! - **Middleware**: JWT authentication and audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `ClaimError` mapped to consistent JSON error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(Arc::new(service), config);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_claims::service::ClaimIntakeService;

use crate::config::ApiConfig;
use crate::handlers::{admin, claims, health, verification};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClaimIntakeService>,
    pub config: Arc<ApiConfig>,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `service` - Claim intake service wired to its adapters
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(service: Arc<ClaimIntakeService>, config: ApiConfig) -> Router {
    let body_limit = config.max_request_bytes();
    let state = AppState {
        service,
        config: Arc::new(config),
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let claims_routes = Router::new()
        .route("/", post(claims::create_claim).get(claims::list_claims))
        .route("/:id", get(claims::get_claim).delete(claims::delete_claim))
        .route("/:id/scores", get(claims::get_scores))
        .route("/:id/status", put(claims::update_status));

    let verification_routes = Router::new()
        .route("/:claim_id/upload", post(verification::upload_image))
        .route("/:claim_id/status", get(verification::verification_status))
        .route("/:claim_id/submit", post(verification::submit_verification));

    let admin_routes = Router::new().route("/stats", get(admin::stats));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/claims", claims_routes)
        .nest("/car-verification", verification_routes)
        .nest("/admin", admin_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
