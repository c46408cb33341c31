//! Claim Intake API Server Binary
//!
//! Starts the HTTP API server for claim intake, triage and vehicle
//! verification.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin claims-api
//!
//! # Run with environment variables
//! API_PORT=8080 API_DATABASE_URL=postgres://... API_ORACLE_URL=http://localhost:8001 cargo run --bin claims-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Bind address (default: 0.0.0.0:8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DATABASE_MAX_CONNECTIONS` - Pool upper bound (default: 10)
//! * `API_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `API_UPLOAD_DIR` - Root directory for claim photos (default: static/uploads)
//! * `API_ORACLE_URL` - Similarity service; unset means simulated verification
//! * `API_ORACLE_TIMEOUT_MS` - Budget per similarity exchange (default: 10000)
//! * `API_VERIFICATION_THRESHOLD` - Match threshold (default: 0.85)
//! * `API_TRIAGE_STRATEGY` - `gated` or `blended` (default: gated)
//! * `API_FRAUD_SESSION_SCOPE` - `process` or `per_claim` (default: process)
//! * `API_CURRENCY` - Currency of cost estimates (default: USD)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_claims::adapters::{HttpOracleConfig, HttpSimilarityOracle};
use domain_claims::ports::SimilarityOracle;
use domain_claims::service::ClaimIntakeService;
use domain_claims::verification::VehicleVerifier;
use infra_db::{create_pool, run_migrations, DatabaseConfig, LocalBlobStore, PostgresClaimStore};
use interface_api::{config::ApiConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("loading API configuration")?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        triage_strategy = ?config.triage_strategy,
        oracle = config.oracle_url.as_deref().unwrap_or("simulated"),
        "Starting claim intake API server"
    );

    let db_config = DatabaseConfig::new(config.database_url.clone())
        .pool_size(1, config.database_max_connections);
    let pool = create_pool(db_config)
        .await
        .context("connecting to the database")?;
    run_migrations(&pool).await.context("running migrations")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", config.upload_dir))?;

    let verifier = VehicleVerifier::new(
        build_oracle(&config),
        config.verification_threshold,
        config.oracle_timeout(),
    );
    let service = ClaimIntakeService::new(
        Arc::new(PostgresClaimStore::new(pool)),
        Arc::new(LocalBlobStore::new(&config.upload_dir)),
        verifier,
        config.intake_settings(),
    );

    let addr: SocketAddr = config.server_addr().parse()?;
    let app = create_router(Arc::new(service), config);

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` takes precedence over
/// the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// The configured similarity service, or `None` to simulate every check
fn build_oracle(config: &ApiConfig) -> Option<Arc<dyn SimilarityOracle>> {
    let url = config.oracle_url.as_ref()?;
    let oracle_config = HttpOracleConfig {
        timeout: config.oracle_timeout(),
        ..HttpOracleConfig::new(url.clone())
    };
    match HttpSimilarityOracle::new(oracle_config) {
        Ok(oracle) => Some(Arc::new(oracle)),
        Err(e) => {
            tracing::warn!(error = %e, "Similarity oracle unavailable; verification will be simulated");
            None
        }
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
