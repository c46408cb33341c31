//! API configuration

use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use core_kernel::Currency;
use domain_claims::fraud::SessionScope;
use domain_claims::ingest::{IngestPolicy, DEFAULT_MAX_BYTES, DEFAULT_MIN_DIMENSION};
use domain_claims::service::IntakeSettings;
use domain_claims::triage::TriageStrategy;
use domain_claims::verification::DEFAULT_THRESHOLD;

/// Most image parts accepted in one claim submission
pub const MAX_IMAGES_PER_REQUEST: usize = 16;

/// API configuration
///
/// Every field has a default, so an empty environment yields a usable
/// development setup.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    #[validate(length(min = 8))]
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    #[validate(range(min = 1))]
    pub database_max_connections: u32,
    /// Log level
    pub log_level: String,
    /// Root directory for stored claim photos
    pub upload_dir: String,
    #[validate(range(min = 1))]
    pub min_image_dimension: u32,
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,
    /// Similarity service base URL; unset means every check is simulated
    pub oracle_url: Option<String>,
    #[validate(range(min = 1))]
    pub oracle_timeout_ms: u64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub verification_threshold: f64,
    pub triage_strategy: TriageStrategy,
    pub fraud_session_scope: SessionScope,
    pub currency: Currency,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/claims".to_string(),
            database_max_connections: 10,
            log_level: "info".to_string(),
            upload_dir: "static/uploads".to_string(),
            min_image_dimension: DEFAULT_MIN_DIMENSION,
            max_upload_bytes: DEFAULT_MAX_BYTES,
            oracle_url: None,
            oracle_timeout_ms: 10_000,
            verification_threshold: DEFAULT_THRESHOLD,
            triage_strategy: TriageStrategy::default(),
            fraud_session_scope: SessionScope::default(),
            currency: Currency::USD,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl ApiConfig {
    /// Loads configuration from `API_`-prefixed environment variables
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config: ApiConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    /// Largest request body accepted by the claim routes
    pub fn max_request_bytes(&self) -> usize {
        self.max_upload_bytes
            .saturating_mul(MAX_IMAGES_PER_REQUEST)
            .saturating_add(64 * 1024)
    }

    /// Pipeline settings derived from this configuration
    pub fn intake_settings(&self) -> IntakeSettings {
        IntakeSettings {
            currency: self.currency,
            triage_strategy: self.triage_strategy,
            session_scope: self.fraud_session_scope,
            ingest: IngestPolicy {
                min_dimension: self.min_image_dimension,
                max_bytes: self.max_upload_bytes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.oracle_timeout(), Duration::from_secs(10));
        assert!(config.oracle_url.is_none());
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let config = ApiConfig {
            verification_threshold: 1.5,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_intake_settings_follow_config() {
        let config = ApiConfig {
            triage_strategy: TriageStrategy::Blended,
            fraud_session_scope: SessionScope::PerClaim,
            min_image_dimension: 80,
            ..ApiConfig::default()
        };
        let settings = config.intake_settings();
        assert_eq!(settings.triage_strategy, TriageStrategy::Blended);
        assert_eq!(settings.session_scope, SessionScope::PerClaim);
        assert_eq!(settings.ingest.min_dimension, 80);
    }

    #[test]
    fn test_enum_settings_deserialize_from_text() {
        let config: ApiConfig = serde_json::from_value(serde_json::json!({
            "triage_strategy": "blended",
            "fraud_session_scope": "per_claim",
            "currency": "EUR",
        }))
        .unwrap();
        assert_eq!(config.triage_strategy, TriageStrategy::Blended);
        assert_eq!(config.currency, Currency::EUR);
        assert_eq!(config.port, 8080);
    }
}
