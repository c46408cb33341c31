//! Claims domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError};

/// Errors that can occur in the claims domain
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Invalid image {filename}: {reason}")]
    InvalidImage { filename: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Similarity oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("No images available for claim {0}")]
    NoImages(String),

    #[error("Invalid angle '{0}', expected one of front, back, left, right")]
    InvalidAngle(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ClaimError {
    pub fn invalid_image(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        ClaimError::InvalidImage {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    pub fn claim_not_found(id: impl std::fmt::Display) -> Self {
        ClaimError::NotFound {
            entity: "Claim".to_string(),
            id: id.to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ClaimError::StorageFailure(message.into())
    }
}

impl From<PortError> for ClaimError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => ClaimError::NotFound {
                entity: entity_type,
                id,
            },
            other => ClaimError::StorageFailure(other.to_string()),
        }
    }
}

impl From<MoneyError> for ClaimError {
    fn from(err: MoneyError) -> Self {
        ClaimError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_not_found_maps_to_not_found() {
        let err: ClaimError = PortError::not_found("Claim", "CLM-1").into();
        assert!(matches!(err, ClaimError::NotFound { .. }));
    }

    #[test]
    fn test_other_port_errors_map_to_storage_failure() {
        let err: ClaimError = PortError::connection("pool exhausted").into();
        assert!(matches!(err, ClaimError::StorageFailure(_)));
    }
}
