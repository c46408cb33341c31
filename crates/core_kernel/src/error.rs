//! Core error types used across the system

use thiserror::Error;
use crate::money::MoneyError;

/// Errors raised by kernel value types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Malformed identifier or value
    #[error("Validation error: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}
