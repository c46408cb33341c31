//! Core Kernel - Foundational types for the claim triage system
//!
//! This crate provides the building blocks shared by every other crate:
//! - Money types with precise decimal arithmetic for repair cost estimates
//! - Strongly-typed identifiers for claims, images and users
//! - Port abstractions (errors, health checks, circuit breaker settings)
//!   used by storage and oracle adapters

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use identifiers::{ClaimId, ImageId, UserId, AuditEntryId};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
    CircuitBreakerConfig,
};
