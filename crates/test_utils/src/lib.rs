//! Test Utilities Crate
//!
//! Shared test infrastructure for the claim intake test suite.
//!
//! # Modules
//!
//! - `fixtures`: Generated claim photos and fixed claim details
//! - `builders`: Builders for claim details, uploads, and a wired service
//! - `database`: PostgreSQL container management
//! - `assertions`: Assertion helpers for claim invariants
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
