//! Domain Adapters
//!
//! Implementations of the claims domain ports backed by PostgreSQL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresClaimStore;
//! use domain_claims::ClaimStore;
//!
//! let store = PostgresClaimStore::new(pool);
//! let claim = store.get_claim(claim_id).await?;
//! ```

pub mod claims;

pub use claims::PostgresClaimStore;
