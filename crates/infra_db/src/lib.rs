//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for claims using SQLx, and local filesystem
//! storage for claim photos.
//!
//! # Architecture
//!
//! Repositories own the SQL and work with row types. Adapters implement the
//! claims domain ports on top of them and translate rows to domain models.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresClaimStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/claims")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresClaimStore::new(pool);
//! ```

pub mod adapters;
pub mod blob;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::PostgresClaimStore;
pub use blob::LocalBlobStore;
pub use error::DatabaseError;
pub use pool::{create_pool, ping, run_migrations, DatabaseConfig, DatabasePool};
