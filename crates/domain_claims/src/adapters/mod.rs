//! Adapters for external systems used by the claims domain

pub mod http_oracle;

pub use http_oracle::{HttpOracleConfig, HttpSimilarityOracle};
