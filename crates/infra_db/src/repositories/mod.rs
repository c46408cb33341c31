//! Repository implementations
//!
//! Repositories encapsulate SQL queries and map between database rows and
//! row types. Multi-table writes run in one transaction.

pub mod claims;

pub use claims::ClaimsRepository;
