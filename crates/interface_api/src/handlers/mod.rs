//! Request handlers

pub mod admin;
pub mod claims;
pub mod health;
pub mod verification;
