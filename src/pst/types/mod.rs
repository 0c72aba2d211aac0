//! Foundational data structures, error types, and property definitions.

pub mod error;
pub mod kinds;
pub mod models;
pub mod properties;
