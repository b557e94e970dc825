//! Integration tests for Quarry.
//!
//! All tests run against the mock query service and in-memory or
//! temporary-directory storage.

pub mod caching_test;
pub mod client_test;
pub mod common;
pub mod lifecycle_test;
