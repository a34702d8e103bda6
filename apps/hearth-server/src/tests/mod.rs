//! Server unit and integration tests.
//!
//! - `common` - Shared test helpers
//! - `handlers` - HTTP handler tests, calling handlers directly
//! - `store_backend` - Storage backend dispatch tests
//! - `serve` - Full listener startup and shutdown over TCP

pub mod common;

mod handlers;
mod store_backend;
