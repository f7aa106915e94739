//! Database layer
//!
//! Storage abstraction for the Confmate backend. Two backends are supported:
//! - SQLite (default; also used as the in-memory test backend)
//! - MySQL (production deployments)
//!
//! The driver is selected from configuration. All access from the rest of
//! the crate goes through the repository traits in [`repositories`]; this
//! subsystem treats each repository call as an atomic transaction.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool};
