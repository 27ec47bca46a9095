//! hacCare Database: SurrealDB connection management, schema
//! migrations and repository implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization, migrations and capability detection
//! - Repository implementations of the `haccare-core` traits, including
//!   the transactional [`SurrealChangeSetWriter`](repository::SurrealChangeSetWriter)

mod connection;
mod error;
mod schema;

pub mod repository;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::SurrealRepositories;
pub use schema::{
    LATEST_SCHEMA_VERSION, capabilities_for_version, detect_capabilities, run_migrations,
    run_migrations_to, schema_version,
};
