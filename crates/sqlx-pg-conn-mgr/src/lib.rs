//! # sqlx-pg-conn-mgr
//!
//! A minimal wrapper around SQLx that enforces pragmatic PostgreSQL connection
//! policies for dashboard query layers.
//!
//! ## Core Types
//!
//! - **[`PgDatabase`]**: Pooled database handle with close tracking
//! - **[`PgDatabaseConfig`]**: Pool sizing and timeout settings
//! - **[`Error`]**: Error type for database operations
//!
//! ## Policies
//!
//! - **Bounded pool**: callers wait at most `acquire_timeout` for a connection
//! - **Statement timeout**: every connection runs `SET statement_timeout` on connect,
//!   which bounds each individual page fetch of a long export

mod config;
mod database;
mod error;

// Re-export public types
pub use config::PgDatabaseConfig;
pub use database::PgDatabase;
pub use error::{Error, Result};
