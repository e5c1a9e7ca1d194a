//! Error types for sqlx-pg-conn-mgr

use thiserror::Error;

/// Errors that may occur when working with sqlx-pg-conn-mgr
#[derive(Error, Debug)]
pub enum Error {
   /// Error from the sqlx library, including malformed connection URLs.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
