//! PostgreSQL database with a bounded connection pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::debug;

use crate::{Error, PgDatabaseConfig, Result};

/// PostgreSQL database with connection pooling.
///
/// ## State Management
///
/// - **`pool`**: Bounded pool shared by every query issued through this handle
/// - **`closed`**: Prevents use after the database has been closed
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect to database (eagerly, or lazily for deferred first use)
/// 2. Access pool() for each statement
/// 3. Close database when done
/// ```
#[derive(Debug)]
pub struct PgDatabase {
   /// Connection pool; every new connection gets the configured statement timeout
   pool: PgPool,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,
}

impl PgDatabase {
   /// Connect to a PostgreSQL database, establishing at least one connection.
   pub async fn connect(url: &str, config: Option<PgDatabaseConfig>) -> Result<Arc<Self>> {
      let config = config.unwrap_or_default();
      let options: PgConnectOptions = url.parse()?;

      debug!(
         max_connections = config.max_connections,
         "connecting to postgres"
      );

      let pool = pool_options(&config).connect_with(options).await?;
      Ok(Arc::new(Self {
         pool,
         closed: AtomicBool::new(false),
      }))
   }

   /// Create the pool without opening any connection.
   ///
   /// The first statement establishes the first connection, so an unreachable
   /// server surfaces as an error on that statement rather than here.
   pub fn connect_lazy(url: &str, config: Option<PgDatabaseConfig>) -> Result<Arc<Self>> {
      let config = config.unwrap_or_default();
      let options: PgConnectOptions = url.parse()?;

      let pool = pool_options(&config).connect_lazy_with(options);
      Ok(Arc::new(Self {
         pool,
         closed: AtomicBool::new(false),
      }))
   }

   /// Get the connection pool.
   pub fn pool(&self) -> Result<&PgPool> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.pool)
   }

   /// Whether close() has been called on this handle.
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Close all pooled connections.
   ///
   /// Closing twice is a no-op.
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }
      self.pool.close().await;
      debug!("postgres pool closed");
      Ok(())
   }
}

fn pool_options(config: &PgDatabaseConfig) -> PgPoolOptions {
   let statement_timeout = config.statement_timeout_sql();

   PgPoolOptions::new()
      .max_connections(config.max_connections)
      .min_connections(config.min_connections)
      .acquire_timeout(config.acquire_timeout)
      .idle_timeout(config.idle_timeout)
      .after_connect(move |conn, _meta| {
         let statement_timeout = statement_timeout.clone();
         Box::pin(async move {
            if let Some(sql) = statement_timeout {
               conn.execute(sql.as_str()).await?;
            }
            Ok(())
         })
      })
}
