//! Configuration for PostgreSQL connection pools

use std::time::Duration;

use serde::Deserialize;

/// Configuration for PgDatabase connection pools
///
/// # Examples
///
/// ```
/// use sqlx_pg_conn_mgr::PgDatabaseConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = PgDatabaseConfig::default();
///
/// // Override just one field
/// let config = PgDatabaseConfig {
///     max_connections: 4,
///     ..Default::default()
/// };
/// assert_eq!(config.acquire_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PgDatabaseConfig {
   /// Maximum number of pooled connections
   ///
   /// Default: 10
   pub max_connections: u32,

   /// Connections kept open even when idle
   ///
   /// Default: 0
   pub min_connections: u32,

   /// How long a caller waits for a free connection before failing
   ///
   /// Default: 5 seconds
   #[serde(with = "duration_secs")]
   pub acquire_timeout: Duration,

   /// Idle timeout for pooled connections
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 30 seconds
   #[serde(with = "duration_secs")]
   pub idle_timeout: Duration,

   /// Server-side `statement_timeout` applied to every new connection
   ///
   /// Bounds each database call so a runaway page fetch cannot hold a
   /// connection forever. `None` leaves the server default untouched.
   ///
   /// Default: 30 seconds
   #[serde(with = "option_duration_secs")]
   pub statement_timeout: Option<Duration>,
}

impl Default for PgDatabaseConfig {
   fn default() -> Self {
      Self {
         max_connections: 10,
         min_connections: 0,
         acquire_timeout: Duration::from_secs(5),
         idle_timeout: Duration::from_secs(30),
         statement_timeout: Some(Duration::from_secs(30)),
      }
   }
}

impl PgDatabaseConfig {
   /// The `SET statement_timeout` command for new connections, if configured.
   pub(crate) fn statement_timeout_sql(&self) -> Option<String> {
      self
         .statement_timeout
         .map(|timeout| format!("SET statement_timeout = {}", timeout.as_millis()))
   }
}

mod duration_secs {
   use std::time::Duration;

   use serde::{Deserialize, Deserializer};

   pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
      Ok(Duration::from_secs(u64::deserialize(deserializer)?))
   }
}

mod option_duration_secs {
   use std::time::Duration;

   use serde::{Deserialize, Deserializer};

   pub fn deserialize<'de, D: Deserializer<'de>>(
      deserializer: D,
   ) -> Result<Option<Duration>, D::Error> {
      Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
   }
}
