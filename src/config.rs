//! Configuration for the dashboard query layer

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx_pg_toolkit::{ExportConfig, PgDatabaseConfig};

use crate::{Error, Result};

/// Settings for a [`QueryLayer`](crate::QueryLayer).
///
/// # Examples
///
/// ```
/// use call_analytics_query::QueryLayerConfig;
///
/// let config = QueryLayerConfig {
///     page_size: 25,
///     ..Default::default()
/// };
/// assert_eq!(config.export_chunk_size, 1000);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryLayerConfig {
   /// PostgreSQL connection URL
   pub database_url: String,

   /// Pool sizing and timeouts
   pub pool: PgDatabaseConfig,

   /// Rows per load-more page
   ///
   /// Default: 50
   pub page_size: usize,

   /// Largest explicit `limit` a plain fetch accepts
   ///
   /// Default: 1000
   pub max_fetch_limit: usize,

   /// Rows per export page
   ///
   /// Default: 1000
   pub export_chunk_size: usize,

   /// Pages one export may request
   ///
   /// Default: 1000
   pub export_max_pages: usize,

   /// Deadline for each export page, in seconds; `None` waits indefinitely
   ///
   /// Default: 60
   pub export_fetch_timeout_secs: Option<u64>,
}

impl Default for QueryLayerConfig {
   fn default() -> Self {
      Self {
         database_url: "postgres://localhost:5432/call_analytics".to_string(),
         pool: PgDatabaseConfig::default(),
         page_size: 50,
         max_fetch_limit: 1000,
         export_chunk_size: sqlx_pg_toolkit::DEFAULT_CHUNK_SIZE,
         export_max_pages: 1000,
         export_fetch_timeout_secs: Some(60),
      }
   }
}

impl QueryLayerConfig {
   /// Defaults overridden by `CALL_ANALYTICS_*` environment variables.
   ///
   /// | Variable | Field |
   /// |---|---|
   /// | `CALL_ANALYTICS_DATABASE_URL` | `database_url` |
   /// | `CALL_ANALYTICS_MAX_CONNECTIONS` | `pool.max_connections` |
   /// | `CALL_ANALYTICS_STATEMENT_TIMEOUT_SECS` | `pool.statement_timeout` (`0` disables) |
   /// | `CALL_ANALYTICS_PAGE_SIZE` | `page_size` |
   /// | `CALL_ANALYTICS_EXPORT_CHUNK_SIZE` | `export_chunk_size` |
   /// | `CALL_ANALYTICS_EXPORT_MAX_PAGES` | `export_max_pages` |
   /// | `CALL_ANALYTICS_EXPORT_TIMEOUT_SECS` | `export_fetch_timeout_secs` (`0` disables) |
   pub fn from_env() -> Result<Self> {
      Self::from_lookup(|var| std::env::var(var).ok())
   }

   /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
   pub fn from_lookup<F>(lookup: F) -> Result<Self>
   where
      F: Fn(&str) -> Option<String>,
   {
      let mut config = Self::default();

      if let Some(url) = lookup("CALL_ANALYTICS_DATABASE_URL") {
         config.database_url = url;
      }
      if let Some(max) = parse_var(&lookup, "CALL_ANALYTICS_MAX_CONNECTIONS")? {
         config.pool.max_connections = max;
      }
      if let Some(secs) = parse_var::<u64, _>(&lookup, "CALL_ANALYTICS_STATEMENT_TIMEOUT_SECS")? {
         config.pool.statement_timeout = (secs > 0).then(|| Duration::from_secs(secs));
      }
      if let Some(size) = parse_var(&lookup, "CALL_ANALYTICS_PAGE_SIZE")? {
         config.page_size = size;
      }
      if let Some(size) = parse_var(&lookup, "CALL_ANALYTICS_EXPORT_CHUNK_SIZE")? {
         config.export_chunk_size = size;
      }
      if let Some(pages) = parse_var(&lookup, "CALL_ANALYTICS_EXPORT_MAX_PAGES")? {
         config.export_max_pages = pages;
      }
      if let Some(secs) = parse_var::<u64, _>(&lookup, "CALL_ANALYTICS_EXPORT_TIMEOUT_SECS")? {
         config.export_fetch_timeout_secs = (secs > 0).then_some(secs);
      }

      Ok(config)
   }

   /// Export limits derived from this configuration.
   pub fn export_config(&self) -> ExportConfig {
      ExportConfig {
         chunk_size: self.export_chunk_size,
         max_pages: self.export_max_pages,
         fetch_timeout: self.export_fetch_timeout_secs.map(Duration::from_secs),
      }
   }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>>
where
   T: FromStr,
   T::Err: Display,
   F: Fn(&str) -> Option<String>,
{
   let Some(raw) = lookup(var) else {
      return Ok(None);
   };
   match raw.trim().parse::<T>() {
      Ok(parsed) => Ok(Some(parsed)),
      Err(e) => Err(Error::InvalidConfig {
         var,
         reason: e.to_string(),
         value: raw,
      }),
   }
}

#[cfg(test)]
mod tests {
   use std::collections::HashMap;

   use super::*;

   fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
      let vars: HashMap<String, String> = vars
         .iter()
         .map(|(k, v)| (k.to_string(), v.to_string()))
         .collect();
      move |var| vars.get(var).cloned()
   }

   #[test]
   fn no_variables_gives_defaults() {
      let config = QueryLayerConfig::from_lookup(|_| None).unwrap();
      assert_eq!(config.page_size, 50);
      assert_eq!(config.max_fetch_limit, 1000);
      assert_eq!(config.export_config(), ExportConfig::default());
   }

   #[test]
   fn variables_override_defaults() {
      let config = QueryLayerConfig::from_lookup(lookup(&[
         ("CALL_ANALYTICS_DATABASE_URL", "postgres://db/calls"),
         ("CALL_ANALYTICS_MAX_CONNECTIONS", "4"),
         ("CALL_ANALYTICS_STATEMENT_TIMEOUT_SECS", "0"),
         ("CALL_ANALYTICS_PAGE_SIZE", " 20 "),
         ("CALL_ANALYTICS_EXPORT_CHUNK_SIZE", "500"),
         ("CALL_ANALYTICS_EXPORT_MAX_PAGES", "10"),
         ("CALL_ANALYTICS_EXPORT_TIMEOUT_SECS", "5"),
      ]))
      .unwrap();

      assert_eq!(config.database_url, "postgres://db/calls");
      assert_eq!(config.pool.max_connections, 4);
      assert_eq!(config.pool.statement_timeout, None);
      assert_eq!(config.page_size, 20);

      let export = config.export_config();
      assert_eq!(export.chunk_size, 500);
      assert_eq!(export.max_pages, 10);
      assert_eq!(export.fetch_timeout, Some(Duration::from_secs(5)));
   }

   #[test]
   fn zero_export_timeout_disables_it() {
      let config =
         QueryLayerConfig::from_lookup(lookup(&[("CALL_ANALYTICS_EXPORT_TIMEOUT_SECS", "0")]))
            .unwrap();
      assert_eq!(config.export_config().fetch_timeout, None);
   }

   #[test]
   fn unparsable_value_is_reported() {
      let err = QueryLayerConfig::from_lookup(lookup(&[("CALL_ANALYTICS_PAGE_SIZE", "lots")]))
         .unwrap_err();

      match err {
         Error::InvalidConfig { var, value, .. } => {
            assert_eq!(var, "CALL_ANALYTICS_PAGE_SIZE");
            assert_eq!(value, "lots");
         }
         other => panic!("unexpected error: {other:?}"),
      }
   }

   #[test]
   fn deserializes_partial_json() {
      let config: QueryLayerConfig = serde_json::from_value(serde_json::json!({
         "page_size": 10,
         "pool": { "max_connections": 2 }
      }))
      .unwrap();

      assert_eq!(config.page_size, 10);
      assert_eq!(config.pool.max_connections, 2);
      assert_eq!(config.export_chunk_size, 1000);
   }
}
