use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx_pg_conn_mgr::{PgDatabase, PgDatabaseConfig};
use tracing::debug;

use crate::Result;
use crate::builders::{DeleteBuilder, FetchBuilder, InsertBuilder, UpdateBuilder};
use crate::compiler::{FetchOptions, SqlStatement, build_select, delete_where_eq};
use crate::decode::{Row, decode_rows};
use crate::source::RowSource;
use crate::value::{SqlValue, bind_value};

/// Query-layer handle over a [`PgDatabase`] pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct DatabaseWrapper {
   inner: Arc<PgDatabase>,
}

impl DatabaseWrapper {
   /// Connect to PostgreSQL via the connection manager.
   pub async fn connect(url: &str, custom_config: Option<PgDatabaseConfig>) -> Result<Self> {
      let db = PgDatabase::connect(url, custom_config).await?;
      Ok(Self { inner: db })
   }

   /// Build a wrapper whose pool connects on first use.
   pub fn connect_lazy(url: &str, custom_config: Option<PgDatabaseConfig>) -> Result<Self> {
      let db = PgDatabase::connect_lazy(url, custom_config)?;
      Ok(Self { inner: db })
   }

   /// Wrap an existing connection manager handle.
   pub fn from_database(db: Arc<PgDatabase>) -> Self {
      Self { inner: db }
   }

   pub fn inner(&self) -> &Arc<PgDatabase> {
      &self.inner
   }

   /// SELECT rows described by `options`.
   pub fn fetch(&self, options: FetchOptions) -> FetchBuilder {
      FetchBuilder::new(self.clone(), options)
   }

   /// INSERT one row, returning it.
   pub fn insert(&self, table: impl Into<String>, data: IndexMap<String, SqlValue>) -> InsertBuilder {
      InsertBuilder::new(self.clone(), table.into(), data)
   }

   /// UPDATE rows matching the builder's filters, returning the first updated row.
   pub fn update(&self, table: impl Into<String>, data: IndexMap<String, SqlValue>) -> UpdateBuilder {
      UpdateBuilder::new(self.clone(), table.into(), data)
   }

   /// DELETE rows matching the builder's filters, returning the first deleted row.
   pub fn delete(&self, table: impl Into<String>) -> DeleteBuilder {
      DeleteBuilder::new(self.clone(), table.into())
   }

   /// DELETE by a single column equality, returning the deleted row.
   pub async fn delete_where_eq(
      &self,
      table: &str,
      column: &str,
      value: impl Into<SqlValue>,
   ) -> Result<Option<Row>> {
      let stmt = delete_where_eq(table, column, value)?;
      let rows = self.run(stmt).await?;
      Ok(rows.into_iter().next())
   }

   /// Run one compiled statement and decode every returned row.
   pub async fn run(&self, stmt: SqlStatement) -> Result<Vec<Row>> {
      let pool = self.inner.pool()?;
      debug!(sql = %stmt.sql, params = stmt.values.len(), "executing statement");

      let mut q = sqlx::query(&stmt.sql);
      for value in stmt.values {
         q = bind_value(q, value);
      }
      let rows = q.fetch_all(pool).await?;
      decode_rows(rows)
   }

   /// Close the underlying pool.
   pub async fn close(&self) -> Result<()> {
      self.inner.close().await?;
      Ok(())
   }
}

#[async_trait]
impl RowSource for DatabaseWrapper {
   async fn fetch_rows(&self, options: &FetchOptions) -> Result<Vec<Row>> {
      self.run(build_select(options)?).await
   }
}
