use std::sync::Arc;

use sqlx_pg_toolkit::{Catalog, DatabaseWrapper};
use tracing::info;

use crate::Result;
use crate::catalog;
use crate::config::QueryLayerConfig;

/// Dashboard query surface: a pooled database, the table allow-list and limits.
///
/// Cheap to clone; clones share the pool and the catalog.
#[derive(Clone)]
pub struct QueryLayer {
   pub(crate) db: DatabaseWrapper,
   pub(crate) catalog: Arc<Catalog>,
   pub(crate) config: QueryLayerConfig,
}

impl QueryLayer {
   /// Connect using `config` and the call-dashboard catalog.
   pub async fn connect(config: QueryLayerConfig) -> Result<Self> {
      let db = DatabaseWrapper::connect(&config.database_url, Some(config.pool.clone())).await?;
      info!(max_connections = config.pool.max_connections, "query layer connected");
      Ok(Self::from_parts(db, config))
   }

   /// Like [`connect`](Self::connect), deferring the first connection until a query runs.
   pub fn connect_lazy(config: QueryLayerConfig) -> Result<Self> {
      let db = DatabaseWrapper::connect_lazy(&config.database_url, Some(config.pool.clone()))?;
      Ok(Self::from_parts(db, config))
   }

   /// Wrap an existing database handle.
   pub fn from_parts(db: DatabaseWrapper, config: QueryLayerConfig) -> Self {
      Self {
         db,
         catalog: Arc::new(catalog::call_dashboard()),
         config,
      }
   }

   /// Replace the table allow-list.
   pub fn with_catalog(mut self, catalog: Catalog) -> Self {
      self.catalog = Arc::new(catalog);
      self
   }

   pub fn catalog(&self) -> &Catalog {
      &self.catalog
   }

   pub fn database(&self) -> &DatabaseWrapper {
      &self.db
   }

   pub fn config(&self) -> &QueryLayerConfig {
      &self.config
   }

   /// Close the pool. Later operations fail with a connection error.
   pub async fn close(&self) -> Result<()> {
      self.db.close().await?;
      Ok(())
   }
}
