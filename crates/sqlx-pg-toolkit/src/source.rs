//! The seam between the paging engines and whatever executes a fetch.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::compiler::FetchOptions;
use crate::decode::Row;

/// Something that can return the rows for one [`FetchOptions`].
///
/// [`DatabaseWrapper`](crate::DatabaseWrapper) implements this by compiling
/// and running a SELECT; the pagination and export engines only ever see this
/// trait.
#[async_trait]
pub trait RowSource: Send + Sync {
   async fn fetch_rows(&self, options: &FetchOptions) -> Result<Vec<Row>>;
}

#[async_trait]
impl<T: RowSource + ?Sized> RowSource for Arc<T> {
   async fn fetch_rows(&self, options: &FetchOptions) -> Result<Vec<Row>> {
      (**self).fetch_rows(options).await
   }
}

#[async_trait]
impl<T: RowSource + ?Sized> RowSource for &T {
   async fn fetch_rows(&self, options: &FetchOptions) -> Result<Vec<Row>> {
      (**self).fetch_rows(options).await
   }
}
