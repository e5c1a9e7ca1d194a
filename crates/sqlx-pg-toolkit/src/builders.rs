//! Query builders for the four table operations

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use indexmap::IndexMap;

use crate::compiler::{
   CompiledFilter, FetchOptions, OrderBy, build_delete, build_insert, build_select, build_update,
};
use crate::decode::Row;
use crate::value::SqlValue;
use crate::wrapper::DatabaseWrapper;
use crate::{Error, Result};

/// Builder for SELECT queries returning multiple rows
pub struct FetchBuilder {
   db: DatabaseWrapper,
   options: FetchOptions,
}

impl FetchBuilder {
   pub(crate) fn new(db: DatabaseWrapper, options: FetchOptions) -> Self {
      Self { db, options }
   }

   /// Add one predicate
   pub fn filter(mut self, filter: CompiledFilter) -> Self {
      self.options.filters.push(filter);
      self
   }

   pub fn order_by(mut self, order_by: OrderBy) -> Self {
      self.options.order_by = Some(order_by);
      self
   }

   pub fn limit(mut self, limit: usize) -> Self {
      self.options.limit = Some(limit);
      self
   }

   pub fn offset(mut self, offset: usize) -> Self {
      self.options.offset = Some(offset);
      self
   }

   /// Execute the query and return all matching rows
   pub async fn execute(self) -> Result<Vec<Row>> {
      let stmt = build_select(&self.options)?;
      self.db.run(stmt).await
   }
}

impl IntoFuture for FetchBuilder {
   type Output = Result<Vec<Row>>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for INSERT ... RETURNING *
pub struct InsertBuilder {
   db: DatabaseWrapper,
   table: String,
   data: IndexMap<String, SqlValue>,
}

impl InsertBuilder {
   pub(crate) fn new(db: DatabaseWrapper, table: String, data: IndexMap<String, SqlValue>) -> Self {
      Self { db, table, data }
   }

   /// Execute the insert and return the inserted row
   pub async fn execute(self) -> Result<Row> {
      let stmt = build_insert(&self.table, self.data)?;
      let rows = self.db.run(stmt).await?;
      rows
         .into_iter()
         .next()
         .ok_or(Error::Sqlx(sqlx::Error::RowNotFound))
   }
}

impl IntoFuture for InsertBuilder {
   type Output = Result<Row>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for UPDATE ... RETURNING *
///
/// At least one filter is required; an unfiltered update is refused.
pub struct UpdateBuilder {
   db: DatabaseWrapper,
   table: String,
   data: IndexMap<String, SqlValue>,
   filters: Vec<CompiledFilter>,
}

impl UpdateBuilder {
   pub(crate) fn new(db: DatabaseWrapper, table: String, data: IndexMap<String, SqlValue>) -> Self {
      Self {
         db,
         table,
         data,
         filters: Vec::new(),
      }
   }

   pub fn filter(mut self, filter: CompiledFilter) -> Self {
      self.filters.push(filter);
      self
   }

   pub fn filters(mut self, filters: impl IntoIterator<Item = CompiledFilter>) -> Self {
      self.filters.extend(filters);
      self
   }

   /// Execute the update and return the first updated row, if any matched
   pub async fn execute(self) -> Result<Option<Row>> {
      let stmt = build_update(&self.table, self.data, &self.filters)?;
      let rows = self.db.run(stmt).await?;
      Ok(rows.into_iter().next())
   }
}

impl IntoFuture for UpdateBuilder {
   type Output = Result<Option<Row>>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}

/// Builder for DELETE ... RETURNING *
///
/// At least one filter is required; an unfiltered delete is refused.
pub struct DeleteBuilder {
   db: DatabaseWrapper,
   table: String,
   filters: Vec<CompiledFilter>,
}

impl DeleteBuilder {
   pub(crate) fn new(db: DatabaseWrapper, table: String) -> Self {
      Self {
         db,
         table,
         filters: Vec::new(),
      }
   }

   pub fn filter(mut self, filter: CompiledFilter) -> Self {
      self.filters.push(filter);
      self
   }

   pub fn filters(mut self, filters: impl IntoIterator<Item = CompiledFilter>) -> Self {
      self.filters.extend(filters);
      self
   }

   /// Execute the delete and return the first deleted row, if any matched
   pub async fn execute(self) -> Result<Option<Row>> {
      let stmt = build_delete(&self.table, &self.filters)?;
      let rows = self.db.run(stmt).await?;
      Ok(rows.into_iter().next())
   }
}

impl IntoFuture for DeleteBuilder {
   type Output = Result<Option<Row>>;
   type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

   fn into_future(self) -> Self::IntoFuture {
      Box::pin(self.execute())
   }
}
