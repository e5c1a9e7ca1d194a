//! Dashboard operations. Every operation answers with a [`QueryResponse`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx_pg_toolkit::{
   self as toolkit, CancellationToken, ColumnExpr, ColumnKind, CompiledFilter, DatabaseWrapper,
   ExportRow, FetchOptions, FilterOperator, FilterRule, FlattenSpec, JsonFields,
   OffsetPaginator, OrderBy, QueryResponse, Row, Scope, TableSchema, coerce_json, export_all,
   translate,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::Result;
use crate::catalog::CALL_LOGS;
use crate::wrapper::QueryLayer;

/// `{column, operator, value}` predicate as sent by route handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTriple {
   pub column: String,
   /// One of `eq`, `neq`, `gt`, `gte`, `lt`, `lte`, `like`, `ilike`
   pub operator: String,
   #[serde(default)]
   pub value: JsonValue,
}

impl FilterTriple {
   pub fn new(
      column: impl Into<String>,
      operator: impl Into<String>,
      value: impl Into<JsonValue>,
   ) -> Self {
      Self {
         column: column.into(),
         operator: operator.into(),
         value: value.into(),
      }
   }
}

/// Arguments of [`QueryLayer::fetch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
   pub table: String,
   #[serde(default = "select_all")]
   pub select: String,
   #[serde(default)]
   pub filters: Vec<FilterTriple>,
   #[serde(default)]
   pub order_by: Option<OrderBy>,
   #[serde(default)]
   pub limit: Option<usize>,
   #[serde(default)]
   pub offset: Option<usize>,
}

fn select_all() -> String {
   "*".to_string()
}

impl FetchRequest {
   pub fn new(table: impl Into<String>) -> Self {
      Self {
         table: table.into(),
         select: select_all(),
         filters: Vec::new(),
         order_by: None,
         limit: None,
         offset: None,
      }
   }
}

/// Flattened call logs: column names plus one uniform map per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogExport {
   pub header: Vec<String>,
   pub rows: Vec<ExportRow>,
}

/// Stored call-log columns emitted as-is by the export.
const EXPORT_COLUMNS: &[&str] = &[
   "id",
   "call_started_at",
   "call_ended_at",
   "duration_seconds",
   "from_number",
   "to_number",
   "direction",
   "status",
   "ended_reason",
   "cost_transport",
   "cost_llm",
   "cost_tts",
   "recording_url",
];

const COST_PARTS: &[&str] = &["cost_transport", "cost_llm", "cost_tts"];

impl QueryLayer {
   /// SELECT with `{column, operator, value}` filters.
   ///
   /// Without a `limit` every matching row is returned. A `limit` above
   /// `max_fetch_limit` fails with `LIMIT_TOO_LARGE` instead of truncating.
   pub async fn fetch(&self, request: FetchRequest) -> QueryResponse<Vec<Row>> {
      respond("fetch", self.try_fetch(request).await)
   }

   /// INSERT one row, answering with the stored row.
   pub async fn insert(
      &self,
      table: &str,
      data: IndexMap<String, JsonValue>,
   ) -> QueryResponse<Row> {
      respond("insert", self.try_insert(table, data).await)
   }

   /// UPDATE rows matching `filters`, answering with the first updated row.
   ///
   /// `data: null` with no error means nothing matched.
   pub async fn update(
      &self,
      table: &str,
      data: IndexMap<String, JsonValue>,
      filters: Vec<FilterTriple>,
   ) -> QueryResponse<Row> {
      respond_optional("update", self.try_update(table, data, filters).await)
   }

   /// DELETE rows matching `filters`, answering with the first deleted row.
   pub async fn delete(&self, table: &str, filters: Vec<FilterTriple>) -> QueryResponse<Row> {
      respond_optional("delete", self.try_delete(table, filters).await)
   }

   /// DELETE by one column equality, e.g. a primary key.
   pub async fn delete_where_eq(
      &self,
      table: &str,
      column: &str,
      value: JsonValue,
   ) -> QueryResponse<Row> {
      let result = self.try_delete_where_eq(table, column, value).await;
      respond_optional("delete_where_eq", result)
   }

   /// Fetch options for `table` restricted by `scope` and the translated `rules`.
   ///
   /// Rules that do not compile are dropped with a warning; an unusable scope
   /// is an error.
   pub fn scoped_options(
      &self,
      table: &str,
      scope: &Scope,
      rules: &[FilterRule],
   ) -> Result<FetchOptions> {
      let schema = self.catalog.table(table)?;
      let filters = translate(schema, scope, rules)?;
      Ok(FetchOptions::new(table, select_all()).filters(filters))
   }

   /// Scoped fetch with declarative rules, returning every matching row.
   ///
   /// Use [`QueryLayer::paginator`] for bounded pages.
   pub async fn fetch_filtered(
      &self,
      table: &str,
      scope: &Scope,
      rules: &[FilterRule],
      order_by: Option<OrderBy>,
   ) -> QueryResponse<Vec<Row>> {
      let result = self.try_fetch_filtered(table, scope, rules, order_by).await;
      respond("fetch_filtered", result)
   }

   /// Load-more paginator over `table`, de-duplicating on its primary key.
   pub fn paginator(&self, table: &str) -> Result<OffsetPaginator<DatabaseWrapper>> {
      let schema = self.catalog.table(table)?;
      let pager =
         OffsetPaginator::new(self.db.clone(), schema.primary_key(), self.config.page_size)?;
      Ok(pager)
   }

   /// Every call of `agent_id` matching `rules`, newest first, flattened for download.
   ///
   /// Adds `cost_total` and one column per `metadata` / `metrics` key seen in
   /// the result. A failed or cancelled export answers with an error and no rows.
   pub async fn export_call_logs(
      &self,
      agent_id: Uuid,
      rules: &[FilterRule],
      cancel: &CancellationToken,
   ) -> QueryResponse<CallLogExport> {
      let result = self.try_export_call_logs(agent_id, rules, cancel).await;
      respond("export_call_logs", result)
   }

   async fn try_fetch(&self, request: FetchRequest) -> toolkit::Result<Vec<Row>> {
      let options = self.fetch_options(request)?;
      self.db.fetch(options).await
   }

   fn fetch_options(&self, request: FetchRequest) -> toolkit::Result<FetchOptions> {
      let schema = self.catalog.table(&request.table)?;
      schema.check_select(&request.select)?;

      let mut options = FetchOptions::new(request.table.as_str(), request.select.as_str())
         .filters(compile_triples(schema, request.filters)?);
      if let Some(limit) = request.limit {
         let max = self.config.max_fetch_limit;
         if limit > max {
            return Err(toolkit::Error::LimitTooLarge {
               requested: limit,
               max,
            });
         }
         options = options.limit(limit);
      }
      if let Some(order_by) = request.order_by {
         schema.check_column(&order_by.column)?;
         options = options.order_by(order_by);
      }
      if let Some(offset) = request.offset {
         options = options.offset(offset);
      }
      Ok(options)
   }

   async fn try_insert(
      &self,
      table: &str,
      data: IndexMap<String, JsonValue>,
   ) -> toolkit::Result<Row> {
      let schema = self.catalog.table(table)?;
      let data = schema.coerce_record(data)?;
      self.db.insert(table, data).await
   }

   async fn try_update(
      &self,
      table: &str,
      data: IndexMap<String, JsonValue>,
      filters: Vec<FilterTriple>,
   ) -> toolkit::Result<Option<Row>> {
      let schema = self.catalog.table(table)?;
      let data = schema.coerce_record(data)?;
      let filters = compile_triples(schema, filters)?;
      self.db.update(table, data).filters(filters).await
   }

   async fn try_delete(
      &self,
      table: &str,
      filters: Vec<FilterTriple>,
   ) -> toolkit::Result<Option<Row>> {
      let schema = self.catalog.table(table)?;
      let filters = compile_triples(schema, filters)?;
      self.db.delete(table).filters(filters).await
   }
   async fn try_delete_where_eq(
      &self,
      table: &str,
      column: &str,
      value: JsonValue,
   ) -> toolkit::Result<Option<Row>> {
      let schema = self.catalog.table(table)?;
      let value = schema.coerce(column, value)?;
      self.db.delete_where_eq(table, column, value).await
   }

   async fn try_fetch_filtered(
      &self,
      table: &str,
      scope: &Scope,
      rules: &[FilterRule],
      order_by: Option<OrderBy>,
   ) -> toolkit::Result<Vec<Row>> {
      let schema = self.catalog.table(table)?;
      let mut options =
         FetchOptions::new(table, select_all()).filters(translate(schema, scope, rules)?);
      if let Some(order_by) = order_by {
         schema.check_column(&order_by.column)?;
         options = options.order_by(order_by);
      }
      self.db.fetch(options).await
   }

   async fn try_export_call_logs(
      &self,
      agent_id: Uuid,
      rules: &[FilterRule],
      cancel: &CancellationToken,
   ) -> toolkit::Result<CallLogExport> {
      let schema = self.catalog.table(CALL_LOGS)?;
      let scope = Scope::new("agent_id", agent_id);

      let mut select: Vec<&str> = EXPORT_COLUMNS.to_vec();
      select.extend(["metadata", "metrics"]);
      let select = select.join(", ");
      schema.check_select(&select)?;

      let options = FetchOptions::new(CALL_LOGS, select)
         .filters(translate(schema, &scope, rules)?)
         .order_by(OrderBy::desc("call_started_at"));

      let rows = export_all(&self.db, &options, &self.config.export_config(), cancel).await?;

      let spec = FlattenSpec::new()
         .basic(EXPORT_COLUMNS.iter().copied())
         .derived("cost_total", COST_PARTS.iter().copied())
         .json_source("metadata", "metadata", JsonFields::Discovered)
         .json_source("metrics", "metrics", JsonFields::Discovered);
      let layout = spec.layout(&rows);

      info!(%agent_id, rows = rows.len(), "call log export finished");
      Ok(CallLogExport {
         header: layout.header(),
         rows: layout.flatten_rows(&rows),
      })
   }
}

fn compile_triples(
   schema: &TableSchema,
   triples: Vec<FilterTriple>,
) -> toolkit::Result<Vec<CompiledFilter>> {
   triples
      .into_iter()
      .map(|triple| compile_triple(schema, triple))
      .collect()
}

/// Check a triple against the schema and coerce its value to the column kind.
///
/// Pattern operators always bind text.
fn compile_triple(schema: &TableSchema, triple: FilterTriple) -> toolkit::Result<CompiledFilter> {
   let operator: FilterOperator = triple.operator.parse()?;
   let kind = schema.check_column(&triple.column)?;
   let column = ColumnExpr::plain(triple.column.as_str())?;

   if operator == FilterOperator::IsNotNull {
      return Ok(CompiledFilter::not_null(column));
   }

   let target = match operator {
      FilterOperator::Like | FilterOperator::Ilike => ColumnKind::Text,
      _ => kind,
   };
   let value = coerce_json(target, triple.value.clone()).ok_or_else(|| {
      toolkit::Error::InvalidValue {
         column: triple.column.clone(),
         expected: target.as_str(),
         value: triple.value.to_string(),
      }
   })?;

   Ok(CompiledFilter::new(column, operator, value))
}

fn respond<T>(operation: &'static str, result: toolkit::Result<T>) -> QueryResponse<T> {
   if let Err(err) = &result {
      error!(operation, code = %err.error_code(), "{err}");
   }
   QueryResponse::from(result)
}

fn respond_optional<T>(
   operation: &'static str,
   result: toolkit::Result<Option<T>>,
) -> QueryResponse<T> {
   if let Err(err) = &result {
      error!(operation, code = %err.error_code(), "{err}");
   }
   QueryResponse::from_optional(result)
}
