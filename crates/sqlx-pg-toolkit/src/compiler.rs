//! SQL generation for fetch, insert, update and delete.
//!
//! Every statement is rendered with `$n` placeholders numbered in declaration
//! order. Identifiers are validated and interpolated; values are only ever
//! bound. A `NULL` value is rendered as a literal because PostgreSQL types
//! every bound parameter.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::{quote_literal, validate_identifier, validate_json_field};
use crate::value::SqlValue;
use crate::{Error, Result};

/// Left-hand side of a compiled predicate.
///
/// Each variant renders to a fixed SQL shape around validated names, so the
/// rendered text is always safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnExpr {
   /// `column`
   Plain(String),
   /// `column->>'field'` (text extraction)
   JsonText { column: String, field: String },
   /// `column->'field'` (raw JSON value)
   JsonRaw { column: String, field: String },
   /// `(column->'field')::numeric`
   JsonNumeric { column: String, field: String },
}

impl ColumnExpr {
   pub fn plain(column: impl Into<String>) -> Result<Self> {
      let expr = ColumnExpr::Plain(column.into());
      expr.validate()?;
      Ok(expr)
   }

   pub fn json_text(column: impl Into<String>, field: impl Into<String>) -> Result<Self> {
      let expr = ColumnExpr::JsonText {
         column: column.into(),
         field: field.into(),
      };
      expr.validate()?;
      Ok(expr)
   }

   pub fn json_raw(column: impl Into<String>, field: impl Into<String>) -> Result<Self> {
      let expr = ColumnExpr::JsonRaw {
         column: column.into(),
         field: field.into(),
      };
      expr.validate()?;
      Ok(expr)
   }

   pub fn json_numeric(column: impl Into<String>, field: impl Into<String>) -> Result<Self> {
      let expr = ColumnExpr::JsonNumeric {
         column: column.into(),
         field: field.into(),
      };
      expr.validate()?;
      Ok(expr)
   }

   /// The table column this expression reads from.
   pub fn base_column(&self) -> &str {
      match self {
         ColumnExpr::Plain(column)
         | ColumnExpr::JsonText { column, .. }
         | ColumnExpr::JsonRaw { column, .. }
         | ColumnExpr::JsonNumeric { column, .. } => column,
      }
   }

   fn validate(&self) -> Result<()> {
      validate_identifier(self.base_column())?;
      match self {
         ColumnExpr::Plain(_) => Ok(()),
         ColumnExpr::JsonText { field, .. }
         | ColumnExpr::JsonRaw { field, .. }
         | ColumnExpr::JsonNumeric { field, .. } => validate_json_field(field),
      }
   }
}

impl fmt::Display for ColumnExpr {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         ColumnExpr::Plain(column) => f.write_str(column),
         ColumnExpr::JsonText { column, field } => write!(f, "{}->>{}", column, quote_literal(field)),
         ColumnExpr::JsonRaw { column, field } => write!(f, "{}->{}", column, quote_literal(field)),
         ColumnExpr::JsonNumeric { column, field } => {
            write!(f, "({}->{})::numeric", column, quote_literal(field))
         }
      }
   }
}

/// Comparison operator of a compiled predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
   Eq,
   Neq,
   Gt,
   Gte,
   Lt,
   Lte,
   Like,
   Ilike,
   /// Existence check; binds no value.
   IsNotNull,
}

impl FilterOperator {
   pub fn as_str(self) -> &'static str {
      match self {
         FilterOperator::Eq => "eq",
         FilterOperator::Neq => "neq",
         FilterOperator::Gt => "gt",
         FilterOperator::Gte => "gte",
         FilterOperator::Lt => "lt",
         FilterOperator::Lte => "lte",
         FilterOperator::Like => "like",
         FilterOperator::Ilike => "ilike",
         FilterOperator::IsNotNull => "is_not_null",
      }
   }

   pub fn sql(self) -> &'static str {
      match self {
         FilterOperator::Eq => "=",
         FilterOperator::Neq => "!=",
         FilterOperator::Gt => ">",
         FilterOperator::Gte => ">=",
         FilterOperator::Lt => "<",
         FilterOperator::Lte => "<=",
         FilterOperator::Like => "LIKE",
         FilterOperator::Ilike => "ILIKE",
         FilterOperator::IsNotNull => "IS NOT NULL",
      }
   }
}

impl FromStr for FilterOperator {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      match s {
         "eq" => Ok(FilterOperator::Eq),
         "neq" => Ok(FilterOperator::Neq),
         "gt" => Ok(FilterOperator::Gt),
         "gte" => Ok(FilterOperator::Gte),
         "lt" => Ok(FilterOperator::Lt),
         "lte" => Ok(FilterOperator::Lte),
         "like" => Ok(FilterOperator::Like),
         "ilike" => Ok(FilterOperator::Ilike),
         "is_not_null" => Ok(FilterOperator::IsNotNull),
         other => Err(Error::UnsupportedOperator(other.to_string())),
      }
   }
}

impl fmt::Display for FilterOperator {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// One predicate ready for rendering: column expression, operator, optional value.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
   pub column: ColumnExpr,
   pub operator: FilterOperator,
   pub value: Option<SqlValue>,
}

impl CompiledFilter {
   pub fn new(column: ColumnExpr, operator: FilterOperator, value: impl Into<SqlValue>) -> Self {
      Self {
         column,
         operator,
         value: Some(value.into()),
      }
   }

   /// `column = value` on a plain column.
   pub fn eq(column: &str, value: impl Into<SqlValue>) -> Result<Self> {
      Ok(Self::new(ColumnExpr::plain(column)?, FilterOperator::Eq, value))
   }

   /// `expr IS NOT NULL`.
   pub fn not_null(column: ColumnExpr) -> Self {
      Self {
         column,
         operator: FilterOperator::IsNotNull,
         value: None,
      }
   }

   /// Parse the `{column, operator, value}` triple used by route handlers.
   ///
   /// `column` must be a plain identifier here; JSON-path expressions only
   /// come out of the filter translator.
   pub fn from_triple(column: &str, operator: &str, value: impl Into<SqlValue>) -> Result<Self> {
      let operator: FilterOperator = operator.parse()?;
      let column = ColumnExpr::plain(column)?;
      if operator == FilterOperator::IsNotNull {
         return Ok(Self::not_null(column));
      }
      Ok(Self::new(column, operator, value))
   }

   /// Whether rendering this predicate consumes a placeholder.
   pub fn binds_value(&self) -> bool {
      self.operator != FilterOperator::IsNotNull
         && self.value.as_ref().is_some_and(|v| !v.is_null())
   }
}

/// Sort specification for fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
   pub column: String,
   pub ascending: bool,
}

impl OrderBy {
   pub fn asc(column: impl Into<String>) -> Self {
      Self {
         column: column.into(),
         ascending: true,
      }
   }

   pub fn desc(column: impl Into<String>) -> Self {
      Self {
         column: column.into(),
         ascending: false,
      }
   }
}

/// Everything needed to render one SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
   pub table: String,
   /// `*` or a comma-separated column list
   pub select: String,
   pub filters: Vec<CompiledFilter>,
   pub order_by: Option<OrderBy>,
   pub limit: Option<usize>,
   pub offset: Option<usize>,
}

impl FetchOptions {
   pub fn new(table: impl Into<String>, select: impl Into<String>) -> Self {
      Self {
         table: table.into(),
         select: select.into(),
         filters: Vec::new(),
         order_by: None,
         limit: None,
         offset: None,
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

   pub fn order_by(mut self, order_by: OrderBy) -> Self {
      self.order_by = Some(order_by);
      self
   }

   pub fn limit(mut self, limit: usize) -> Self {
      self.limit = Some(limit);
      self
   }

   pub fn offset(mut self, offset: usize) -> Self {
      self.offset = Some(offset);
      self
   }

   /// Copy of these options restricted to one page.
   pub fn page(&self, limit: usize, offset: usize) -> Self {
      Self {
         limit: Some(limit),
         offset: Some(offset),
         ..self.clone()
      }
   }
}

/// Rendered SQL with its bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
   pub sql: String,
   pub values: Vec<SqlValue>,
}

/// Accumulates bind values while a statement is rendered.
#[derive(Default)]
struct StatementWriter {
   values: Vec<SqlValue>,
}

impl StatementWriter {
   /// Placeholder for `value`, or the `NULL` literal.
   fn value(&mut self, value: SqlValue) -> String {
      if value.is_null() {
         return "NULL".to_string();
      }
      self.values.push(value);
      format!("${}", self.values.len())
   }

   fn predicate(&mut self, filter: &CompiledFilter) -> Result<String> {
      filter.column.validate()?;
      let column = &filter.column;

      let value = match (&filter.operator, &filter.value) {
         (FilterOperator::IsNotNull, _) => return Ok(format!("{} IS NOT NULL", column)),
         (_, None) => SqlValue::Null,
         (_, Some(value)) => value.clone(),
      };

      if value.is_null() {
         return Ok(match filter.operator {
            FilterOperator::Eq => format!("{} IS NULL", column),
            FilterOperator::Neq => format!("{} IS NOT NULL", column),
            op => format!("{} {} NULL", column, op.sql()),
         });
      }

      let placeholder = self.value(value);
      Ok(format!("{} {} {}", column, filter.operator.sql(), placeholder))
   }

   /// ` WHERE p1 AND p2 ...`, or an empty string for no filters.
   fn where_clause(&mut self, filters: &[CompiledFilter]) -> Result<String> {
      if filters.is_empty() {
         return Ok(String::new());
      }
      let predicates = filters
         .iter()
         .map(|f| self.predicate(f))
         .collect::<Result<Vec<_>>>()?;
      Ok(format!(" WHERE {}", predicates.join(" AND ")))
   }

   fn finish(self, sql: String) -> SqlStatement {
      SqlStatement {
         sql,
         values: self.values,
      }
   }
}

fn validate_select(select: &str) -> Result<String> {
   let select = select.trim();
   if select == "*" {
      return Ok(select.to_string());
   }
   let columns: Vec<&str> = select.split(',').map(str::trim).collect();
   for column in &columns {
      validate_identifier(column)?;
   }
   Ok(columns.join(", "))
}

/// Render `SELECT {select} FROM {table} [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET m]`.
pub fn build_select(options: &FetchOptions) -> Result<SqlStatement> {
   validate_identifier(&options.table)?;
   let select = validate_select(&options.select)?;

   let mut writer = StatementWriter::default();
   let mut sql = format!("SELECT {} FROM {}", select, options.table);
   sql.push_str(&writer.where_clause(&options.filters)?);

   if let Some(order) = &options.order_by {
      validate_identifier(&order.column)?;
      let dir = if order.ascending { "ASC" } else { "DESC" };
      sql.push_str(&format!(" ORDER BY {} {}", order.column, dir));
   }
   if let Some(limit) = options.limit {
      sql.push_str(&format!(" LIMIT {}", limit));
   }
   if let Some(offset) = options.offset {
      sql.push_str(&format!(" OFFSET {}", offset));
   }

   Ok(writer.finish(sql))
}

/// Render `INSERT INTO {table} (cols) VALUES (...) RETURNING *`, columns in key order.
pub fn build_insert(table: &str, data: IndexMap<String, SqlValue>) -> Result<SqlStatement> {
   validate_identifier(table)?;
   if data.is_empty() {
      return Err(Error::EmptyData);
   }

   let mut writer = StatementWriter::default();
   let mut columns = Vec::with_capacity(data.len());
   let mut placeholders = Vec::with_capacity(data.len());
   for (column, value) in data {
      validate_identifier(&column)?;
      placeholders.push(writer.value(value));
      columns.push(column);
   }

   let sql = format!(
      "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
      table,
      columns.join(", "),
      placeholders.join(", ")
   );
   Ok(writer.finish(sql))
}

/// Render `UPDATE {table} SET ... WHERE ... RETURNING *`.
///
/// SET placeholders are numbered before WHERE placeholders, so the bind
/// values are the data values followed by the filter values.
pub fn build_update(
   table: &str,
   data: IndexMap<String, SqlValue>,
   filters: &[CompiledFilter],
) -> Result<SqlStatement> {
   validate_identifier(table)?;
   if data.is_empty() {
      return Err(Error::EmptyData);
   }
   if filters.is_empty() {
      return Err(Error::UnscopedMutation);
   }

   let mut writer = StatementWriter::default();
   let mut assignments = Vec::with_capacity(data.len());
   for (column, value) in data {
      validate_identifier(&column)?;
      assignments.push(format!("{} = {}", column, writer.value(value)));
   }
   let where_clause = writer.where_clause(filters)?;

   let sql = format!(
      "UPDATE {} SET {}{} RETURNING *",
      table,
      assignments.join(", "),
      where_clause
   );
   Ok(writer.finish(sql))
}

/// Render `DELETE FROM {table} WHERE ... RETURNING *`.
pub fn build_delete(table: &str, filters: &[CompiledFilter]) -> Result<SqlStatement> {
   validate_identifier(table)?;
   if filters.is_empty() {
      return Err(Error::UnscopedMutation);
   }

   let mut writer = StatementWriter::default();
   let where_clause = writer.where_clause(filters)?;
   let sql = format!("DELETE FROM {}{} RETURNING *", table, where_clause);
   Ok(writer.finish(sql))
}

/// Render the simple single-column delete: `DELETE FROM {table} WHERE {column} = $1 RETURNING *`.
pub fn delete_where_eq(
   table: &str,
   column: &str,
   value: impl Into<SqlValue>,
) -> Result<SqlStatement> {
   build_delete(table, &[CompiledFilter::eq(column, value)?])
}
