//! Table catalog: the allow-list of tables and typed columns.
//!
//! Table names, selected columns, ordering columns and data keys are never
//! taken from user input; they must exist in a [`Catalog`]. The column kind
//! drives filter translation (JSON and date handling) and value coercion.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::value::SqlValue;
use crate::{Error, Result};

/// Storage type of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
   Text,
   Integer,
   Numeric,
   Boolean,
   /// `timestamp` / `timestamptz`; filters on these expand to calendar days.
   Timestamp,
   Uuid,
   /// `json` / `jsonb`; filters address a sub-field.
   Json,
}

impl ColumnKind {
   pub fn as_str(self) -> &'static str {
      match self {
         ColumnKind::Text => "text",
         ColumnKind::Integer => "integer",
         ColumnKind::Numeric => "numeric",
         ColumnKind::Boolean => "boolean",
         ColumnKind::Timestamp => "timestamp",
         ColumnKind::Uuid => "uuid",
         ColumnKind::Json => "json",
      }
   }

   pub fn is_json(self) -> bool {
      self == ColumnKind::Json
   }

   pub fn is_date(self) -> bool {
      self == ColumnKind::Timestamp
   }
}

impl fmt::Display for ColumnKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Schema of one allow-listed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
   name: String,
   primary_key: String,
   columns: IndexMap<String, ColumnKind>,
}

impl TableSchema {
   /// Start a schema; the primary key column still has to be declared with `column()`.
   pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         primary_key: primary_key.into(),
         columns: IndexMap::new(),
      }
   }

   pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
      self.columns.insert(name.into(), kind);
      self
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn primary_key(&self) -> &str {
      &self.primary_key
   }

   /// Columns in declaration order.
   pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
      self.columns.iter().map(|(name, kind)| (name.as_str(), *kind))
   }

   pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
      self.columns.get(column).copied()
   }

   /// Kind of `column`, or `UnknownColumn` when it is not allow-listed.
   pub fn check_column(&self, column: &str) -> Result<ColumnKind> {
      self.kind_of(column).ok_or_else(|| Error::UnknownColumn {
         table: self.name.clone(),
         column: column.to_string(),
      })
   }

   /// Check a select list: `*` or comma-separated known columns.
   pub fn check_select(&self, select: &str) -> Result<()> {
      if select.trim() == "*" {
         return Ok(());
      }
      for column in select.split(',') {
         self.check_column(column.trim())?;
      }
      Ok(())
   }

   /// Coerce a JSON value for `column` into a bindable value.
   pub fn coerce(&self, column: &str, value: JsonValue) -> Result<SqlValue> {
      let kind = self.check_column(column)?;
      coerce_json(kind, value.clone()).ok_or_else(|| Error::InvalidValue {
         column: column.to_string(),
         expected: kind.as_str(),
         value: value.to_string(),
      })
   }

   /// Coerce every entry of an insert/update payload, keeping key order.
   pub fn coerce_record(
      &self,
      data: IndexMap<String, JsonValue>,
   ) -> Result<IndexMap<String, SqlValue>> {
      data
         .into_iter()
         .map(|(column, value)| {
            let value = self.coerce(&column, value)?;
            Ok((column, value))
         })
         .collect()
   }
}

/// The set of tables a query layer may touch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
   tables: IndexMap<String, TableSchema>,
}

impl Catalog {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_table(mut self, schema: TableSchema) -> Self {
      self.tables.insert(schema.name.clone(), schema);
      self
   }

   /// Schema for `name`, or `UnknownTable`.
   pub fn table(&self, name: &str) -> Result<&TableSchema> {
      self
         .tables
         .get(name)
         .ok_or_else(|| Error::UnknownTable(name.to_string()))
   }

   pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
      self.tables.values()
   }
}

/// Convert a JSON value to the kind's bindable form; `None` when it does not fit.
pub fn coerce_json(kind: ColumnKind, value: JsonValue) -> Option<SqlValue> {
   if value.is_null() {
      return Some(SqlValue::Null);
   }
   match (kind, value) {
      (ColumnKind::Json, value) => Some(SqlValue::Json(value)),
      (_, JsonValue::String(s)) => coerce_text(kind, &s),
      (ColumnKind::Text, JsonValue::Number(n)) => Some(SqlValue::Text(n.to_string())),
      (ColumnKind::Text, JsonValue::Bool(b)) => Some(SqlValue::Text(b.to_string())),
      (ColumnKind::Integer, JsonValue::Number(n)) => n.as_i64().map(SqlValue::Int),
      (ColumnKind::Numeric, JsonValue::Number(n)) => n.as_f64().map(SqlValue::Float),
      (ColumnKind::Boolean, JsonValue::Bool(b)) => Some(SqlValue::Bool(b)),
      _ => None,
   }
}

/// Convert user-entered text to the kind's bindable form; `None` when it does not parse.
pub fn coerce_text(kind: ColumnKind, text: &str) -> Option<SqlValue> {
   let trimmed = text.trim();
   match kind {
      ColumnKind::Text => Some(SqlValue::Text(text.to_string())),
      ColumnKind::Integer => trimmed.parse().ok().map(SqlValue::Int),
      ColumnKind::Numeric => trimmed
         .parse::<f64>()
         .ok()
         .filter(|f| f.is_finite())
         .map(SqlValue::Float),
      ColumnKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
         "true" | "t" | "1" => Some(SqlValue::Bool(true)),
         "false" | "f" | "0" => Some(SqlValue::Bool(false)),
         _ => None,
      },
      ColumnKind::Timestamp => parse_timestamp(trimmed).map(SqlValue::Timestamp),
      ColumnKind::Uuid => Uuid::parse_str(trimmed).ok().map(SqlValue::Uuid),
      ColumnKind::Json => Some(SqlValue::Json(
         serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string())),
      )),
   }
}

/// Parse a timestamp as RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (UTC) or a bare date (UTC midnight).
pub(crate) fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
   if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
      return Some(ts);
   }
   let naive = format_description!(
      "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
   );
   let naive_t = format_description!(
      "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
   );
   if let Ok(ts) = PrimitiveDateTime::parse(text, naive)
      .or_else(|_| PrimitiveDateTime::parse(text, naive_t))
   {
      return Some(ts.assume_utc());
   }
   parse_date(text).map(|date| date.midnight().assume_utc())
}

/// Parse the calendar date at the start of `text` (`YYYY-MM-DD`, optionally followed by a time).
pub(crate) fn parse_date(text: &str) -> Option<Date> {
   let prefix = text.trim().get(..10)?;
   Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

/// Validate that a name is safe for SQL interpolation as an identifier.
///
/// Accepts names matching `[a-zA-Z_][a-zA-Z0-9_.]*`, which covers plain column
/// names, qualified names (e.g., `table.column`), and underscored identifiers.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
   let mut chars = name.chars();
   let valid_first = chars
      .next()
      .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
   let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');

   if !valid_first || !valid_rest {
      return Err(Error::InvalidIdentifier {
         name: name.to_string(),
      });
   }
   Ok(())
}

/// Validate a JSON sub-field name.
///
/// Any non-empty key is accepted; it is always emitted through
/// [`quote_literal`]. NUL cannot appear in a PostgreSQL literal.
pub(crate) fn validate_json_field(name: &str) -> Result<()> {
   if name.is_empty() || name.contains('\0') {
      return Err(Error::InvalidJsonField {
         name: name.to_string(),
      });
   }
   Ok(())
}

/// Quote a string as a SQL literal. Embedded single quotes are doubled.
pub(crate) fn quote_literal(text: &str) -> String {
   format!("'{}'", text.replace('\'', "''"))
}
