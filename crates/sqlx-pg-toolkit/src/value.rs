//! Typed scalars that cross the parameter boundary.
//!
//! PostgreSQL parameters are strictly typed, so a text parameter compared to
//! an integer column is a type error. Values are coerced against the column
//! catalog before they reach the compiler, and each variant binds with the
//! matching PostgreSQL type.

use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A value bound as a positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
   /// Never bound; rendered as the `NULL` literal by the compiler.
   Null,
   Bool(bool),
   Int(i64),
   Float(f64),
   Text(String),
   Timestamp(OffsetDateTime),
   Uuid(Uuid),
   /// Bound as JSONB.
   Json(JsonValue),
}

impl SqlValue {
   pub fn is_null(&self) -> bool {
      matches!(self, SqlValue::Null)
   }
}

impl From<JsonValue> for SqlValue {
   fn from(value: JsonValue) -> Self {
      match value {
         JsonValue::Null => SqlValue::Null,
         JsonValue::Bool(b) => SqlValue::Bool(b),
         JsonValue::String(s) => SqlValue::Text(s),
         JsonValue::Number(n) => {
            // Preserve integer precision by binding as i64 when possible
            if let Some(int_val) = n.as_i64() {
               SqlValue::Int(int_val)
            } else {
               SqlValue::Float(n.as_f64().unwrap_or_default())
            }
         }
         other => SqlValue::Json(other),
      }
   }
}

impl From<&str> for SqlValue {
   fn from(value: &str) -> Self {
      SqlValue::Text(value.to_string())
   }
}

impl From<String> for SqlValue {
   fn from(value: String) -> Self {
      SqlValue::Text(value)
   }
}

impl From<i64> for SqlValue {
   fn from(value: i64) -> Self {
      SqlValue::Int(value)
   }
}

impl From<f64> for SqlValue {
   fn from(value: f64) -> Self {
      SqlValue::Float(value)
   }
}

impl From<bool> for SqlValue {
   fn from(value: bool) -> Self {
      SqlValue::Bool(value)
   }
}

impl From<Uuid> for SqlValue {
   fn from(value: Uuid) -> Self {
      SqlValue::Uuid(value)
   }
}

impl From<OffsetDateTime> for SqlValue {
   fn from(value: OffsetDateTime) -> Self {
      SqlValue::Timestamp(value)
   }
}

/// Bind one value to a SQLx query.
pub(crate) fn bind_value(query: PgQuery<'_>, value: SqlValue) -> PgQuery<'_> {
   match value {
      SqlValue::Null => query.bind(None::<String>),
      SqlValue::Bool(b) => query.bind(b),
      SqlValue::Int(i) => query.bind(i),
      SqlValue::Float(f) => query.bind(f),
      SqlValue::Text(s) => query.bind(s),
      SqlValue::Timestamp(ts) => query.bind(ts),
      SqlValue::Uuid(id) => query.bind(id),
      SqlValue::Json(json) => query.bind(sqlx::types::Json(json)),
   }
}
