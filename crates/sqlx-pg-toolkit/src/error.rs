use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgDatabaseError;

/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for table query operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_pg_conn_mgr::Error),

   /// PostgreSQL type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Identifier contains characters that are not safe to interpolate.
   ///
   /// Identifiers must match `[a-zA-Z_][a-zA-Z0-9_.]*` (letters, digits,
   /// underscores, and dots for qualified names like `table.column`).
   #[error("invalid identifier '{name}': must match [a-zA-Z_][a-zA-Z0-9_.]*")]
   InvalidIdentifier { name: String },

   /// JSON field name is empty or contains a NUL character.
   #[error("invalid JSON field name '{name}': must be non-empty and free of NUL characters")]
   InvalidJsonField { name: String },

   /// Table is not part of the catalog.
   #[error("unknown table: {0}")]
   UnknownTable(String),

   /// Column is not part of the table schema.
   #[error("unknown column '{column}' on table '{table}'")]
   UnknownColumn { table: String, column: String },

   /// Value cannot be converted to the column's type.
   #[error("value {value} is not a valid {expected} for column '{column}'")]
   InvalidValue {
      column: String,
      expected: &'static str,
      value: String,
   },

   /// Comparison operator name is not one of the supported operators.
   #[error("unsupported filter operator: {0}")]
   UnsupportedOperator(String),

   /// INSERT or UPDATE was given no columns.
   #[error("insert and update require at least one column")]
   EmptyData,

   /// UPDATE or DELETE was given no filters.
   #[error("update and delete require at least one filter")]
   UnscopedMutation,

   /// Requested row limit is above the configured ceiling.
   #[error("limit {requested} exceeds the maximum of {max} rows")]
   LimitTooLarge { requested: usize, max: usize },

   /// Page size must be greater than zero.
   #[error("page size must be greater than zero")]
   InvalidPageSize,

   /// Export exceeded its configured page ceiling.
   #[error("export stopped after reaching the limit of {pages} pages")]
   ExportPageLimit { pages: usize },

   /// Export was cancelled by the caller.
   #[error("export cancelled")]
   ExportCancelled,

   /// A single database call exceeded its deadline.
   #[error("query timed out after {}ms", .after.as_millis())]
   Timeout { after: Duration },

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("PG_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::InvalidIdentifier { .. } => "INVALID_IDENTIFIER".to_string(),
         Error::InvalidJsonField { .. } => "INVALID_JSON_FIELD".to_string(),
         Error::UnknownTable(_) => "UNKNOWN_TABLE".to_string(),
         Error::UnknownColumn { .. } => "UNKNOWN_COLUMN".to_string(),
         Error::InvalidValue { .. } => "INVALID_VALUE".to_string(),
         Error::UnsupportedOperator(_) => "UNSUPPORTED_OPERATOR".to_string(),
         Error::EmptyData => "EMPTY_DATA".to_string(),
         Error::UnscopedMutation => "UNSCOPED_MUTATION".to_string(),
         Error::LimitTooLarge { .. } => "LIMIT_TOO_LARGE".to_string(),
         Error::InvalidPageSize => "INVALID_PAGE_SIZE".to_string(),
         Error::ExportPageLimit { .. } => "EXPORT_PAGE_LIMIT".to_string(),
         Error::ExportCancelled => "EXPORT_CANCELLED".to_string(),
         Error::Timeout { .. } => "TIMEOUT".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }

   /// Server-supplied detail for database errors, when PostgreSQL sent one.
   pub fn detail(&self) -> Option<String> {
      match self {
         Error::Sqlx(e) => e
            .as_database_error()
            .and_then(|db_err| db_err.try_downcast_ref::<PgDatabaseError>())
            .and_then(|pg_err| pg_err.detail())
            .map(str::to_string),
         _ => None,
      }
   }
}

/// Serializable error half of a [`QueryResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
   pub message: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub code: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub detail: Option<String>,
}

impl From<&Error> for QueryError {
   fn from(err: &Error) -> Self {
      Self {
         message: err.to_string(),
         code: Some(err.error_code()),
         detail: err.detail(),
      }
   }
}

impl From<Error> for QueryError {
   fn from(err: Error) -> Self {
      Self::from(&err)
   }
}

/// `{data, error}` envelope returned across the query-layer boundary.
///
/// Exactly one of `data` and `error` is set for responses built from a
/// `Result`; callers check `error` instead of catching anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse<T> {
   pub data: Option<T>,
   pub error: Option<QueryError>,
}

impl<T> QueryResponse<T> {
   pub fn ok(data: T) -> Self {
      Self {
         data: Some(data),
         error: None,
      }
   }

   pub fn failed(error: impl Into<QueryError>) -> Self {
      Self {
         data: None,
         error: Some(error.into()),
      }
   }

   /// Envelope for operations whose success may carry no row.
   ///
   /// `Ok(None)` becomes `{data: null, error: null}`.
   pub fn from_optional(result: Result<Option<T>>) -> Self {
      match result {
         Ok(data) => Self { data, error: None },
         Err(err) => Self::failed(err),
      }
   }

   pub fn is_ok(&self) -> bool {
      self.error.is_none()
   }

   /// Convert back into a `Result`, mainly for `?` in callers.
   pub fn into_result(self) -> std::result::Result<Option<T>, QueryError> {
      match self.error {
         Some(error) => Err(error),
         None => Ok(self.data),
      }
   }
}

impl<T> From<Result<T>> for QueryResponse<T> {
   fn from(result: Result<T>) -> Self {
      match result {
         Ok(data) => Self::ok(data),
         Err(err) => Self::failed(err),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_unsupported_datatype() {
      let err = Error::UnsupportedDatatype("TSVECTOR".into());
      assert_eq!(err.error_code(), "UNSUPPORTED_DATATYPE");
      assert!(err.to_string().contains("TSVECTOR"));
   }

   #[test]
   fn test_error_code_invalid_identifier() {
      let err = Error::InvalidIdentifier {
         name: "bad;name".into(),
      };
      assert_eq!(err.error_code(), "INVALID_IDENTIFIER");
      assert!(err.to_string().contains("bad;name"));
   }

   #[test]
   fn test_error_code_unknown_column() {
      let err = Error::UnknownColumn {
         table: "call_logs".into(),
         column: "secret".into(),
      };
      assert_eq!(err.error_code(), "UNKNOWN_COLUMN");
      assert!(err.to_string().contains("call_logs"));
      assert!(err.to_string().contains("secret"));
   }

   #[test]
   fn test_error_code_invalid_value() {
      let err = Error::InvalidValue {
         column: "duration_seconds".into(),
         expected: "integer",
         value: "\"abc\"".into(),
      };
      assert_eq!(err.error_code(), "INVALID_VALUE");
      assert!(err.to_string().contains("integer"));
   }

   #[test]
   fn test_error_code_limit_too_large() {
      let err = Error::LimitTooLarge {
         requested: 5000,
         max: 1000,
      };
      assert_eq!(err.error_code(), "LIMIT_TOO_LARGE");
      assert_eq!(err.to_string(), "limit 5000 exceeds the maximum of 1000 rows");
   }

   #[test]
   fn test_error_code_unsupported_operator() {
      let err = Error::UnsupportedOperator("between".into());
      assert_eq!(err.error_code(), "UNSUPPORTED_OPERATOR");
      assert!(err.to_string().contains("between"));
   }

   #[test]
   fn test_error_code_mutation_guards() {
      assert_eq!(Error::EmptyData.error_code(), "EMPTY_DATA");
      assert_eq!(Error::UnscopedMutation.error_code(), "UNSCOPED_MUTATION");
   }

   #[test]
   fn test_error_code_export() {
      let err = Error::ExportPageLimit { pages: 500 };
      assert_eq!(err.error_code(), "EXPORT_PAGE_LIMIT");
      assert!(err.to_string().contains("500"));
      assert_eq!(Error::ExportCancelled.error_code(), "EXPORT_CANCELLED");
   }

   #[test]
   fn test_error_code_timeout() {
      let err = Error::Timeout {
         after: Duration::from_millis(1500),
      };
      assert_eq!(err.error_code(), "TIMEOUT");
      assert!(err.to_string().contains("1500ms"));
   }

   #[test]
   fn test_error_code_sqlx_non_database() {
      // RowNotFound is not a database error, so no SQLSTATE
      let err = Error::Sqlx(sqlx::Error::RowNotFound);
      assert_eq!(err.error_code(), "SQLX_ERROR");
      assert_eq!(err.detail(), None);
   }

   #[test]
   fn test_error_code_connection_manager() {
      let err = Error::ConnectionManager(sqlx_pg_conn_mgr::Error::DatabaseClosed);
      assert_eq!(err.error_code(), "CONNECTION_ERROR");
   }

   #[test]
   fn query_error_carries_message_and_code() {
      let err = QueryError::from(Error::UnknownTable("secrets".into()));
      assert_eq!(err.message, "unknown table: secrets");
      assert_eq!(err.code.as_deref(), Some("UNKNOWN_TABLE"));
      assert_eq!(err.detail, None);
   }

   #[test]
   fn response_from_result() {
      let ok: QueryResponse<u32> = Ok(7).into();
      assert!(ok.is_ok());
      assert_eq!(ok.data, Some(7));

      let failed: QueryResponse<u32> = Err(Error::EmptyData).into();
      assert!(!failed.is_ok());
      assert_eq!(failed.data, None);
      assert_eq!(
         failed.error.as_ref().and_then(|e| e.code.as_deref()),
         Some("EMPTY_DATA")
      );
   }

   #[test]
   fn optional_response_without_row() {
      let none: QueryResponse<u32> = QueryResponse::from_optional(Ok(None));
      assert!(none.is_ok());
      assert_eq!(none.data, None);

      let failed: QueryResponse<u32> = QueryResponse::from_optional(Err(Error::EmptyData));
      assert!(!failed.is_ok());
   }

   #[test]
   fn response_serializes_both_fields() {
      let failed: QueryResponse<u32> = QueryResponse::failed(Error::UnscopedMutation);
      let json = serde_json::to_value(&failed).unwrap();

      assert_eq!(json["data"], serde_json::Value::Null);
      assert_eq!(json["error"]["code"], "UNSCOPED_MUTATION");
      assert!(json["error"].get("detail").is_none());
   }
}
