use sqlx_pg_toolkit::QueryError;

/// Result type alias for dashboard query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside the `{data, error}` envelope: setup and configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the query toolkit.
   #[error(transparent)]
   Toolkit(#[from] sqlx_pg_toolkit::Error),

   /// Environment variable holds a value that does not parse.
   #[error("invalid value '{value}' for {var}: {reason}")]
   InvalidConfig {
      var: &'static str,
      value: String,
      reason: String,
   },
}

impl Error {
   /// Machine-readable error code.
   pub fn error_code(&self) -> String {
      match self {
         Error::Toolkit(e) => e.error_code(),
         Error::InvalidConfig { .. } => "INVALID_CONFIG".to_string(),
      }
   }
}

impl From<Error> for QueryError {
   fn from(err: Error) -> Self {
      match err {
         Error::Toolkit(e) => QueryError::from(e),
         other => QueryError {
            message: other.to_string(),
            code: Some(other.error_code()),
            detail: None,
         },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn toolkit_codes_pass_through() {
      let err = Error::from(sqlx_pg_toolkit::Error::UnscopedMutation);
      assert_eq!(err.error_code(), "UNSCOPED_MUTATION");
      assert_eq!(QueryError::from(err).code.as_deref(), Some("UNSCOPED_MUTATION"));
   }

   #[test]
   fn config_error_names_the_variable() {
      let err = Error::InvalidConfig {
         var: "CALL_ANALYTICS_PAGE_SIZE",
         value: "lots".into(),
         reason: "invalid digit found in string".into(),
      };
      assert_eq!(err.error_code(), "INVALID_CONFIG");

      let query_err = QueryError::from(err);
      assert!(query_err.message.contains("CALL_ANALYTICS_PAGE_SIZE"));
      assert!(query_err.message.contains("lots"));
   }
}
