//! # sqlx-pg-toolkit
//!
//! A generic PostgreSQL table query layer built on SQLx.
//!
//! ## Core Types
//!
//! - **[`Catalog`]** / **[`TableSchema`]**: allow-listed tables and typed columns
//! - **[`FilterRule`]** + **[`translate`]**: declarative filters compiled into
//!   scoped predicates, including JSON sub-fields and calendar-day expansion
//! - **[`build_select`]** and friends: parameterized SQL with `$n` placeholders
//! - **[`DatabaseWrapper`]**: pooled execution through builder-pattern queries
//! - **[`OffsetPaginator`]**: load-more pagination with primary-key de-duplication
//! - **[`export_all`]** + **[`FlattenSpec`]**: chunked bulk export and flattening
//! - **[`QueryResponse`]**: the `{data, error}` envelope for callers
//!
//! ## Example
//!
//! ```no_run
//! use sqlx_pg_toolkit::{
//!    ColumnKind, DatabaseWrapper, FetchOptions, FilterRule, OrderBy, Scope, TableSchema,
//!    translate,
//! };
//!
//! # async fn example() -> sqlx_pg_toolkit::Result<()> {
//! let calls = TableSchema::new("call_logs", "id")
//!    .column("id", ColumnKind::Uuid)
//!    .column("agent_id", ColumnKind::Uuid)
//!    .column("duration_seconds", ColumnKind::Integer);
//!
//! let rules = vec![FilterRule::new("f1", "duration_seconds", "greater_than", "60")];
//! let scope = Scope::new("agent_id", "2f1d0a4e-5b7c-4e0e-9a53-0c1b9e2f7a11");
//! let filters = translate(&calls, &scope, &rules)?;
//!
//! let db = DatabaseWrapper::connect("postgres://localhost/calls", None).await?;
//! let rows = db
//!    .fetch(FetchOptions::new("call_logs", "*").filters(filters))
//!    .order_by(OrderBy::desc("duration_seconds"))
//!    .limit(50)
//!    .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

mod builders;
mod compiler;
mod decode;
mod error;
mod export;
mod filter;
mod flatten;
mod pagination;
mod schema;
mod source;
mod value;
mod wrapper;

pub use builders::{DeleteBuilder, FetchBuilder, InsertBuilder, UpdateBuilder};
pub use compiler::{
   ColumnExpr, CompiledFilter, FetchOptions, FilterOperator, OrderBy, SqlStatement, build_delete,
   build_insert, build_select, build_update, delete_where_eq,
};
pub use decode::Row;
pub use error::{Error, QueryError, QueryResponse, Result};
pub use export::{DEFAULT_CHUNK_SIZE, ExportConfig, export_all};
pub use filter::{FilterOperation, FilterRule, Scope, escape_like, translate};
pub use flatten::{
   DerivedColumn, ExportRow, FlatLayout, FlattenSpec, JsonFields, JsonSource,
   discover_json_fields, flatten_rows,
};
pub use pagination::{FetchOutcome, OffsetPaginator, PaginationState};
pub use schema::{Catalog, ColumnKind, TableSchema, coerce_json, coerce_text};
pub use source::RowSource;
pub use value::SqlValue;
pub use wrapper::DatabaseWrapper;

// Re-export for callers that configure the pool or pass cancellation tokens
pub use sqlx_pg_conn_mgr::{PgDatabase, PgDatabaseConfig};
pub use tokio_util::sync::CancellationToken;
