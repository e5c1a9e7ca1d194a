//! # call-analytics-query
//!
//! Query surface of the voice-call analytics dashboard.
//!
//! A [`QueryLayer`] holds the PostgreSQL pool, the table allow-list
//! ([`catalog::call_dashboard`]) and the layer limits. Its operations never
//! return `Err` or panic on query failures; they answer with a
//! [`QueryResponse`] whose `error` half carries a message and a code.
//!
//! - **`fetch` / `insert` / `update` / `delete`**: single-table operations
//!   driven by `{column, operator, value}` triples
//! - **`fetch_filtered`**: scoped fetch driven by declarative [`FilterRule`]s
//! - **`paginator`**: load-more pagination for list views
//! - **`export_call_logs`**: chunked export of an agent's calls, flattened for
//!   download with a derived `cost_total`
//!
//! ## Example
//!
//! ```no_run
//! use call_analytics_query::{FetchRequest, FilterTriple, QueryLayer, QueryLayerConfig};
//!
//! # async fn example() -> call_analytics_query::Result<()> {
//! let layer = QueryLayer::connect(QueryLayerConfig::from_env()?).await?;
//!
//! let mut request = FetchRequest::new("agents");
//! request.filters.push(FilterTriple::new("is_active", "eq", true));
//!
//! let response = layer.fetch(request).await;
//! match response.error {
//!    Some(err) => eprintln!("fetch failed: {}", err.message),
//!    None => println!("{} agents", response.data.unwrap_or_default().len()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod commands;
mod config;
mod error;
mod wrapper;

pub use commands::{CallLogExport, FetchRequest, FilterTriple};
pub use config::QueryLayerConfig;
pub use error::{Error, Result};
pub use wrapper::QueryLayer;

pub use sqlx_pg_toolkit::{
   CancellationToken, ExportRow, FetchOptions, FetchOutcome, FilterRule, OffsetPaginator, OrderBy,
   PaginationState, QueryError, QueryResponse, Row, Scope,
};
