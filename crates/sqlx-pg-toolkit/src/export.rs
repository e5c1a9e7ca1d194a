//! Bulk export: page through a whole result set in fixed-size chunks.
//!
//! Pages are requested strictly in increasing offset order and each page is
//! awaited before the next is requested. The loop stops at the first short or
//! empty page. Three limits bound it:
//!
//! - `max_pages` caps how many pages one export may request
//! - a [`CancellationToken`] aborts between or during pages
//! - `fetch_timeout` bounds each individual page fetch
//!
//! Any failure aborts the export and the rows gathered so far are dropped, so
//! a caller never sees a truncated result.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::compiler::FetchOptions;
use crate::decode::Row;
use crate::source::RowSource;
use crate::{Error, Result};

/// Rows per page when no chunk size is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Limits for one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
   /// Rows requested per page
   pub chunk_size: usize,
   /// Pages one export may request before failing with `ExportPageLimit`
   pub max_pages: usize,
   /// Deadline for each page fetch; `None` waits indefinitely
   pub fetch_timeout: Option<Duration>,
}

impl Default for ExportConfig {
   fn default() -> Self {
      Self {
         chunk_size: DEFAULT_CHUNK_SIZE,
         max_pages: 1000,
         fetch_timeout: Some(Duration::from_secs(60)),
      }
   }
}

/// Fetch every row matching `options`, one chunk at a time.
///
/// `limit` and `offset` in `options` are replaced per page. A result that
/// fills exactly `max_pages` full pages is reported as `ExportPageLimit`,
/// since the loop cannot tell whether more rows follow.
pub async fn export_all<S: RowSource + ?Sized>(
   source: &S,
   options: &FetchOptions,
   config: &ExportConfig,
   cancel: &CancellationToken,
) -> Result<Vec<Row>> {
   match run_export(source, options, config, cancel).await {
      Ok(rows) => {
         debug!(table = %options.table, rows = rows.len(), "export complete");
         Ok(rows)
      }
      Err(err) => {
         warn!(table = %options.table, error = %err, "export aborted");
         Err(err)
      }
   }
}

async fn run_export<S: RowSource + ?Sized>(
   source: &S,
   options: &FetchOptions,
   config: &ExportConfig,
   cancel: &CancellationToken,
) -> Result<Vec<Row>> {
   let chunk = config.chunk_size;
   if chunk == 0 {
      return Err(Error::InvalidPageSize);
   }
   if options.order_by.is_none() {
      warn!(table = %options.table, "export without ORDER BY; page boundaries are not stable");
   }

   let mut rows = Vec::new();
   for page in 0..config.max_pages {
      if cancel.is_cancelled() {
         return Err(Error::ExportCancelled);
      }

      let request = options.page(chunk, page * chunk);
      let batch = tokio::select! {
         biased;
         _ = cancel.cancelled() => return Err(Error::ExportCancelled),
         batch = fetch_page(source, &request, config.fetch_timeout) => batch?,
      };

      let fetched = batch.len();
      rows.extend(batch);
      debug!(page, fetched, total = rows.len(), "export page");

      if fetched < chunk {
         return Ok(rows);
      }
   }

   Err(Error::ExportPageLimit {
      pages: config.max_pages,
   })
}

async fn fetch_page<S: RowSource + ?Sized>(
   source: &S,
   request: &FetchOptions,
   timeout: Option<Duration>,
) -> Result<Vec<Row>> {
   match timeout {
      Some(after) => tokio::time::timeout(after, source.fetch_rows(request))
         .await
         .map_err(|_| Error::Timeout { after })?,
      None => source.fetch_rows(request).await,
   }
}
