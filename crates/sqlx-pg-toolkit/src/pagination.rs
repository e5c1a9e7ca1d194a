//! Offset pagination with load-more semantics.
//!
//! An [`OffsetPaginator`] holds the rows fetched so far for one query and
//! exposes two operations:
//!
//! - [`reset`](OffsetPaginator::reset) starts over at offset 0 with new options
//!   and replaces the held rows with the first page.
//! - [`load_more`](OffsetPaginator::load_more) fetches the page at the current
//!   offset and appends the rows whose primary key is not already held.
//!
//! # State machine
//!
//! ```text
//! idle --reset/load_more--> fetching --ok/err--> idle
//! ```
//!
//! At most one page is in flight per paginator. The in-flight flag is checked
//! and set under a lock before the first await, so a second `load_more` that
//! arrives while a page is loading returns [`FetchOutcome::Skipped`] instead of
//! queueing. `reset` always runs and supersedes whatever was in flight; the
//! superseded result is discarded when it arrives.
//!
//! # Offset accounting
//!
//! The offset advances by the number of rows the page returned, not by the
//! number kept after de-duplication, so the next page starts where the server
//! left off even when rows shifted under concurrent writes. `has_more` is true
//! exactly when the last page came back full.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::compiler::FetchOptions;
use crate::decode::Row;
use crate::error::QueryError;
use crate::source::RowSource;
use crate::{Error, Result};

/// Point-in-time copy of a paginator's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
   pub rows: Vec<Row>,
   pub offset: usize,
   pub has_more: bool,
   pub loading: bool,
   pub error: Option<QueryError>,
}

/// What a `reset` or `load_more` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
   /// A page was applied.
   Loaded { fetched: usize, appended: usize },
   /// Another page was already in flight; nothing was fetched.
   Skipped,
   /// No further pages, or `reset` has not been called yet.
   Exhausted,
   /// A `reset` happened while this page was in flight; its rows were dropped.
   Superseded,
   /// The fetch failed; rows and offset are unchanged and `error` is set.
   Failed(QueryError),
}

#[derive(Default)]
struct PagerState {
   options: Option<FetchOptions>,
   rows: Vec<Row>,
   seen: HashSet<String>,
   offset: usize,
   has_more: bool,
   loading: bool,
   error: Option<QueryError>,
   generation: u64,
}

/// Load-more paginator over any [`RowSource`].
pub struct OffsetPaginator<S> {
   source: S,
   primary_key: String,
   page_size: usize,
   state: Mutex<PagerState>,
}

impl<S: RowSource> OffsetPaginator<S> {
   /// Create an idle paginator. Rows are de-duplicated on `primary_key`.
   pub fn new(source: S, primary_key: impl Into<String>, page_size: usize) -> Result<Self> {
      if page_size == 0 {
         return Err(Error::InvalidPageSize);
      }
      Ok(Self {
         source,
         primary_key: primary_key.into(),
         page_size,
         state: Mutex::new(PagerState::default()),
      })
   }

   pub fn page_size(&self) -> usize {
      self.page_size
   }

   /// Start over with `options` and load the first page.
   ///
   /// `limit` and `offset` in `options` are ignored; the paginator supplies them.
   pub async fn reset(&self, options: FetchOptions) -> FetchOutcome {
      let (generation, request) = {
         let mut state = self.state.lock();
         state.generation += 1;
         state.rows.clear();
         state.seen.clear();
         state.offset = 0;
         state.has_more = false;
         state.error = None;
         state.loading = true;
         let request = options.page(self.page_size, 0);
         state.options = Some(options);
         (state.generation, request)
      };

      debug!(table = %request.table, "pagination reset");
      self.fetch(generation, request).await
   }

   /// Load the page at the current offset.
   ///
   /// No-op while a page is loading or after the last page.
   pub async fn load_more(&self) -> FetchOutcome {
      let (generation, request) = {
         let mut state = self.state.lock();
         if state.loading {
            return FetchOutcome::Skipped;
         }
         if !state.has_more {
            return FetchOutcome::Exhausted;
         }
         let Some(options) = &state.options else {
            return FetchOutcome::Exhausted;
         };
         let request = options.page(self.page_size, state.offset);
         state.loading = true;
         (state.generation, request)
      };

      self.fetch(generation, request).await
   }

   pub fn snapshot(&self) -> PaginationState {
      let state = self.state.lock();
      PaginationState {
         rows: state.rows.clone(),
         offset: state.offset,
         has_more: state.has_more,
         loading: state.loading,
         error: state.error.clone(),
      }
   }

   pub fn len(&self) -> usize {
      self.state.lock().rows.len()
   }

   pub fn is_empty(&self) -> bool {
      self.state.lock().rows.is_empty()
   }

   pub fn has_more(&self) -> bool {
      self.state.lock().has_more
   }

   pub fn is_loading(&self) -> bool {
      self.state.lock().loading
   }

   async fn fetch(&self, generation: u64, request: FetchOptions) -> FetchOutcome {
      let mut in_flight = InFlight {
         state: &self.state,
         generation,
         armed: true,
      };
      let result = self.source.fetch_rows(&request).await;
      in_flight.armed = false;
      self.apply(generation, request.offset.unwrap_or(0), result)
   }

   fn apply(&self, generation: u64, offset: usize, result: Result<Vec<Row>>) -> FetchOutcome {
      let mut state = self.state.lock();
      if state.generation != generation {
         debug!(offset, "discarding superseded page");
         return FetchOutcome::Superseded;
      }
      state.loading = false;

      let rows = match result {
         Ok(rows) => rows,
         Err(err) => {
            warn!(offset, error = %err, "page fetch failed");
            let err = QueryError::from(err);
            state.error = Some(err.clone());
            return FetchOutcome::Failed(err);
         }
      };

      let fetched = rows.len();
      let mut appended = 0;
      for row in rows {
         let key = row
            .get(&self.primary_key)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string());
         if let Some(key) = key
            && !state.seen.insert(key)
         {
            continue;
         }
         state.rows.push(row);
         appended += 1;
      }

      state.offset += fetched;
      state.has_more = fetched == self.page_size;
      state.error = None;

      debug!(
         offset = state.offset,
         fetched,
         appended,
         has_more = state.has_more,
         "page applied"
      );
      FetchOutcome::Loaded { fetched, appended }
   }
}

/// Clears the in-flight flag if a fetch future is dropped before it completes.
struct InFlight<'a> {
   state: &'a Mutex<PagerState>,
   generation: u64,
   armed: bool,
}

impl Drop for InFlight<'_> {
   fn drop(&mut self) {
      if !self.armed {
         return;
      }
      let mut state = self.state.lock();
      if state.generation == self.generation {
         state.loading = false;
      }
   }
}
