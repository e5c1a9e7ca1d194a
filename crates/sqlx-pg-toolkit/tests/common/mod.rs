//! In-memory row source shared by the engine tests.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use sqlx_pg_toolkit::{Error, FetchOptions, Result, Row, RowSource};

/// Ordered rows served by offset/limit, recording every request.
#[derive(Default)]
pub struct MemoryTable {
   rows: Mutex<Vec<Row>>,
   calls: Mutex<Vec<FetchOptions>>,
   fail_on_call: Mutex<Option<usize>>,
   delay: Mutex<Option<Duration>>,
}

impl MemoryTable {
   /// Rows with `id` 0..n and a `name` column.
   pub fn with_ids(n: usize) -> Self {
      let _ = tracing_subscriber::fmt().with_test_writer().try_init();
      let table = Self::default();
      *table.rows.lock() = (0..n).map(call_row).collect();
      table
   }

   /// Insert a row at the head, shifting every later row down by one.
   pub fn prepend(&self, row: Row) {
      self.rows.lock().insert(0, row);
   }

   /// Fail the n-th request (1-based) with a driver-like error.
   pub fn fail_on_call(&self, n: usize) {
      *self.fail_on_call.lock() = Some(n);
   }

   /// Sleep this long inside every request.
   pub fn set_delay(&self, delay: Duration) {
      *self.delay.lock() = Some(delay);
   }

   pub fn calls(&self) -> Vec<FetchOptions> {
      self.calls.lock().clone()
   }

   /// `(limit, offset)` of each request, in order.
   pub fn pages(&self) -> Vec<(usize, usize)> {
      self
         .calls
         .lock()
         .iter()
         .map(|o| (o.limit.unwrap_or(0), o.offset.unwrap_or(0)))
         .collect()
   }
}

#[async_trait]
impl RowSource for MemoryTable {
   async fn fetch_rows(&self, options: &FetchOptions) -> Result<Vec<Row>> {
      let call_number = {
         let mut calls = self.calls.lock();
         calls.push(options.clone());
         calls.len()
      };

      let delay = *self.delay.lock();
      if let Some(delay) = delay {
         tokio::time::sleep(delay).await;
      }

      if *self.fail_on_call.lock() == Some(call_number) {
         return Err(Error::Other("connection reset by peer".into()));
      }

      let offset = options.offset.unwrap_or(0);
      let limit = options.limit.unwrap_or(usize::MAX);
      Ok(self
         .rows
         .lock()
         .iter()
         .skip(offset)
         .take(limit)
         .cloned()
         .collect())
   }
}

pub fn call_row(id: usize) -> Row {
   let mut row = Row::new();
   row.insert("id".into(), json!(id));
   row.insert("status".into(), json!(if id % 2 == 0 { "completed" } else { "failed" }));
   row
}

/// The `id` column of each row.
pub fn ids(rows: &[Row]) -> Vec<u64> {
   rows.iter().map(|r| r["id"].as_u64().unwrap()).collect()
}
