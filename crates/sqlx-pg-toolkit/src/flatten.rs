//! Reshape decoded rows into flat, uniform export rows.
//!
//! A [`FlattenSpec`] names the output columns: basic columns copied from the
//! row, derived columns computed as the sum of other columns, and JSON sources
//! whose sub-fields become `{prefix}_{field}` columns. The spec is resolved
//! once per dataset into a [`FlatLayout`], which fixes the column set, so every
//! flattened row has exactly the same keys whatever its JSON payload holds.
//!
//! Cell values are strings or numbers. Objects and arrays are stringified as
//! JSON, booleans become `"true"`/`"false"`, and null or absent values become
//! the empty string.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

use crate::decode::Row;

/// One flattened output row.
pub type ExportRow = IndexMap<String, JsonValue>;

/// Which sub-fields of a JSON column to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonFields {
   /// Exactly these fields, in this order.
   Named(Vec<String>),
   /// The union of keys seen across the dataset, sorted.
   Discovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonSource {
   pub column: String,
   pub prefix: String,
   pub fields: JsonFields,
}

/// Column computed as the sum of stored columns (e.g. a cost total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColumn {
   pub name: String,
   pub sum_of: Vec<String>,
}

/// Output column configuration for an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenSpec {
   pub basic_columns: Vec<String>,
   pub derived: Vec<DerivedColumn>,
   pub json_sources: Vec<JsonSource>,
}

impl FlattenSpec {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn basic<I, T>(mut self, columns: I) -> Self
   where
      I: IntoIterator<Item = T>,
      T: Into<String>,
   {
      self.basic_columns.extend(columns.into_iter().map(Into::into));
      self
   }

   pub fn derived<I, T>(mut self, name: impl Into<String>, sum_of: I) -> Self
   where
      I: IntoIterator<Item = T>,
      T: Into<String>,
   {
      self.derived.push(DerivedColumn {
         name: name.into(),
         sum_of: sum_of.into_iter().map(Into::into).collect(),
      });
      self
   }

   pub fn json_source(
      mut self,
      column: impl Into<String>,
      prefix: impl Into<String>,
      fields: JsonFields,
   ) -> Self {
      self.json_sources.push(JsonSource {
         column: column.into(),
         prefix: prefix.into(),
         fields,
      });
      self
   }

   /// Fix the output columns for `rows`, discovering JSON keys where asked.
   pub fn layout(&self, rows: &[Row]) -> FlatLayout {
      let mut columns = Vec::new();

      for name in &self.basic_columns {
         // a derived column is computed, never copied
         if self.derived.iter().any(|d| &d.name == name) {
            continue;
         }
         columns.push(FlatColumn::Basic(name.clone()));
      }

      for derived in &self.derived {
         columns.push(FlatColumn::Derived(derived.clone()));
      }

      for source in &self.json_sources {
         let fields = match &source.fields {
            JsonFields::Named(fields) => fields.clone(),
            JsonFields::Discovered => discover_json_fields(rows, &source.column),
         };
         for field in fields {
            columns.push(FlatColumn::Json {
               key: format!("{}_{}", source.prefix, field),
               column: source.column.clone(),
               field,
            });
         }
      }

      FlatLayout { columns }
   }
}

#[derive(Debug, Clone, PartialEq)]
enum FlatColumn {
   Basic(String),
   Derived(DerivedColumn),
   Json {
      key: String,
      column: String,
      field: String,
   },
}

impl FlatColumn {
   fn key(&self) -> &str {
      match self {
         FlatColumn::Basic(name) => name,
         FlatColumn::Derived(derived) => &derived.name,
         FlatColumn::Json { key, .. } => key,
      }
   }
}

/// Resolved column set for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatLayout {
   columns: Vec<FlatColumn>,
}

impl FlatLayout {
   /// Output column names, in order.
   pub fn header(&self) -> Vec<String> {
      self.columns.iter().map(|c| c.key().to_string()).collect()
   }

   pub fn flatten_row(&self, row: &Row) -> ExportRow {
      let mut flat = ExportRow::with_capacity(self.columns.len());
      for column in &self.columns {
         let value = match column {
            FlatColumn::Basic(name) => cell(row.get(name)),
            FlatColumn::Derived(derived) => sum_columns(row, &derived.sum_of),
            FlatColumn::Json { column, field, .. } => {
               cell(json_object(row.get(column)).as_ref().and_then(|obj| obj.get(field)))
            }
         };
         flat.insert(column.key().to_string(), value);
      }
      flat
   }

   pub fn flatten_rows(&self, rows: &[Row]) -> Vec<ExportRow> {
      rows.iter().map(|row| self.flatten_row(row)).collect()
   }
}

/// Resolve `spec` against `rows` and flatten them; returns the header and the rows.
pub fn flatten_rows(spec: &FlattenSpec, rows: &[Row]) -> (Vec<String>, Vec<ExportRow>) {
   let layout = spec.layout(rows);
   (layout.header(), layout.flatten_rows(rows))
}

/// Union of the keys found in `column` across `rows`, sorted.
pub fn discover_json_fields(rows: &[Row], column: &str) -> Vec<String> {
   let mut keys = BTreeSet::new();
   for row in rows {
      if let Some(obj) = json_object(row.get(column)) {
         keys.extend(obj.keys().cloned());
      }
   }
   keys.into_iter().collect()
}

/// The object held by a JSON cell; a string holding a JSON object is parsed.
fn json_object(value: Option<&JsonValue>) -> Option<Map<String, JsonValue>> {
   match value? {
      JsonValue::Object(obj) => Some(obj.clone()),
      JsonValue::String(text) => match serde_json::from_str(text) {
         Ok(JsonValue::Object(obj)) => Some(obj),
         _ => None,
      },
      _ => None,
   }
}

fn cell(value: Option<&JsonValue>) -> JsonValue {
   match value {
      None | Some(JsonValue::Null) => JsonValue::String(String::new()),
      Some(JsonValue::Number(n)) => JsonValue::Number(n.clone()),
      Some(JsonValue::String(s)) => JsonValue::String(s.clone()),
      Some(JsonValue::Bool(b)) => JsonValue::String(b.to_string()),
      Some(other) => JsonValue::String(other.to_string()),
   }
}

/// Sum numeric (or numeric-string) columns; missing values count as zero.
///
/// The sum is rounded to six decimal places to drop float noise.
fn sum_columns(row: &Row, columns: &[String]) -> JsonValue {
   let total: f64 = columns
      .iter()
      .filter_map(|c| match row.get(c)? {
         JsonValue::Number(n) => n.as_f64(),
         JsonValue::String(s) => s.trim().parse().ok(),
         _ => None,
      })
      .sum();
   let rounded = (total * 1e6).round() / 1e6;
   Number::from_f64(rounded)
      .map(JsonValue::Number)
      .unwrap_or_else(|| JsonValue::String(String::new()))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn row(value: JsonValue) -> Row {
      serde_json::from_value(value).unwrap()
   }

   fn calls() -> Vec<Row> {
      vec![
         row(json!({
            "id": "c1",
            "duration_seconds": 61,
            "cost_transport": 0.01,
            "cost_llm": 0.1,
            "cost_tts": 0.2,
            "metadata": {"tag": "vip", "campaign": {"id": 7}},
            "metrics": {"latency": 1.5},
         })),
         row(json!({
            "id": "c2",
            "duration_seconds": 12,
            "cost_transport": null,
            "cost_llm": "0.05",
            "cost_tts": 0.0,
            "metadata": {"region": "eu"},
            "metrics": null,
         })),
      ]
   }

   #[test]
   fn absent_fields_are_present_and_empty() {
      let spec = FlattenSpec::new()
         .basic(["id"])
         .json_source("metadata", "meta", JsonFields::Named(vec!["tag".into()]));

      let (header, rows) = flatten_rows(&spec, &calls());

      assert_eq!(header, vec!["id", "meta_tag"]);
      assert_eq!(rows[0]["meta_tag"], json!("vip"));
      assert_eq!(rows[1]["meta_tag"], json!(""));
   }

   #[test]
   fn discovered_fields_form_a_uniform_key_set() {
      let spec = FlattenSpec::new()
         .basic(["id"])
         .json_source("metadata", "meta", JsonFields::Discovered)
         .json_source("metrics", "metric", JsonFields::Discovered);

      let (header, rows) = flatten_rows(&spec, &calls());

      assert_eq!(
         header,
         vec!["id", "meta_campaign", "meta_region", "meta_tag", "metric_latency"]
      );
      for flat in &rows {
         let keys: Vec<&String> = flat.keys().collect();
         assert_eq!(keys, header.iter().collect::<Vec<_>>());
      }
      assert_eq!(rows[1]["metric_latency"], json!(""));
   }

   #[test]
   fn nested_objects_are_stringified() {
      let spec = FlattenSpec::new().json_source(
         "metadata",
         "meta",
         JsonFields::Named(vec!["campaign".into()]),
      );
      let layout = spec.layout(&calls());
      let flat = layout.flatten_row(&calls()[0]);

      assert_eq!(flat["meta_campaign"], json!("{\"id\":7}"));
   }

   #[test]
   fn derived_column_is_computed_not_copied() {
      let spec = FlattenSpec::new()
         .basic(["id", "cost_total"])
         .derived("cost_total", ["cost_transport", "cost_llm", "cost_tts"]);

      let (header, rows) = flatten_rows(&spec, &calls());

      assert_eq!(header, vec!["id", "cost_total"]);
      assert_eq!(rows[0]["cost_total"], json!(0.31));
      assert_eq!(rows[1]["cost_total"], json!(0.05));
   }

   #[test]
   fn scalars_keep_numbers_and_blank_nulls() {
      assert_eq!(cell(Some(&json!(61))), json!(61));
      assert_eq!(cell(Some(&json!(null))), json!(""));
      assert_eq!(cell(None), json!(""));
      assert_eq!(cell(Some(&json!(true))), json!("true"));
      assert_eq!(cell(Some(&json!([1, 2]))), json!("[1,2]"));
   }

   #[test]
   fn json_text_cells_are_parsed() {
      let rows = vec![row(json!({"metadata": "{\"tag\":\"vip\"}"}))];
      assert_eq!(discover_json_fields(&rows, "metadata"), vec!["tag"]);
   }
}
