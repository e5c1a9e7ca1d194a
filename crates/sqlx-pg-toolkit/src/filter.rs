//! Filter rules and their translation into compiled predicates.
//!
//! A [`FilterRule`] is what a filter builder produces: a column, an operation
//! name, a user-typed value and, for JSON columns, the sub-field to address.
//! [`translate`] turns a list of rules into [`CompiledFilter`]s for one table,
//! always starting with the caller's scope predicate.
//!
//! Translation is lenient. A rule that cannot be compiled (unknown column or
//! operation, missing value, value of the wrong type) is logged and dropped,
//! and the query runs without it. Only an invalid scope is an error, so an
//! unscoped query can never be produced.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use crate::compiler::{ColumnExpr, CompiledFilter, FilterOperator};
use crate::schema::{ColumnKind, TableSchema, coerce_text, parse_date};
use crate::value::SqlValue;
use crate::{Error, Result};

/// Operation named by a filter rule.
///
/// Unrecognized names deserialize to `Unknown` instead of failing, so a bad
/// rule is dropped by the translator rather than rejecting the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperation {
   Equals,
   Contains,
   StartsWith,
   GreaterThan,
   LessThan,
   JsonEquals,
   JsonContains,
   JsonExists,
   Unknown(String),
}

impl FilterOperation {
   pub fn as_str(&self) -> &str {
      match self {
         FilterOperation::Equals => "equals",
         FilterOperation::Contains => "contains",
         FilterOperation::StartsWith => "starts_with",
         FilterOperation::GreaterThan => "greater_than",
         FilterOperation::LessThan => "less_than",
         FilterOperation::JsonEquals => "json_equals",
         FilterOperation::JsonContains => "json_contains",
         FilterOperation::JsonExists => "json_exists",
         FilterOperation::Unknown(name) => name,
      }
   }

   /// Whether the operation needs a user value.
   pub fn takes_value(&self) -> bool {
      *self != FilterOperation::JsonExists
   }
}

impl From<String> for FilterOperation {
   fn from(name: String) -> Self {
      match name.as_str() {
         "equals" => FilterOperation::Equals,
         "contains" => FilterOperation::Contains,
         "starts_with" => FilterOperation::StartsWith,
         "greater_than" => FilterOperation::GreaterThan,
         "less_than" => FilterOperation::LessThan,
         "json_equals" => FilterOperation::JsonEquals,
         "json_contains" => FilterOperation::JsonContains,
         "json_exists" => FilterOperation::JsonExists,
         _ => FilterOperation::Unknown(name),
      }
   }
}

impl From<&str> for FilterOperation {
   fn from(name: &str) -> Self {
      FilterOperation::from(name.to_string())
   }
}

impl From<FilterOperation> for String {
   fn from(op: FilterOperation) -> Self {
      op.as_str().to_string()
   }
}

impl fmt::Display for FilterOperation {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// One declarative predicate from a filter builder. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
   pub id: String,
   pub column: String,
   pub operation: FilterOperation,
   #[serde(default)]
   pub value: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub json_field: Option<String>,
}

impl FilterRule {
   pub fn new(
      id: impl Into<String>,
      column: impl Into<String>,
      operation: impl Into<FilterOperation>,
      value: impl Into<String>,
   ) -> Self {
      Self {
         id: id.into(),
         column: column.into(),
         operation: operation.into(),
         value: value.into(),
         json_field: None,
      }
   }

   pub fn json_field(mut self, field: impl Into<String>) -> Self {
      self.json_field = Some(field.into());
      self
   }
}

/// Mandatory scoping predicate, e.g. "belongs to agent X".
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
   pub column: String,
   pub value: SqlValue,
}

impl Scope {
   pub fn new(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
      Self {
         column: column.into(),
         value: value.into(),
      }
   }

   /// Compile the scope against `schema`; text values are coerced to the column kind.
   pub fn compile(&self, schema: &TableSchema) -> Result<CompiledFilter> {
      let kind = schema.check_column(&self.column)?;
      let value = match &self.value {
         SqlValue::Null => {
            return Err(Error::InvalidValue {
               column: self.column.clone(),
               expected: "non-null scope value",
               value: "null".into(),
            });
         }
         SqlValue::Text(text) => coerce_text(kind, text).ok_or_else(|| Error::InvalidValue {
            column: self.column.clone(),
            expected: kind.as_str(),
            value: text.clone(),
         })?,
         other => other.clone(),
      };
      CompiledFilter::eq(&self.column, value)
   }
}

/// Why a rule was dropped.
#[derive(Debug, thiserror::Error)]
enum Rejection {
   #[error("unsupported operation '{0}'")]
   UnsupportedOperation(String),

   #[error("operation '{operation}' does not apply to {kind} columns")]
   NotApplicable {
      operation: String,
      kind: ColumnKind,
   },

   #[error("a value is required")]
   MissingValue,

   #[error("JSON column requires a jsonField")]
   MissingJsonField,

   #[error("'{value}' is not a valid {expected}")]
   InvalidValue {
      value: String,
      expected: &'static str,
   },

   #[error(transparent)]
   Catalog(#[from] Error),
}

/// Translate `rules` for `schema`, scope predicate first.
///
/// Rules that cannot be compiled are dropped with a warning. A date `equals`
/// yields two predicates; every other kept rule yields one.
///
/// Date rules work on UTC calendar days: the bounds are bound as
/// `timestamptz` values at offset zero, so `equals 2024-03-01` covers
/// `2024-03-01T00:00:00Z` through `2024-03-01T23:59:59.999999Z`. A timestamp
/// value contributes only its written date; its offset is ignored. Callers
/// wanting a local day should convert the date to UTC before building the rule.
pub fn translate(
   schema: &TableSchema,
   scope: &Scope,
   rules: &[FilterRule],
) -> Result<Vec<CompiledFilter>> {
   let mut compiled = vec![scope.compile(schema)?];

   for rule in rules {
      match translate_rule(schema, rule) {
         Ok(filters) => compiled.extend(filters),
         Err(reason) => warn!(
            table = schema.name(),
            rule = %rule.id,
            column = %rule.column,
            operation = %rule.operation,
            "dropping filter rule: {}",
            reason
         ),
      }
   }

   debug!(
      table = schema.name(),
      rules = rules.len(),
      compiled = compiled.len(),
      "translated filter rules"
   );
   Ok(compiled)
}

fn translate_rule(
   schema: &TableSchema,
   rule: &FilterRule,
) -> std::result::Result<Vec<CompiledFilter>, Rejection> {
   if let FilterOperation::Unknown(name) = &rule.operation {
      return Err(Rejection::UnsupportedOperation(name.clone()));
   }

   let kind = schema.check_column(&rule.column)?;
   if rule.operation.takes_value() && rule.value.is_empty() {
      return Err(Rejection::MissingValue);
   }

   if kind.is_json() {
      json_rule(rule)
   } else if kind.is_date() {
      date_rule(rule, kind)
   } else {
      plain_rule(rule, kind)
   }
}

fn json_rule(rule: &FilterRule) -> std::result::Result<Vec<CompiledFilter>, Rejection> {
   let column = rule.column.as_str();
   let field = rule.json_field.as_deref().filter(|f| !f.is_empty());
   let required = || field.ok_or(Rejection::MissingJsonField);
   let value = rule.value.as_str();

   let filter = match &rule.operation {
      FilterOperation::JsonExists => match field {
         Some(field) => CompiledFilter::not_null(ColumnExpr::json_raw(column, field)?),
         None => CompiledFilter::not_null(ColumnExpr::plain(column)?),
      },
      FilterOperation::Equals | FilterOperation::JsonEquals => CompiledFilter::new(
         ColumnExpr::json_text(column, required()?)?,
         FilterOperator::Eq,
         value,
      ),
      FilterOperation::Contains | FilterOperation::JsonContains => CompiledFilter::new(
         ColumnExpr::json_text(column, required()?)?,
         FilterOperator::Ilike,
         format!("%{}%", escape_like(value)),
      ),
      FilterOperation::StartsWith => CompiledFilter::new(
         ColumnExpr::json_text(column, required()?)?,
         FilterOperator::Ilike,
         format!("{}%", escape_like(value)),
      ),
      FilterOperation::GreaterThan => CompiledFilter::new(
         ColumnExpr::json_numeric(column, required()?)?,
         FilterOperator::Gt,
         parse_number(value)?,
      ),
      FilterOperation::LessThan => CompiledFilter::new(
         ColumnExpr::json_numeric(column, required()?)?,
         FilterOperator::Lt,
         parse_number(value)?,
      ),
      FilterOperation::Unknown(name) => {
         return Err(Rejection::UnsupportedOperation(name.clone()));
      }
   };
   Ok(vec![filter])
}

fn date_rule(
   rule: &FilterRule,
   kind: ColumnKind,
) -> std::result::Result<Vec<CompiledFilter>, Rejection> {
   let column = || ColumnExpr::plain(rule.column.as_str());

   let filters = match &rule.operation {
      FilterOperation::Equals => {
         let day = parse_day(&rule.value)?;
         vec![
            CompiledFilter::new(column()?, FilterOperator::Gte, day_start(day)),
            CompiledFilter::new(column()?, FilterOperator::Lte, day_end(day)),
         ]
      }
      FilterOperation::GreaterThan => {
         let day = parse_day(&rule.value)?;
         let next = day.next_day().ok_or_else(|| Rejection::InvalidValue {
            value: rule.value.clone(),
            expected: "date",
         })?;
         vec![CompiledFilter::new(
            column()?,
            FilterOperator::Gte,
            day_start(next),
         )]
      }
      FilterOperation::LessThan => {
         let day = parse_day(&rule.value)?;
         vec![CompiledFilter::new(
            column()?,
            FilterOperator::Lt,
            day_start(day),
         )]
      }
      other => return Err(not_applicable(other, kind)),
   };
   Ok(filters)
}

fn plain_rule(
   rule: &FilterRule,
   kind: ColumnKind,
) -> std::result::Result<Vec<CompiledFilter>, Rejection> {
   let column = ColumnExpr::plain(rule.column.as_str())?;
   let value = rule.value.as_str();

   let filter = match &rule.operation {
      FilterOperation::Equals => {
         CompiledFilter::new(column, FilterOperator::Eq, coerce(kind, value)?)
      }
      FilterOperation::GreaterThan => {
         CompiledFilter::new(column, FilterOperator::Gt, coerce(kind, value)?)
      }
      FilterOperation::LessThan => {
         CompiledFilter::new(column, FilterOperator::Lt, coerce(kind, value)?)
      }
      FilterOperation::Contains if kind == ColumnKind::Text => CompiledFilter::new(
         column,
         FilterOperator::Ilike,
         format!("%{}%", escape_like(value)),
      ),
      FilterOperation::StartsWith if kind == ColumnKind::Text => CompiledFilter::new(
         column,
         FilterOperator::Ilike,
         format!("{}%", escape_like(value)),
      ),
      other => return Err(not_applicable(other, kind)),
   };
   Ok(vec![filter])
}

fn not_applicable(operation: &FilterOperation, kind: ColumnKind) -> Rejection {
   Rejection::NotApplicable {
      operation: operation.to_string(),
      kind,
   }
}

fn coerce(kind: ColumnKind, value: &str) -> std::result::Result<SqlValue, Rejection> {
   coerce_text(kind, value).ok_or_else(|| Rejection::InvalidValue {
      value: value.to_string(),
      expected: kind.as_str(),
   })
}

fn parse_number(value: &str) -> std::result::Result<f64, Rejection> {
   value
      .trim()
      .parse::<f64>()
      .ok()
      .filter(|n| n.is_finite())
      .ok_or_else(|| Rejection::InvalidValue {
         value: value.to_string(),
         expected: "number",
      })
}

fn parse_day(value: &str) -> std::result::Result<Date, Rejection> {
   parse_date(value).ok_or_else(|| Rejection::InvalidValue {
      value: value.to_string(),
      expected: "date",
   })
}

fn day_start(day: Date) -> OffsetDateTime {
   day.midnight().assume_utc()
}

fn day_end(day: Date) -> OffsetDateTime {
   // 23:59:59.999999 is always a valid time
   day.with_hms_micro(23, 59, 59, 999_999)
      .map(|dt| dt.assume_utc())
      .unwrap_or_else(|_| day_start(day))
}

/// Escape LIKE metacharacters (`\`, `%`, `_`) in user input.
pub fn escape_like(value: &str) -> String {
   value
      .replace('\\', "\\\\")
      .replace('%', "\\%")
      .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::compiler::{FetchOptions, build_select};
   use time::macros::datetime;

   fn calls() -> TableSchema {
      TableSchema::new("call_logs", "id")
         .column("id", ColumnKind::Uuid)
         .column("agent_id", ColumnKind::Text)
         .column("call_started_at", ColumnKind::Timestamp)
         .column("duration_seconds", ColumnKind::Integer)
         .column("cost_llm", ColumnKind::Numeric)
         .column("status", ColumnKind::Text)
         .column("metadata", ColumnKind::Json)
         .column("metrics", ColumnKind::Json)
   }

   fn scope() -> Scope {
      Scope::new("agent_id", "agent-1")
   }

   fn rule(column: &str, op: &str, value: &str) -> FilterRule {
      FilterRule::new("r1", column, op, value)
   }

   fn render(filters: Vec<CompiledFilter>) -> (String, Vec<SqlValue>) {
      let stmt = build_select(&FetchOptions::new("call_logs", "*").filters(filters)).unwrap();
      let sql = stmt.sql.trim_start_matches("SELECT * FROM call_logs WHERE ").to_string();
      (sql, stmt.values)
   }

   fn translate_one(rule: FilterRule) -> Vec<CompiledFilter> {
      let mut filters = translate(&calls(), &scope(), &[rule]).unwrap();
      assert_eq!(filters.remove(0), CompiledFilter::eq("agent_id", "agent-1").unwrap());
      filters
   }

   // ─── wire format ───

   #[test]
   fn rule_deserializes_camel_case() {
      let json = r#"{"id":"f1","column":"metadata","operation":"json_contains","value":"vip","jsonField":"tag"}"#;
      let rule: FilterRule = serde_json::from_str(json).unwrap();

      assert_eq!(rule.operation, FilterOperation::JsonContains);
      assert_eq!(rule.json_field.as_deref(), Some("tag"));
   }

   #[test]
   fn unknown_operation_deserializes_leniently() {
      let json = r#"{"id":"f1","column":"status","operation":"between"}"#;
      let rule: FilterRule = serde_json::from_str(json).unwrap();

      assert_eq!(rule.operation, FilterOperation::Unknown("between".into()));
      assert_eq!(rule.value, "");
      assert_eq!(
         serde_json::to_value(&rule).unwrap()["operation"],
         serde_json::json!("between")
      );
   }

   // ─── scenarios ───

   #[test]
   fn greater_than_on_plain_integer_column() {
      let filters = translate_one(rule("duration_seconds", "greater_than", "60"));
      let (sql, values) = render(filters);

      assert_eq!(sql, "duration_seconds > $1");
      assert_eq!(values, vec![SqlValue::Int(60)]);
   }

   #[test]
   fn json_contains_uses_text_form() {
      let filters = translate_one(rule("metadata", "json_contains", "vip").json_field("tag"));
      let (sql, values) = render(filters);

      assert_eq!(sql, "metadata->>'tag' ILIKE $1");
      assert_eq!(values, vec![SqlValue::Text("%vip%".into())]);
   }

   #[test]
   fn date_equals_covers_whole_day() {
      let filters = translate_one(rule("call_started_at", "equals", "2024-03-01"));
      let (sql, values) = render(filters);

      assert_eq!(sql, "call_started_at >= $1 AND call_started_at <= $2");
      assert_eq!(
         values,
         vec![
            SqlValue::Timestamp(datetime!(2024-03-01 0:00 UTC)),
            SqlValue::Timestamp(datetime!(2024-03-01 23:59:59.999999 UTC)),
         ]
      );
   }

   #[test]
   fn date_bounds_have_no_midnight_gap() {
      let after = translate_one(rule("call_started_at", "greater_than", "2024-02-29"));
      let before = translate_one(rule("call_started_at", "less_than", "2024-03-01"));
      let on = translate_one(rule("call_started_at", "equals", "2024-03-01"));

      assert_eq!(after[0].operator, FilterOperator::Gte);
      assert_eq!(
         after[0].value,
         Some(SqlValue::Timestamp(datetime!(2024-03-01 0:00 UTC)))
      );
      assert_eq!(before[0].operator, FilterOperator::Lt);
      assert_eq!(before[0].value, on[0].value);
   }

   #[test]
   fn date_value_accepts_timestamp_text() {
      let filters = translate_one(rule("call_started_at", "equals", "2024-03-01T18:45:00Z"));
      assert_eq!(
         filters[0].value,
         Some(SqlValue::Timestamp(datetime!(2024-03-01 0:00 UTC)))
      );
   }

   #[test]
   fn day_bounds_are_utc_whatever_the_value_offset() {
      let filters = translate_one(rule("call_started_at", "equals", "2024-03-01T23:30:00-05:00"));

      let bounds: Vec<_> = filters
         .iter()
         .map(|f| match &f.value {
            Some(SqlValue::Timestamp(ts)) => *ts,
            other => panic!("expected a timestamp bound, got {other:?}"),
         })
         .collect();
      assert_eq!(bounds[0], datetime!(2024-03-01 0:00 UTC));
      assert_eq!(bounds[1], datetime!(2024-03-01 23:59:59.999999 UTC));
      assert!(bounds.iter().all(|ts| ts.offset().is_utc()));
   }

   // ─── JSON operations ───

   #[test]
   fn json_equals_and_starts_with() {
      let (sql, values) = render(translate_one(
         rule("metadata", "json_equals", "inbound").json_field("direction"),
      ));
      assert_eq!(sql, "metadata->>'direction' = $1");
      assert_eq!(values, vec![SqlValue::Text("inbound".into())]);

      let (sql, values) = render(translate_one(
         rule("metadata", "starts_with", "camp_").json_field("campaign"),
      ));
      assert_eq!(sql, "metadata->>'campaign' ILIKE $1");
      assert_eq!(values, vec![SqlValue::Text("camp\\_%".into())]);
   }

   #[test]
   fn json_keys_with_spaces_and_dots_are_kept() {
      let (sql, values) = render(translate_one(
         rule("metadata", "json_equals", "Ada Lovelace").json_field("customer name"),
      ));
      assert_eq!(sql, "metadata->>'customer name' = $1");
      assert_eq!(values, vec![SqlValue::Text("Ada Lovelace".into())]);

      let (sql, values) = render(translate_one(
         rule("metrics", "greater_than", "200").json_field("llm.latency_ms"),
      ));
      assert_eq!(sql, "(metrics->'llm.latency_ms')::numeric > $1");
      assert_eq!(values, vec![SqlValue::Float(200.0)]);
   }

   #[test]
   fn json_numeric_comparisons_cast_raw_form() {
      let (sql, values) = render(translate_one(
         rule("metrics", "greater_than", "1.5").json_field("latency"),
      ));
      assert_eq!(sql, "(metrics->'latency')::numeric > $1");
      assert_eq!(values, vec![SqlValue::Float(1.5)]);

      let (sql, _) = render(translate_one(
         rule("metrics", "less_than", "3").json_field("turns"),
      ));
      assert_eq!(sql, "(metrics->'turns')::numeric < $1");
   }

   #[test]
   fn json_exists_binds_no_value() {
      let filters = translate_one(rule("metadata", "json_exists", "").json_field("tag"));
      assert!(!filters[0].binds_value());

      let (sql, values) = render(filters);
      assert_eq!(sql, "metadata->'tag' IS NOT NULL");
      assert!(values.is_empty());
   }

   #[test]
   fn json_exists_without_field_checks_column() {
      let (sql, _) = render(translate_one(rule("metadata", "json_exists", "")));
      assert_eq!(sql, "metadata IS NOT NULL");
   }

   #[test]
   fn every_other_json_operation_binds_one_value() {
      for op in ["equals", "contains", "starts_with", "greater_than", "less_than", "json_equals", "json_contains"] {
         let filters = translate_one(rule("metrics", op, "2").json_field("score"));
         assert_eq!(filters.len(), 1, "{op}");
         assert!(filters[0].binds_value(), "{op}");
      }
   }

   // ─── plain text supplements ───

   #[test]
   fn contains_on_text_column_escapes_wildcards() {
      let (sql, values) = render(translate_one(rule("status", "contains", "100%")));
      assert_eq!(sql, "status ILIKE $1");
      assert_eq!(values, vec![SqlValue::Text("%100\\%%".into())]);
   }

   #[test]
   fn escape_like_metacharacters() {
      assert_eq!(escape_like("plain"), "plain");
      assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
   }

   // ─── dropped rules ───

   #[test]
   fn invalid_rules_are_dropped() {
      let rules = vec![
         rule("status", "between", "a"),
         rule("password", "equals", "x"),
         rule("duration_seconds", "equals", ""),
         rule("duration_seconds", "equals", "long"),
         rule("metadata", "json_equals", "vip"),
         rule("metadata", "json_equals", "vip").json_field("bad\0field"),
         rule("status", "json_exists", ""),
         rule("duration_seconds", "contains", "6"),
         rule("call_started_at", "contains", "2024"),
         rule("call_started_at", "equals", "March 1st"),
         rule("metrics", "greater_than", "fast").json_field("latency"),
      ];

      let filters = translate(&calls(), &scope(), &rules).unwrap();

      assert_eq!(filters.len(), 1);
      assert_eq!(filters[0], CompiledFilter::eq("agent_id", "agent-1").unwrap());
   }

   #[test]
   fn compiled_count_is_kept_rules_plus_scope() {
      let rules = vec![
         rule("status", "equals", "completed"),
         rule("status", "sounds_like", "x"),
         rule("metadata", "json_exists", "").json_field("tag"),
         rule("call_started_at", "equals", "2024-03-01"),
         rule("cost_llm", "less_than", "0.25"),
      ];

      let filters = translate(&calls(), &scope(), &rules).unwrap();

      // 3 single-predicate rules, one date equals (2), one dropped, plus scope
      assert_eq!(filters.len(), 1 + 3 + 2);
      assert_eq!(filters[0].column, ColumnExpr::Plain("agent_id".into()));
   }

   // ─── scope ───

   #[test]
   fn scope_is_required_and_validated() {
      let schema = calls();
      assert!(translate(&schema, &Scope::new("owner", "x"), &[]).is_err());
      assert!(translate(&schema, &Scope::new("agent_id", SqlValue::Null), &[]).is_err());
      assert!(translate(&schema, &Scope::new("id", "not-a-uuid"), &[]).is_err());

      let filters = translate(&schema, &scope(), &[]).unwrap();
      assert_eq!(filters.len(), 1);
   }

   #[test]
   fn scope_text_is_coerced_to_column_kind() {
      let id = "8c1f3bd4-6d5e-4b36-9d0a-2f3e4b5c6d7e";
      let filters = translate(&calls(), &Scope::new("id", id), &[]).unwrap();
      assert_eq!(
         filters[0].value,
         Some(SqlValue::Uuid(uuid::Uuid::parse_str(id).unwrap()))
      );
   }
}
