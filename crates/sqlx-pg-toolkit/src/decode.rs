//! PostgreSQL values to JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value as JsonValue};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgValueFormat, PgValueRef};
use sqlx::{Column, Decode, Postgres, Row as _, TypeInfo, ValueRef};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

/// Decoded row: column name to JSON value, in select order.
pub type Row = IndexMap<String, JsonValue>;

/// Decode PostgreSQL rows to ordered JSON maps.
pub(crate) fn decode_rows(rows: Vec<PgRow>) -> Result<Vec<Row>> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = IndexMap::default();
      for (i, column) in row.columns().iter().enumerate() {
         let v = row.try_get_raw(i)?;
         value.insert(column.name().to_string(), to_json(v)?);
      }
      values.push(value);
   }
   Ok(values)
}

/// Convert one raw value by its PostgreSQL type name.
pub(crate) fn to_json(v: PgValueRef<'_>) -> Result<JsonValue> {
   if v.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = v.type_info().name().to_string();
   let json = match type_name.as_str() {
      "BOOL" => JsonValue::Bool(decode::<bool>(v)?),
      "INT2" => JsonValue::from(decode::<i16>(v)?),
      "INT4" => JsonValue::from(decode::<i32>(v)?),
      "INT8" => JsonValue::from(decode::<i64>(v)?),
      "FLOAT4" => float(f64::from(decode::<f32>(v)?)),
      "FLOAT8" => float(decode::<f64>(v)?),
      "NUMERIC" => numeric(v)?,
      "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => JsonValue::String(decode::<String>(v)?),
      "JSON" | "JSONB" => decode::<JsonValue>(v)?,
      "UUID" => JsonValue::String(decode::<Uuid>(v)?.to_string()),
      "TIMESTAMPTZ" => JsonValue::String(timestamp(decode::<OffsetDateTime>(v)?)?),
      "TIMESTAMP" => JsonValue::String(timestamp(decode::<PrimitiveDateTime>(v)?.assume_utc())?),
      "DATE" => {
         let date = decode::<Date>(v)?;
         let text = date
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| Error::Other(e.to_string()))?;
         JsonValue::String(text)
      }
      "TIME" => JsonValue::String(time_of_day(decode::<Time>(v)?)?),
      "INTERVAL" => JsonValue::String(interval(&decode::<PgInterval>(v)?)),
      "BYTEA" => JsonValue::String(BASE64.encode(decode::<Vec<u8>>(v)?)),
      "TEXT[]" | "VARCHAR[]" => JsonValue::from(decode::<Vec<String>>(v)?),
      "BOOL[]" => JsonValue::from(decode::<Vec<bool>>(v)?),
      "INT2[]" => JsonValue::from(decode::<Vec<i16>>(v)?),
      "INT4[]" => JsonValue::from(decode::<Vec<i32>>(v)?),
      "INT8[]" => JsonValue::from(decode::<Vec<i64>>(v)?),
      "FLOAT4[]" => {
         let items = decode::<Vec<f32>>(v)?;
         JsonValue::Array(items.into_iter().map(|f| float(f64::from(f))).collect())
      }
      "FLOAT8[]" => JsonValue::Array(decode::<Vec<f64>>(v)?.into_iter().map(float).collect()),
      "NUMERIC[]" => {
         let items = decode::<Vec<Decimal>>(v)?;
         JsonValue::Array(items.into_iter().map(decimal).collect())
      }
      "UUID[]" => {
         let items = decode::<Vec<Uuid>>(v)?;
         JsonValue::Array(items.iter().map(|id| JsonValue::String(id.to_string())).collect())
      }
      "JSON[]" | "JSONB[]" => JsonValue::Array(decode::<Vec<JsonValue>>(v)?),
      _ => return Err(Error::UnsupportedDatatype(type_name)),
   };
   Ok(json)
}

fn decode<'r, T: Decode<'r, Postgres>>(v: PgValueRef<'r>) -> Result<T> {
   T::decode(v).map_err(|e| Error::Sqlx(sqlx::Error::Decode(e)))
}

fn float(value: f64) -> JsonValue {
   Number::from_f64(value)
      .map(JsonValue::Number)
      .unwrap_or(JsonValue::Null)
}

/// NUMERIC through `Decimal`, falling back to the exact text for values
/// `Decimal` cannot hold (`NaN`, infinities, more than 28 digits).
fn numeric(v: PgValueRef<'_>) -> Result<JsonValue> {
   let format = v.format();
   let raw = v.as_bytes().ok();
   let err = match decode::<Decimal>(v) {
      Ok(value) => return Ok(decimal(value)),
      Err(err) => err,
   };
   let text = raw.and_then(|bytes| match format {
      PgValueFormat::Binary => numeric_text(bytes),
      PgValueFormat::Text => std::str::from_utf8(bytes).ok().map(str::to_string),
   });
   let Some(text) = text else {
      return Err(err);
   };
   warn!(value = %text, "NUMERIC outside Decimal range, returned as text");
   Ok(JsonValue::String(text))
}

/// Render the binary NUMERIC wire form (base-10000 digit groups) as text.
fn numeric_text(bytes: &[u8]) -> Option<String> {
   let word = |i: usize| {
      let b = bytes.get(i * 2..i * 2 + 2)?;
      Some(i16::from_be_bytes([b[0], b[1]]))
   };
   let ndigits = usize::try_from(word(0)?).ok()?;
   let weight = i32::from(word(1)?);
   let sign = word(2)? as u16;
   let dscale = usize::try_from(word(3)?).ok()?;
   let digits = (0..ndigits)
      .map(|i| word(4 + i))
      .collect::<Option<Vec<i16>>>()?;
   let group = |k: i32| {
      usize::try_from(k)
         .ok()
         .and_then(|k| digits.get(k).copied())
         .unwrap_or(0)
   };

   let negative = match sign {
      0x0000 => false,
      0x4000 => true,
      0xC000 => return Some("NaN".to_string()),
      0xD000 => return Some("Infinity".to_string()),
      0xF000 => return Some("-Infinity".to_string()),
      _ => return None,
   };

   let mut int = String::new();
   for k in 0..=weight {
      if int.is_empty() {
         int = group(k).to_string();
      } else {
         int.push_str(&format!("{:04}", group(k)));
      }
   }
   if int.is_empty() {
      int.push('0');
   }

   let mut frac = String::new();
   let mut k = weight + 1;
   while frac.len() < dscale {
      frac.push_str(&format!("{:04}", group(k)));
      k += 1;
   }
   frac.truncate(dscale);

   let mut text = String::new();
   if negative {
      text.push('-');
   }
   text.push_str(&int);
   if !frac.is_empty() {
      text.push('.');
      text.push_str(&frac);
   }
   Some(text)
}

/// NUMERIC as a JSON number; integral values stay integers.
fn decimal(value: Decimal) -> JsonValue {
   if value.fract().is_zero()
      && let Some(int) = value.to_i64()
   {
      return JsonValue::from(int);
   }
   match value.to_f64() {
      Some(f) => float(f),
      None => JsonValue::String(value.to_string()),
   }
}

fn timestamp(value: OffsetDateTime) -> Result<String> {
   value
      .format(&Rfc3339)
      .map_err(|e| Error::Other(e.to_string()))
}

/// `HH:MM:SS`, with microseconds only when present.
fn time_of_day(value: Time) -> Result<String> {
   let formatted = if value.nanosecond() == 0 {
      value.format(format_description!("[hour]:[minute]:[second]"))
   } else {
      value.format(format_description!(
         "[hour]:[minute]:[second].[subsecond digits:6]"
      ))
   };
   formatted.map_err(|e| Error::Other(e.to_string()))
}

/// ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`; components keep their sign.
fn interval(value: &PgInterval) -> String {
   let years = value.months / 12;
   let months = value.months % 12;
   let hours = value.microseconds / 3_600_000_000;
   let minutes = (value.microseconds % 3_600_000_000) / 60_000_000;
   let micros = value.microseconds % 60_000_000;

   let mut text = String::from("P");
   for (amount, unit) in [(years, 'Y'), (months, 'M'), (value.days, 'D')] {
      if amount != 0 {
         text.push_str(&format!("{amount}{unit}"));
      }
   }
   if hours != 0 || minutes != 0 || micros != 0 {
      text.push('T');
      if hours != 0 {
         text.push_str(&format!("{hours}H"));
      }
      if minutes != 0 {
         text.push_str(&format!("{minutes}M"));
      }
      if micros != 0 {
         let sign = if micros < 0 { "-" } else { "" };
         let abs = micros.unsigned_abs();
         let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
         if frac == 0 {
            text.push_str(&format!("{sign}{secs}S"));
         } else {
            let frac = format!("{frac:06}");
            text.push_str(&format!("{sign}{secs}.{}S", frac.trim_end_matches('0')));
         }
      }
   }
   if text.len() == 1 {
      text.push_str("T0S");
   }
   text
}
