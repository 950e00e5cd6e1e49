//! Row decoding and parameter binding between SQLite and JSON values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteArguments, SqliteRow, SqliteValueRef};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, Value, ValueRef};

use crate::{Error, Result};

/// A decoded result row: column name to value, in select-list order.
pub type Row = IndexMap<String, JsonValue>;

type Query<'a> = sqlx::query::Query<'a, Sqlite, SqliteArguments<'a>>;

/// Build a query and bind positional parameters in order.
pub(crate) fn bind_all(sql: &str, values: Vec<JsonValue>) -> Query<'_> {
   let mut q = sqlx::query(sql);
   for value in values {
      q = bind_value(q, value);
   }
   q
}

/// Helper function to bind a JSON value to a SQLx query
pub(crate) fn bind_value(query: Query<'_>, value: JsonValue) -> Query<'_> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Value too large for i64, use f64 (will lose precision)
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}

/// Decode SQLite rows to JSON maps.
pub(crate) fn decode_rows(rows: Vec<SqliteRow>, lowercase_keys: bool) -> Result<Vec<Row>> {
   rows
      .into_iter()
      .map(|row| decode_row(&row, lowercase_keys))
      .collect()
}

pub(crate) fn decode_row(row: &SqliteRow, lowercase_keys: bool) -> Result<Row> {
   let mut value = IndexMap::default();
   for (i, column) in row.columns().iter().enumerate() {
      let v = to_json(row.try_get_raw(i)?)?;
      let name = if lowercase_keys {
         column.name().to_lowercase()
      } else {
         column.name().to_string()
      };
      value.insert(name, v);
   }
   Ok(value)
}

/// Map one SQLite value to JSON using its storage class.
fn to_json(v: SqliteValueRef<'_>) -> Result<JsonValue> {
   if v.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = v.type_info().name().to_string();
   let owned = ValueRef::to_owned(&v);
   let json = match type_name.as_str() {
      "TEXT" => JsonValue::String(owned.try_decode::<String>()?),
      "INTEGER" => JsonValue::from(owned.try_decode::<i64>()?),
      "REAL" => serde_json::Number::from_f64(owned.try_decode::<f64>()?)
         .map(JsonValue::Number)
         .unwrap_or(JsonValue::Null),
      "BLOB" => JsonValue::String(STANDARD.encode(owned.try_decode::<Vec<u8>>()?)),
      "NULL" => JsonValue::Null,
      _ => return Err(Error::UnsupportedDatatype(type_name)),
   };
   Ok(json)
}
