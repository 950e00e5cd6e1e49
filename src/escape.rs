//! SQL literal escaping for values that cannot be bound as parameters.

use serde_json::Value as JsonValue;

/// Render `value` as an SQL literal.
///
/// Strings are single-quoted with embedded quotes doubled, booleans become
/// `1`/`0`, and arrays or objects are quoted as JSON text. Prefer bound
/// parameters wherever the statement allows them.
pub fn escape(value: &JsonValue) -> String {
   match value {
      JsonValue::Null => "NULL".to_string(),
      JsonValue::Bool(b) => u8::from(*b).to_string(),
      JsonValue::Number(n) => n.to_string(),
      JsonValue::String(s) => quote(s),
      other => quote(&other.to_string()),
   }
}

fn quote(s: &str) -> String {
   format!("'{}'", s.replace('\'', "''"))
}
