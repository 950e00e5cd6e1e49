//! Catalog inspection.
//!
//! Every check is a read-only query on the connection's read transaction.
//! Names are compared upper-cased, matching how unquoted identifiers fold,
//! and an empty name answers `false` without touching the database.
//!
//! SQLite keeps its catalog in `sqlite_schema`. Object kinds the engine does
//! not have (stored procedures, exceptions, domains) never exist. Generators
//! are the `AUTOINCREMENT` counters of tables. Named key constraints are only
//! recorded in the table's `CREATE TABLE` text, so they are matched there.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::trace;

use crate::{Connection, Result};

/// Engine version as `major.minor.patch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerVersion {
   pub major: u32,
   pub minor: u32,
   pub patch: u32,
}

/// Parse a dotted version string. Missing or non-numeric components are 0 and
/// anything after the third component is ignored.
pub fn parse_server_version(version: Option<&str>) -> ServerVersion {
   let mut parts = version
      .unwrap_or_default()
      .split('.')
      .map(|part| part.trim().parse::<u32>().unwrap_or(0));

   ServerVersion {
      major: parts.next().unwrap_or(0),
      minor: parts.next().unwrap_or(0),
      patch: parts.next().unwrap_or(0),
   }
}

/// Catalog inspector borrowed from a [`Connection`].
pub struct Metadata<'c> {
   connection: &'c Connection,
}

impl<'c> Metadata<'c> {
   pub(crate) fn new(connection: &'c Connection) -> Self {
      Self { connection }
   }

   async fn exists(&self, sql: &str, values: Vec<JsonValue>) -> Result<bool> {
      let rows = self.connection.query_read(sql, values).await?;
      Ok(!rows.is_empty())
   }

   async fn schema_object_exists(&self, object_type: &str, name: &str) -> Result<bool> {
      if name.is_empty() {
         return Ok(false);
      }

      let sql = "SELECT name FROM sqlite_schema WHERE type = ? AND UPPER(name) = ?";
      self
         .exists(sql, vec![json!(object_type), json!(name.to_uppercase())])
         .await
   }

   pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
      self.schema_object_exists("table", table_name).await
   }

   pub async fn view_exists(&self, view_name: &str) -> Result<bool> {
      self.schema_object_exists("view", view_name).await
   }

   pub async fn index_exists(&self, index_name: &str) -> Result<bool> {
      self.schema_object_exists("index", index_name).await
   }

   pub async fn trigger_exists(&self, trigger_name: &str) -> Result<bool> {
      self.schema_object_exists("trigger", trigger_name).await
   }

   pub async fn field_exists(&self, table_name: &str, field_name: &str) -> Result<bool> {
      if table_name.is_empty() || field_name.is_empty() {
         return Ok(false);
      }

      let sql = "SELECT name FROM pragma_table_info(?) WHERE UPPER(name) = ?";
      self
         .exists(
            sql,
            vec![json!(table_name.to_uppercase()), json!(field_name.to_uppercase())],
         )
         .await
   }

   /// A generator is the `AUTOINCREMENT` counter of the table with that name.
   pub async fn generator_exists(&self, generator_name: &str) -> Result<bool> {
      if generator_name.is_empty() {
         return Ok(false);
      }

      let sql = "SELECT name FROM sqlite_schema \
                 WHERE type = 'table' AND UPPER(name) = ? AND UPPER(sql) LIKE '%AUTOINCREMENT%'";
      self
         .exists(sql, vec![json!(generator_name.to_uppercase())])
         .await
   }

   pub async fn procedure_exists(&self, procedure_name: &str) -> Result<bool> {
      Ok(unsupported_object("procedure", procedure_name))
   }

   pub async fn exception_exists(&self, exception_name: &str) -> Result<bool> {
      Ok(unsupported_object("exception", exception_name))
   }

   pub async fn domain_exists(&self, domain_name: &str) -> Result<bool> {
      Ok(unsupported_object("domain", domain_name))
   }

   pub async fn primary_key_exists(&self, table_name: &str, primary_key_name: &str) -> Result<bool> {
      self
         .named_constraint_exists(table_name, primary_key_name, r"PRIMARY\s+KEY")
         .await
   }

   pub async fn foreign_key_exists(&self, table_name: &str, foreign_key_name: &str) -> Result<bool> {
      self
         .named_constraint_exists(table_name, foreign_key_name, r"(FOREIGN\s+KEY|REFERENCES)")
         .await
   }

   async fn named_constraint_exists(
      &self,
      table_name: &str,
      constraint_name: &str,
      constraint_pattern: &str,
   ) -> Result<bool> {
      if table_name.is_empty() || constraint_name.is_empty() {
         return Ok(false);
      }

      let sql = "SELECT sql FROM sqlite_schema WHERE type = 'table' AND UPPER(name) = ?";
      let rows = self
         .connection
         .query_read(sql, vec![json!(table_name.to_uppercase())])
         .await?;

      Ok(rows.iter().any(|row| {
         row.get("sql")
            .and_then(JsonValue::as_str)
            .is_some_and(|create_sql| {
               has_named_constraint(create_sql, constraint_name, constraint_pattern)
            })
      }))
   }

   pub async fn get_server_version(&self) -> Result<ServerVersion> {
      let rows = self
         .connection
         .query_read("SELECT COALESCE(sqlite_version(), '') AS version", vec![])
         .await?;

      let version = rows
         .first()
         .and_then(|row| row.get("version"))
         .and_then(JsonValue::as_str);
      Ok(parse_server_version(version))
   }
}

fn unsupported_object(kind: &str, name: &str) -> bool {
   if !name.is_empty() {
      trace!(kind, name, "Object kind not present in the SQLite catalog");
   }
   false
}

/// Whether `create_sql` declares `CONSTRAINT <name> <constraint_pattern>`.
///
/// The name may be bare or quoted with `"`, `` ` `` or `[]`, and matches
/// case-insensitively.
fn has_named_constraint(create_sql: &str, name: &str, constraint_pattern: &str) -> bool {
   let pattern = format!(
      r#"(?i)\bCONSTRAINT\s+["`\[]?{}["`\]]?\s+{}"#,
      regex::escape(name),
      constraint_pattern
   );
   Regex::new(&pattern).is_ok_and(|re| re.is_match(create_sql))
}
