//! Prepared statements bound to a transaction

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{Connection as _, Executor, Statement as _};
use tracing::trace;

use crate::decode::{Row, bind_all, decode_row, decode_rows};
use crate::{Result, Transaction};

/// What kind of result a statement produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
   /// Query returning a result set; all rows are fetched.
   Select,
   /// Executable statement returning a single record (DML with `RETURNING`).
   ExecProcedure,
   /// DDL and DML without output; no result set.
   Other,
}

impl StatementKind {
   /// Classify `sql` by its leading keyword and whether it has output columns.
   ///
   /// Any statement with output columns that is not DML yields a result set.
   pub fn classify(sql: &str, has_output: bool) -> Self {
      match leading_keyword(sql).as_str() {
         "SELECT" | "WITH" | "VALUES" | "PRAGMA" | "EXPLAIN" => StatementKind::Select,
         "INSERT" | "UPDATE" | "DELETE" | "REPLACE" if has_output => StatementKind::ExecProcedure,
         "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Other,
         _ if has_output => StatementKind::Select,
         _ => StatementKind::Other,
      }
   }
}

/// Upper-cased first keyword of `sql`, skipping whitespace, comments and
/// opening parentheses. An unterminated comment runs to the end of input.
fn leading_keyword(sql: &str) -> String {
   let mut rest = sql;
   loop {
      rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
      if let Some(comment) = rest.strip_prefix("--") {
         rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
      } else if let Some(comment) = rest.strip_prefix("/*") {
         rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
      } else {
         break;
      }
   }

   rest
      .chars()
      .take_while(|c| c.is_ascii_alphabetic())
      .collect::<String>()
      .to_ascii_uppercase()
}

/// A compiled statement that can be executed repeatedly on its transaction.
///
/// The compiled plan lives in the transaction's statement cache; every
/// [`execute`](PreparedStatement::execute) reuses it with a new parameter set.
#[derive(Debug)]
pub struct PreparedStatement {
   transaction: Transaction,
   sql: String,
   kind: StatementKind,
   output_columns: usize,
}

impl PreparedStatement {
   pub(crate) async fn prepare(transaction: Transaction, sql: &str) -> Result<Self> {
      let output_columns = {
         let mut conn = transaction.connection().await?;
         let statement = (&mut *conn).prepare(sql).await?;
         statement.columns().len()
      };

      let kind = StatementKind::classify(sql, output_columns > 0);
      trace!(transaction_id = %transaction.id(), ?kind, output_columns, "Statement prepared");

      Ok(Self {
         transaction,
         sql: sql.to_string(),
         kind,
         output_columns,
      })
   }

   pub fn kind(&self) -> StatementKind {
      self.kind
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn transaction(&self) -> &Transaction {
      &self.transaction
   }

   /// Execute with `values` bound to the `?` placeholders.
   ///
   /// - `Select`: every row, fully materialized
   /// - `ExecProcedure`: the single returned record
   /// - `Other`: always empty; the affected-row count is not reported
   pub async fn execute(&mut self, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      let lowercase_keys = self.transaction.lowercase_keys();
      let mut conn = self.transaction.connection().await?;

      let query = bind_all(&self.sql, values);
      match self.kind {
         StatementKind::Select if self.output_columns > 0 => {
            let rows = query.fetch_all(&mut *conn).await?;
            decode_rows(rows, lowercase_keys)
         }
         StatementKind::ExecProcedure if self.output_columns > 0 => {
            match query.fetch_optional(&mut *conn).await? {
               Some(row) => Ok(vec![decode_row(&row, lowercase_keys)?]),
               None => Ok(Vec::new()),
            }
         }
         _ => {
            query.execute(&mut *conn).await?;
            Ok(Vec::new())
         }
      }
   }

   /// Mark the end of an execution. Safe after any execution, including
   /// failed ones.
   ///
   /// Rows are fully materialized by [`execute`](PreparedStatement::execute),
   /// so there is never a server-side cursor left to release; this only
   /// counts as activity on the transaction.
   pub fn close(&self) {
      self.transaction.touch();
   }

   /// Release the compiled statement.
   ///
   /// Plans cached on the transaction's connection are discarded; other
   /// statements on the same transaction are recompiled transparently on
   /// their next execution.
   pub async fn drop_statement(self) -> Result<()> {
      self.close();
      if !self.transaction.is_active() {
         // The plan went away with the transaction's connection.
         return Ok(());
      }

      let mut conn = self.transaction.connection().await?;
      conn.clear_cached_statements().await?;
      trace!(transaction_id = %self.transaction.id(), "Statement dropped");
      Ok(())
   }
}
