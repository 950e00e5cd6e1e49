//! Migration runner
//!
//! A [`MigrationScript`] pairs its journal entry with an action. [`run`]
//! applies it at most once per `(project, id)`: the action and the journal
//! entry share one write transaction, so they commit or roll back together.

use futures::future::BoxFuture;
use restfront_conn::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::format_description;
use tracing::{error, info};

use crate::{Error, Result};

/// Journal entry of a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationData {
   /// Owning project; empty for single-project databases
   pub project: String,
   pub id: i64,
   pub name: String,
   /// Authoring date as `YYYY-MM-DD`
   pub date: Option<String>,
   pub author: Option<String>,
}

impl MigrationData {
   pub fn new(project: impl Into<String>, id: i64, name: impl Into<String>) -> Self {
      Self {
         project: project.into(),
         id,
         name: name.into(),
         ..Default::default()
      }
   }

   pub fn with_date(mut self, date: impl Into<String>) -> Self {
      self.date = Some(date.into());
      self
   }

   pub fn with_author(mut self, author: impl Into<String>) -> Self {
      self.author = Some(author.into());
      self
   }

   /// Check the entry and parse its date.
   fn validate(&self) -> Result<Option<Date>> {
      if self.name.trim().is_empty() {
         return Err(Error::InvalidMigration(format!(
            "migration {} has no name",
            self.id
         )));
      }
      self.date.as_deref().map(parse_migration_date).transpose()
   }
}

type MigrationAction =
   Box<dyn for<'c> Fn(&'c Connection, Transaction) -> BoxFuture<'c, Result<()>> + Send + Sync>;

/// A migration: journal entry plus the action that applies it.
///
/// # Example
///
/// ```no_run
/// use restfront_db::migrate::{MigrationData, MigrationScript};
///
/// let script = MigrationScript::new(
///    MigrationData::new("billing", 1, "create invoices").with_date("2024-03-01"),
///    |_connection, tx| {
///       Box::pin(async move {
///          tx.query("CREATE TABLE invoices (id INTEGER PRIMARY KEY)", vec![])
///             .await?;
///          Ok::<_, restfront_db::Error>(())
///       })
///    },
/// );
/// ```
pub struct MigrationScript {
   data: MigrationData,
   action: MigrationAction,
}

impl MigrationScript {
   /// The action receives the connection and the write transaction the
   /// journal entry is written on. It must not commit or roll back.
   pub fn new<F>(data: MigrationData, action: F) -> Self
   where
      F: for<'c> Fn(&'c Connection, Transaction) -> BoxFuture<'c, Result<()>> + Send + Sync + 'static,
   {
      Self {
         data,
         action: Box::new(action),
      }
   }

   pub fn data(&self) -> &MigrationData {
      &self.data
   }
}

impl std::fmt::Debug for MigrationScript {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("MigrationScript")
         .field("data", &self.data)
         .finish_non_exhaustive()
   }
}

/// Parse a `YYYY-MM-DD` migration date.
pub fn parse_migration_date(date: &str) -> Result<Date> {
   Date::parse(date.trim(), format_description!("[year]-[month]-[day]"))
      .map_err(|_| Error::InvalidMigrationDate(date.to_string()))
}

/// Apply `script` unless the journal already records it.
///
/// Returns whether the migration was applied by this call. Failures are
/// logged and returned; nothing of a failed migration is committed.
pub async fn run(connection: &Connection, script: &MigrationScript) -> Result<bool> {
   let data = &script.data;
   let result = apply(connection, script).await;
   if let Err(e) = &result {
      error!(project = %data.project, id = data.id, name = %data.name, error = %e, "Migration failed");
   }
   result
}

async fn apply(connection: &Connection, script: &MigrationScript) -> Result<bool> {
   let data = &script.data;
   let date = data.validate()?;

   if connection.migration().check(&data.project, data.id).await? {
      return Ok(false);
   }

   info!(project = %data.project, id = data.id, name = %data.name, "Applying migration");

   connection
      .on_write_transaction(|tx| async move {
         (script.action)(connection, tx.clone()).await?;
         connection
            .migration()
            .log(
               &tx,
               &data.project,
               data.id,
               &data.name,
               date,
               data.author.as_deref(),
            )
            .await?;
         Ok::<_, Error>(())
      })
      .await?;

   Ok(true)
}

/// Apply `scripts` in order, stopping at the first failure.
///
/// Returns how many were applied by this call.
pub async fn run_all(connection: &Connection, scripts: &[MigrationScript]) -> Result<usize> {
   let mut applied = 0;
   for script in scripts {
      if run(connection, script).await? {
         applied += 1;
      }
   }
   Ok(applied)
}
