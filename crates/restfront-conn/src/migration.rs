//! Migration journal.
//!
//! Applied migrations are recorded in `rf_migration`, keyed by
//! `(project, id)`. [`Migration::init`] creates the journal on first use and
//! upgrades older layouts in place, so it is safe to call on every start.

use serde_json::{Value as JsonValue, json};
use time::Date;
use tracing::info;

use crate::{Connection, Error, Result, Transaction};

/// Name of the journal table.
pub const MIGRATION_TABLE: &str = "rf_migration";

/// Migration journal borrowed from a [`Connection`].
pub struct Migration<'c> {
   connection: &'c Connection,
}

impl<'c> Migration<'c> {
   pub(crate) fn new(connection: &'c Connection) -> Self {
      Self { connection }
   }

   /// Ensure the journal exists with the current layout.
   pub async fn init(&self) -> Result<()> {
      self.create_journal().await?;
      self.add_project_column().await
   }

   /// Whether migration `id` of `project` has been applied. An empty project
   /// is the single-project journal.
   pub async fn check(&self, project: &str, id: i64) -> Result<bool> {
      let sql = "SELECT id FROM rf_migration WHERE project = ? AND id = ?";
      let rows = self
         .connection
         .query_read(sql, vec![json!(project), json!(id)])
         .await?;
      Ok(!rows.is_empty())
   }

   /// Record migration `id` of `project` on `transaction`. Committing is up to
   /// the caller.
   pub async fn log(
      &self,
      transaction: &Transaction,
      project: &str,
      id: i64,
      name: &str,
      migration_date: Option<Date>,
      author: Option<&str>,
   ) -> Result<()> {
      let sql = "INSERT INTO rf_migration (project, id, name, migrationdate, author) \
                 VALUES (?, ?, ?, ?, ?)";
      let values = vec![
         json!(project),
         json!(id),
         json!(name),
         migration_date.map_or(JsonValue::Null, |date| json!(date.to_string())),
         author.map_or(JsonValue::Null, |author| json!(author)),
      ];
      transaction.query(sql, values).await?;
      Ok(())
   }

   /// First journal layout: migrations keyed by id alone.
   async fn create_journal(&self) -> Result<()> {
      if self.connection.metadata().table_exists(MIGRATION_TABLE).await? {
         return Ok(());
      }

      self
         .connection
         .on_write_transaction(|transaction| async move {
            transaction
               .query(
                  "CREATE TABLE rf_migration (
                     id INTEGER NOT NULL,
                     name VARCHAR(255) NOT NULL,
                     migrationdate DATE,
                     author VARCHAR(1024),
                     executeddate TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
                     CONSTRAINT rf_pk_migration PRIMARY KEY (id)
                  )",
                  vec![],
               )
               .await?;
            Ok::<_, Error>(())
         })
         .await?;

      info!(table = MIGRATION_TABLE, "Migration journal created");
      Ok(())
   }

   /// Second layout: a `project` discriminator that is part of the key.
   ///
   /// SQLite cannot change a primary key in place, so the table is rebuilt
   /// and existing rows land in the default project.
   async fn add_project_column(&self) -> Result<()> {
      if self
         .connection
         .metadata()
         .field_exists(MIGRATION_TABLE, "project")
         .await?
      {
         return Ok(());
      }

      self
         .connection
         .on_write_transaction(|transaction| async move {
            let statements = [
               "CREATE TABLE rf_migration_upgrade (
                  project VARCHAR(255) DEFAULT '' NOT NULL,
                  id INTEGER NOT NULL,
                  name VARCHAR(255) NOT NULL,
                  migrationdate DATE,
                  author VARCHAR(1024),
                  executeddate TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
                  CONSTRAINT rf_pk_migration PRIMARY KEY (project, id)
               )",
               "INSERT INTO rf_migration_upgrade (project, id, name, migrationdate, author, executeddate)
                  SELECT '', id, name, migrationdate, author, executeddate FROM rf_migration",
               "DROP TABLE rf_migration",
               "ALTER TABLE rf_migration_upgrade RENAME TO rf_migration",
            ];
            for sql in statements {
               transaction.query(sql, vec![]).await?;
            }
            Ok::<_, Error>(())
         })
         .await?;

      info!(table = MIGRATION_TABLE, "Migration journal upgraded with project column");
      Ok(())
   }
}
