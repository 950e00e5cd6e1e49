//! Database connection with a cached read transaction

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection as _};
use tracing::{debug, warn};

use crate::decode::Row;
use crate::metadata::Metadata;
use crate::migration::Migration;
use crate::statement::PreparedStatement;
use crate::transaction::{Isolation, Transaction};
use crate::{ConnectionParameters, Error, Result};

/// Last-activity clock shared between a connection and its transactions.
#[derive(Debug, Clone)]
pub(crate) struct Activity(Arc<parking_lot::Mutex<Instant>>);

impl Activity {
   fn new() -> Self {
      Self(Arc::new(parking_lot::Mutex::new(Instant::now())))
   }

   pub(crate) fn touch(&self) {
      *self.0.lock() = Instant::now();
   }

   fn last(&self) -> Instant {
      *self.0.lock()
   }
}

/// One logical link to a database.
///
/// ## Lifecycle
///
/// ```text
/// new() ──open()/create()──> connected ──close()──> detached (can open again)
/// ```
///
/// While connected, the connection hands out transactions:
/// - **read**: one per connection, created lazily and shared by every caller
///   until `close()` retires it
/// - **write / snapshot**: a fresh transaction per call, owned by the caller,
///   who must commit or roll it back
#[derive(Debug)]
pub struct Connection {
   parameters: ConnectionParameters,

   /// Options every transaction connection is derived from; `None` while
   /// detached
   options: parking_lot::RwLock<Option<SqliteConnectOptions>>,

   /// Read-write connection held open for the lifetime of the link
   attachment: tokio::sync::Mutex<Option<SqliteConnection>>,

   /// Lazily created read transaction
   read_transaction: tokio::sync::Mutex<Option<Transaction>>,

   activity: Activity,
}

impl Connection {
   /// Create a detached connection. Nothing is opened until
   /// [`open`](Connection::open) or [`create`](Connection::create).
   pub fn new(parameters: ConnectionParameters) -> Self {
      Self {
         parameters,
         options: parking_lot::RwLock::new(None),
         attachment: tokio::sync::Mutex::new(None),
         read_transaction: tokio::sync::Mutex::new(None),
         activity: Activity::new(),
      }
   }

   /// Create a detached connection from a `[host[/port]:]path` string.
   pub fn from_url(url: &str, user: &str, password: &str) -> Result<Self> {
      let parameters = ConnectionParameters::from_url(url, user, password)
         .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
      Ok(Self::new(parameters))
   }

   pub fn parameters(&self) -> &ConnectionParameters {
      &self.parameters
   }

   /// Instant of the last operation issued through this connection or any of
   /// its transactions and statements.
   pub fn last_active(&self) -> Instant {
      self.activity.last()
   }

   /// Attach to an existing database.
   pub async fn open(&self) -> Result<()> {
      self.attach(false).await
   }

   /// Create the database file, then attach to it.
   pub async fn create(&self) -> Result<()> {
      // Errors other than "not found" (permissions, a file in place of a
      // directory) surface as I/O errors rather than as a missing database.
      if Path::new(&self.parameters.database).try_exists()? {
         return Err(Error::DatabaseExists(self.parameters.database.clone()));
      }
      self.attach(true).await
   }

   async fn attach(&self, create: bool) -> Result<()> {
      let parameters = &self.parameters;
      if !parameters.is_local() {
         return Err(Error::UnsupportedHost(parameters.host.clone()));
      }

      let options = SqliteConnectOptions::new()
         .filename(&parameters.database)
         .create_if_missing(false);

      // WAL lets the read transaction and write transactions run side by
      // side; the mode is persistent, so only the attachment sets it.
      let attachment = options
         .clone()
         .create_if_missing(create)
         .journal_mode(SqliteJournalMode::Wal)
         .connect()
         .await
         .map_err(|source| Error::Connectivity {
            database: parameters.database.clone(),
            source,
         })?;

      *self.attachment.lock().await = Some(attachment);
      *self.options.write() = Some(options);
      self.activity.touch();

      debug!(database = %parameters.database, create, "Database attached");
      Ok(())
   }

   pub fn is_connected(&self) -> bool {
      self.options.read().is_some()
   }

   /// Roll back the read transaction (if any) and detach.
   ///
   /// A failing rollback is logged and does not prevent detaching.
   pub async fn close(&self) -> Result<()> {
      if !self.is_connected() {
         return Err(Error::NotConnected);
      }

      if let Some(transaction) = self.read_transaction.lock().await.take()
         && transaction.is_active()
         && let Err(e) = transaction.rollback().await
      {
         warn!(database = %self.parameters.database, error = %e, "Failed to roll back read transaction");
      }

      *self.options.write() = None;
      let attachment = self.attachment.lock().await.take();
      if let Some(attachment) = attachment {
         attachment.close().await?;
      }

      debug!(database = %self.parameters.database, "Database detached");
      Ok(())
   }

   /// Start a fresh transaction with the given isolation.
   async fn begin(&self, isolation: Isolation) -> Result<Transaction> {
      let options = self.options.read().clone().ok_or(Error::NotConnected)?;
      Transaction::begin(&options, isolation, &self.parameters, self.activity.clone()).await
   }

   /// The connection's read transaction. Every call returns the same
   /// transaction until [`close`](Connection::close).
   ///
   /// Callers share it and must not commit or roll it back.
   pub async fn get_read_transaction(&self) -> Result<Transaction> {
      let mut cached = self.read_transaction.lock().await;
      if let Some(transaction) = cached.as_ref().filter(|t| t.is_active()) {
         return Ok(transaction.clone());
      }

      let transaction = self.begin(Isolation::Read).await?;
      *cached = Some(transaction.clone());
      Ok(transaction)
   }

   /// A new write transaction owned by the caller.
   pub async fn get_write_transaction(&self) -> Result<Transaction> {
      self.begin(Isolation::Write).await
   }

   /// A new snapshot transaction owned by the caller.
   pub async fn get_snapshot_transaction(&self) -> Result<Transaction> {
      self.begin(Isolation::Snapshot).await
   }

   pub async fn query(
      &self,
      transaction: &Transaction,
      sql: &str,
      values: Vec<JsonValue>,
   ) -> Result<Vec<Row>> {
      transaction.query(sql, values).await
   }

   /// Run a query on the read transaction.
   pub async fn query_read(&self, sql: &str, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      let transaction = self.get_read_transaction().await?;
      transaction.query(sql, values).await
   }

   /// Run a query on a new write transaction and commit it.
   pub async fn query_write(&self, sql: &str, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      self
         .run_in_transaction(Isolation::Write, |transaction| async move {
            transaction.query(sql, values).await
         })
         .await
   }

   /// Run a query on a new snapshot transaction and commit it.
   pub async fn query_snapshot(&self, sql: &str, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      self
         .run_in_transaction(Isolation::Snapshot, |transaction| async move {
            transaction.query(sql, values).await
         })
         .await
   }

   /// Run `action` on a new write transaction, committing on success and
   /// rolling back on failure.
   pub async fn on_write_transaction<F, Fut, T, E>(&self, action: F) -> std::result::Result<T, E>
   where
      F: FnOnce(Transaction) -> Fut,
      Fut: Future<Output = std::result::Result<T, E>>,
      E: From<Error>,
   {
      self.run_in_transaction(Isolation::Write, action).await
   }

   /// Run `action` on a new snapshot transaction, committing on success and
   /// rolling back on failure.
   pub async fn on_snapshot_transaction<F, Fut, T, E>(
      &self,
      action: F,
   ) -> std::result::Result<T, E>
   where
      F: FnOnce(Transaction) -> Fut,
      Fut: Future<Output = std::result::Result<T, E>>,
      E: From<Error>,
   {
      self.run_in_transaction(Isolation::Snapshot, action).await
   }

   /// Start a transaction, run `action` on it, then commit and return the
   /// action's value, or roll back and return the action's error unchanged.
   ///
   /// Errors from the transaction itself (start, commit) are converted into
   /// `E`. A rollback failure is logged and never replaces the action's error.
   pub async fn run_in_transaction<F, Fut, T, E>(
      &self,
      isolation: Isolation,
      action: F,
   ) -> std::result::Result<T, E>
   where
      F: FnOnce(Transaction) -> Fut,
      Fut: Future<Output = std::result::Result<T, E>>,
      E: From<Error>,
   {
      let transaction = self.begin(isolation).await?;

      match action(transaction.clone()).await {
         Ok(value) => Ok(transaction.commit_and_return(value).await?),
         Err(e) => transaction.rollback_and_rethrow(e).await,
      }
   }

   pub async fn prepare_statement(
      &self,
      transaction: &Transaction,
      sql: &str,
   ) -> Result<PreparedStatement> {
      transaction.prepare_statement(sql).await
   }

   /// Prepare a statement on the read transaction.
   pub async fn prepare_read_statement(&self, sql: &str) -> Result<PreparedStatement> {
      let transaction = self.get_read_transaction().await?;
      self.prepare_statement(&transaction, sql).await
   }

   /// Catalog inspection on this connection.
   pub fn metadata(&self) -> Metadata<'_> {
      Metadata::new(self)
   }

   /// Migration journal on this connection.
   pub fn migration(&self) -> Migration<'_> {
      Migration::new(self)
   }
}
