//! Transactions bound to a dedicated engine connection
//!
//! SQLite runs at most one transaction per connection, so every
//! [`Transaction`] owns its own `SqliteConnection`. The isolation mode decides
//! how that connection is opened and how the transaction is started:
//!
//! - **Read**: read-only connection, statements run in autocommit so each one
//!   sees the latest committed data. Any write fails with `SQLITE_READONLY`.
//! - **Write**: `BEGIN IMMEDIATE` with a zero busy timeout. The writer lock is
//!   held from the start, so reads always see the latest committed data and a
//!   second concurrent writer fails at begin instead of waiting.
//! - **Snapshot**: `BEGIN DEFERRED` with a zero busy timeout, plus a catalog
//!   read right after `BEGIN` that fixes the visible snapshot at transaction
//!   start. A write after another transaction committed fails with
//!   `SQLITE_BUSY_SNAPSHOT`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection as _};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::connection::Activity;
use crate::decode::{Row, bind_all, decode_rows};
use crate::statement::PreparedStatement;
use crate::{ConnectionParameters, Error, Result};

/// Transaction isolation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Isolation {
   /// Read committed, writes rejected
   Read,
   /// Read committed, writes allowed, no-wait locking
   Write,
   /// Consistent view fixed at start, writes allowed, no-wait locking
   Snapshot,
}

/// Handle to one database transaction.
///
/// Cloning is cheap and yields another handle to the *same* transaction; use
/// [`Transaction::same_as`] to compare identity. The transaction ends with
/// exactly one [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback); any later use fails with
/// [`Error::TransactionAlreadyFinalized`].
#[derive(Clone)]
#[must_use = "if dropped without commit, the transaction is rolled back"]
pub struct Transaction {
   inner: Arc<TransactionInner>,
}

struct TransactionInner {
   id: Uuid,
   isolation: Isolation,
   database: String,
   lowercase_keys: bool,
   activity: Activity,
   finalized: AtomicBool,
   conn: Mutex<Option<SqliteConnection>>,
}

impl Transaction {
   pub(crate) async fn begin(
      options: &SqliteConnectOptions,
      isolation: Isolation,
      parameters: &ConnectionParameters,
      activity: Activity,
   ) -> Result<Self> {
      activity.touch();

      let options = match isolation {
         Isolation::Read => options.clone().read_only(true),
         Isolation::Write | Isolation::Snapshot => options.clone().busy_timeout(Duration::ZERO),
      };

      let mut conn = options
         .connect()
         .await
         .map_err(|source| Error::Connectivity {
            database: parameters.database.clone(),
            source,
         })?;

      match isolation {
         Isolation::Read => {}
         Isolation::Write => {
            sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await?;
         }
         Isolation::Snapshot => {
            sqlx::query("BEGIN DEFERRED").execute(&mut conn).await?;
            // Reading the catalog opens the read snapshot now rather than at
            // the first statement issued by the caller.
            sqlx::query("SELECT COUNT(*) FROM sqlite_schema")
               .fetch_one(&mut conn)
               .await?;
         }
      }

      let id = Uuid::new_v4();
      debug!(transaction_id = %id, ?isolation, database = %parameters.database, "Transaction started");

      Ok(Self {
         inner: Arc::new(TransactionInner {
            id,
            isolation,
            database: parameters.database.clone(),
            lowercase_keys: parameters.lowercase_keys,
            activity,
            finalized: AtomicBool::new(false),
            conn: Mutex::new(Some(conn)),
         }),
      })
   }

   pub fn id(&self) -> Uuid {
      self.inner.id
   }

   pub fn isolation(&self) -> Isolation {
      self.inner.isolation
   }

   /// Whether neither commit nor rollback has been issued yet.
   pub fn is_active(&self) -> bool {
      !self.inner.finalized.load(Ordering::Acquire)
   }

   /// Whether both handles refer to the same transaction.
   pub fn same_as(&self, other: &Transaction) -> bool {
      Arc::ptr_eq(&self.inner, &other.inner)
   }

   /// Execute a statement and return its rows (empty for statements without
   /// a result set).
   pub async fn query(&self, sql: &str, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      let mut conn = self.connection().await?;
      trace!(transaction_id = %self.inner.id, sql, "Executing query");

      let rows = bind_all(sql, values).fetch_all(&mut *conn).await?;
      decode_rows(rows, self.inner.lowercase_keys)
   }

   /// Compile `sql` into a statement bound to this transaction.
   pub async fn prepare_statement(&self, sql: &str) -> Result<PreparedStatement> {
      PreparedStatement::prepare(self.clone(), sql).await
   }

   /// Commit this transaction
   pub async fn commit(&self) -> Result<()> {
      let conn = self.take_connection().await?;
      self.finish(conn, true).await
   }

   /// Rollback this transaction
   pub async fn rollback(&self) -> Result<()> {
      let conn = self.take_connection().await?;
      self.finish(conn, false).await
   }

   /// Commit, then hand `value` back to the caller.
   pub async fn commit_and_return<T>(&self, value: T) -> Result<T> {
      self.commit().await?;
      Ok(value)
   }

   /// Roll back, then return `error` unchanged.
   ///
   /// A failing rollback is logged and never replaces `error`.
   pub async fn rollback_and_rethrow<T, E>(&self, error: E) -> std::result::Result<T, E> {
      if let Err(rollback_err) = self.rollback().await {
         warn!(
            transaction_id = %self.inner.id,
            error = %rollback_err,
            "Rollback failed after transaction error"
         );
      }
      Err(error)
   }

   pub(crate) fn touch(&self) {
      self.inner.activity.touch();
   }

   pub(crate) fn lowercase_keys(&self) -> bool {
      self.inner.lowercase_keys
   }

   /// Lock the engine connection for one operation.
   pub(crate) async fn connection(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>> {
      self.touch();
      let guard = self.inner.conn.lock().await;
      MutexGuard::try_map(guard, |conn| conn.as_mut()).map_err(|_| Error::TransactionAlreadyFinalized)
   }

   async fn take_connection(&self) -> Result<SqliteConnection> {
      self.touch();
      let conn = self
         .inner
         .conn
         .lock()
         .await
         .take()
         .ok_or(Error::TransactionAlreadyFinalized)?;
      self.inner.finalized.store(true, Ordering::Release);
      Ok(conn)
   }

   async fn finish(&self, mut conn: SqliteConnection, commit: bool) -> Result<()> {
      let id = self.inner.id;

      // Read transactions run in autocommit; closing the connection is all
      // that is left to do.
      if self.inner.isolation != Isolation::Read {
         let statement = if commit { "COMMIT" } else { "ROLLBACK" };
         if let Err(e) = sqlx::query(statement).execute(&mut conn).await {
            if commit && let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut conn).await {
               warn!(transaction_id = %id, error = %rollback_err, "Rollback after failed commit also failed");
            }
            close_quietly(conn, id).await;
            return Err(e.into());
         }
      }

      close_quietly(conn, id).await;

      if commit {
         debug!(transaction_id = %id, database = %self.inner.database, "Transaction committed");
      } else {
         debug!(transaction_id = %id, database = %self.inner.database, "Transaction rolled back");
      }
      Ok(())
   }
}

async fn close_quietly(conn: SqliteConnection, id: Uuid) {
   if let Err(e) = conn.close().await {
      warn!(transaction_id = %id, error = %e, "Failed to close transaction connection");
   }
}

impl fmt::Debug for Transaction {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Transaction")
         .field("id", &self.inner.id)
         .field("isolation", &self.inner.isolation)
         .field("active", &self.is_active())
         .finish()
   }
}

impl Drop for TransactionInner {
   fn drop(&mut self) {
      // Dropping the engine connection closes it, and SQLite rolls back any
      // transaction that was still open on it.
      if self.conn.get_mut().is_some() {
         debug!(
            transaction_id = %self.id,
            database = %self.database,
            "Dropping unfinished transaction (will auto-rollback)"
         );
      }
   }
}
