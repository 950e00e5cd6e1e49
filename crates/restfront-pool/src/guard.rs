//! RAII guard for borrowed connections

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use restfront_conn::Connection;
use tokio::sync::OwnedSemaphorePermit;

use crate::pool::PoolInner;

/// A connection borrowed from a [`Pool`](crate::Pool).
///
/// Derefs to [`Connection`]. The borrower owns it exclusively until the guard
/// is dropped, which returns the connection to the pool's idle set (or
/// closes it if the pool has been closed meanwhile).
#[must_use = "dropping the guard returns the connection to the pool immediately"]
pub struct PooledConnection {
   connection: Option<Connection>,
   pool: Arc<PoolInner>,
   // Released after the connection is back in the idle set
   _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
   pub(crate) fn new(connection: Connection, pool: Arc<PoolInner>, permit: OwnedSemaphorePermit) -> Self {
      Self {
         connection: Some(connection),
         pool,
         _permit: permit,
      }
   }

   /// Take the connection out of the pool for good. Its slot becomes free and
   /// closing it is up to the caller.
   pub fn detach(mut self) -> Option<Connection> {
      let connection = self.connection.take();
      if connection.is_some() {
         self.pool.detach();
      }
      connection
   }
}

impl Deref for PooledConnection {
   type Target = Connection;

   fn deref(&self) -> &Connection {
      // Only `detach` and `drop` take the connection, and both consume the guard
      self
         .connection
         .as_ref()
         .unwrap_or_else(|| unreachable!("pooled connection used after release"))
   }
}

impl fmt::Debug for PooledConnection {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("PooledConnection")
         .field("connection", &self.connection)
         .finish()
   }
}

impl Drop for PooledConnection {
   fn drop(&mut self) {
      if let Some(connection) = self.connection.take() {
         self.pool.release(connection);
      }
   }
}
