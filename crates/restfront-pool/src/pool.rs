//! Bounded pool of database connections

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use restfront_conn::{Connection, ConnectionParameters};
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::guard::PooledConnection;
use crate::{Error, PoolConfig, Result};

/// Pause before re-checking when every slot is taken by a connection that is
/// in the middle of being returned or destroyed.
const SLOT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Bounded set of [`Connection`]s recycled across callers.
///
/// ## Accounting
///
/// - **`size`**: live connections, borrowed and idle combined, never above
///   `max`. A slot is reserved before a connection is opened and freed when
///   it is destroyed or detached.
/// - **`borrowers`**: semaphore with `max` permits. Each
///   [`PooledConnection`] holds one for as long as it is borrowed.
/// - **`idle`**: connections ready for reuse, most recently returned last.
///
/// ## Usage Pattern
///
/// ```text
/// 1. Pool::new() (spawns the eviction task)
/// 2. acquire() -> PooledConnection, validated when test_on_borrow is set
/// 3. Use it like a Connection, then drop it to return it to the pool
/// 4. close() when done
/// ```
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Debug, Clone)]
pub struct Pool {
   inner: Arc<PoolInner>,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
   parameters: ConnectionParameters,
   config: PoolConfig,
   idle: parking_lot::Mutex<VecDeque<Connection>>,
   borrowers: Arc<Semaphore>,
   size: AtomicUsize,
   closed: AtomicBool,
   eviction: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
   /// Create a pool for `parameters`. No connection is opened until the first
   /// acquire or eviction run.
   ///
   /// Unless eviction is disabled (zero `eviction_run_interval`), must be
   /// called from within a Tokio runtime, which runs the eviction task;
   /// otherwise fails with [`Error::NoRuntime`].
   pub fn new(parameters: ConnectionParameters, config: PoolConfig) -> Result<Self> {
      config.validate().map_err(Error::InvalidConfig)?;

      let runtime = if config.eviction_run_interval.is_zero() {
         None
      } else {
         Some(Handle::try_current().map_err(|_| Error::NoRuntime)?)
      };

      let inner = Arc::new(PoolInner {
         parameters,
         borrowers: Arc::new(Semaphore::new(config.max as usize)),
         config,
         idle: parking_lot::Mutex::new(VecDeque::new()),
         size: AtomicUsize::new(0),
         closed: AtomicBool::new(false),
         eviction: parking_lot::Mutex::new(None),
      });

      if let Some(runtime) = runtime {
         let handle = runtime.spawn(run_eviction(Arc::downgrade(&inner)));
         *inner.eviction.lock() = Some(handle);
      }

      debug!(
         database = %inner.parameters.database,
         max = inner.config.max,
         min = inner.config.min,
         "Pool created"
      );
      Ok(Self { inner })
   }

   pub fn parameters(&self) -> &ConnectionParameters {
      &self.inner.parameters
   }

   pub fn config(&self) -> &PoolConfig {
      &self.inner.config
   }

   /// Borrow a connection, waiting at most the configured acquire timeout.
   pub async fn acquire(&self) -> Result<PooledConnection> {
      self.acquire_timeout(self.inner.config.acquire_timeout).await
   }

   /// Borrow a connection, waiting at most `timeout`.
   ///
   /// Fails with [`Error::Timeout`] when no connection became available in
   /// time, and immediately with [`Error::Connection`] when opening a new one
   /// fails.
   pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
      if self.is_closed() {
         return Err(Error::PoolClosed);
      }

      match tokio::time::timeout(timeout, self.inner.acquire()).await {
         Ok(result) => result,
         Err(_) => {
            warn!(database = %self.inner.parameters.database, ?timeout, "Timed out acquiring pooled connection");
            Err(Error::Timeout(timeout))
         }
      }
   }

   /// Return a borrowed connection to the idle set. Same as dropping it.
   pub fn release(&self, connection: PooledConnection) {
      drop(connection);
   }

   /// Close every idle connection and stop handing out new ones.
   ///
   /// Borrowed connections are closed as they are returned.
   pub async fn close(&self) {
      if self.inner.closed.swap(true, Ordering::AcqRel) {
         return;
      }

      self.inner.borrowers.close();
      if let Some(handle) = self.inner.eviction.lock().take() {
         handle.abort();
      }

      let idle: Vec<Connection> = self.inner.idle.lock().drain(..).collect();
      for connection in idle {
         self.inner.destroy(connection).await;
      }

      info!(database = %self.inner.parameters.database, "Pool closed");
   }

   /// Live connections, borrowed and idle.
   pub fn size(&self) -> usize {
      self.inner.size()
   }

   /// Connections waiting in the idle set.
   pub fn idle_count(&self) -> usize {
      self.inner.idle.lock().len()
   }

   pub fn is_closed(&self) -> bool {
      self.inner.is_closed()
   }
}

impl PoolInner {
   fn size(&self) -> usize {
      self.size.load(Ordering::Acquire)
   }

   fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
      loop {
         let permit = Arc::clone(&self.borrowers)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;
         if self.is_closed() {
            return Err(Error::PoolClosed);
         }

         let idle = self.idle.lock().pop_back();
         if let Some(connection) = idle {
            // Goes back to the idle set if this future is cancelled mid-check
            let pooled = PooledConnection::new(connection, Arc::clone(self), permit);
            if !self.config.test_on_borrow || self.validate(&pooled).await {
               trace!(database = %self.parameters.database, "Reusing idle connection");
               return Ok(pooled);
            }
            if let Some(connection) = pooled.detach() {
               self.close_connection(connection).await;
            }
            continue;
         }

         if self.reserve_slot(self.config.max as usize) {
            let connection = self.create().await?;
            return Ok(PooledConnection::new(connection, Arc::clone(self), permit));
         }

         drop(permit);
         tokio::time::sleep(SLOT_RETRY_DELAY).await;
      }
   }

   /// Reserve room for one more live connection while fewer than `limit` are
   /// live.
   fn reserve_slot(&self, limit: usize) -> bool {
      self
         .size
         .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
            (size < limit).then_some(size + 1)
         })
         .is_ok()
   }

   /// Open a connection into a reserved slot. The slot is freed on failure.
   async fn create(&self) -> Result<Connection> {
      let slot = ReservedSlot {
         size: &self.size,
         filled: false,
      };

      let connection = Connection::new(self.parameters.clone());
      if let Err(e) = connection.open().await {
         warn!(database = %self.parameters.database, error = %e, "Failed to create pooled connection");
         return Err(e.into());
      }
      slot.fill();

      debug!(database = %self.parameters.database, size = self.size(), "Pooled connection created");
      Ok(connection)
   }

   /// Free the slot of a connection, then close it.
   pub(crate) async fn destroy(&self, connection: Connection) {
      self.size.fetch_sub(1, Ordering::AcqRel);
      self.close_connection(connection).await;
   }

   async fn close_connection(&self, connection: Connection) {
      if connection.is_connected()
         && let Err(e) = connection.close().await
      {
         warn!(database = %self.parameters.database, error = %e, "Failed to close pooled connection");
      }
      debug!(database = %self.parameters.database, size = self.size(), "Pooled connection destroyed");
   }

   /// Round-trip check of an idle connection, bounded by the validation
   /// timeout.
   async fn validate(&self, connection: &Connection) -> bool {
      let check = connection.query_read("SELECT 1 AS value", vec![]);
      match tokio::time::timeout(self.config.validation_timeout, check).await {
         Ok(Ok(rows)) => {
            let valid = rows.first().and_then(|row| row.get("value")) == Some(&json!(1));
            if !valid {
               warn!(database = %self.parameters.database, "Validation query returned an unexpected value");
            }
            valid
         }
         Ok(Err(e)) => {
            warn!(database = %self.parameters.database, error = %e, "Pooled connection failed validation");
            false
         }
         Err(_) => {
            warn!(
               database = %self.parameters.database,
               timeout = ?self.config.validation_timeout,
               "Pooled connection validation timed out"
            );
            false
         }
      }
   }

   /// Take back a borrowed connection.
   pub(crate) fn release(&self, connection: Connection) {
      if !self.is_closed() {
         self.idle.lock().push_back(connection);
         return;
      }

      self.size.fetch_sub(1, Ordering::AcqRel);
      if connection.is_connected()
         && let Ok(handle) = Handle::try_current()
      {
         handle.spawn(async move {
            if let Err(e) = connection.close().await {
               warn!(error = %e, "Failed to close connection returned to a closed pool");
            }
         });
      }
   }

   /// Forget a borrowed connection without closing it.
   pub(crate) fn detach(&self) {
      self.size.fetch_sub(1, Ordering::AcqRel);
      trace!(database = %self.parameters.database, size = self.size(), "Connection detached from pool");
   }

   /// Destroy idle connections inactive for longer than the idle timeout,
   /// keeping at least `min` alive.
   async fn evict(&self) {
      let min = self.config.min as usize;
      let expired: Vec<Connection> = {
         let mut idle = self.idle.lock();
         let mut expired = Vec::new();
         let mut kept = VecDeque::with_capacity(idle.len());
         while let Some(connection) = idle.pop_front() {
            let stale = connection.last_active().elapsed() >= self.config.idle_timeout;
            if stale && self.size().saturating_sub(expired.len()) > min {
               expired.push(connection);
            } else {
               kept.push_back(connection);
            }
         }
         *idle = kept;
         expired
      };

      if !expired.is_empty() {
         debug!(database = %self.parameters.database, count = expired.len(), "Evicting idle connections");
      }
      for connection in expired {
         self.destroy(connection).await;
      }
   }

   /// Open idle connections until `min` are live.
   async fn fill_to_min(&self) {
      while !self.is_closed() && self.reserve_slot(self.config.min as usize) {
         match self.create().await {
            Ok(connection) => self.idle.lock().push_back(connection),
            Err(_) => break,
         }
      }
   }
}

/// Slot taken by [`PoolInner::reserve_slot`], given back on drop unless a
/// connection was opened into it.
struct ReservedSlot<'a> {
   size: &'a AtomicUsize,
   filled: bool,
}

impl ReservedSlot<'_> {
   fn fill(mut self) {
      self.filled = true;
   }
}

impl Drop for ReservedSlot<'_> {
   fn drop(&mut self) {
      if !self.filled {
         self.size.fetch_sub(1, Ordering::AcqRel);
      }
   }
}

async fn run_eviction(pool: Weak<PoolInner>) {
   let period = match pool.upgrade() {
      Some(inner) => {
         inner.fill_to_min().await;
         inner.config.eviction_run_interval
      }
      None => return,
   };

   let mut interval = tokio::time::interval(period);
   interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
   // The first tick completes immediately
   interval.tick().await;

   loop {
      interval.tick().await;
      let Some(inner) = pool.upgrade() else {
         break;
      };
      if inner.is_closed() {
         break;
      }

      inner.evict().await;
      inner.fill_to_min().await;
   }

   trace!("Eviction task stopped");
}
