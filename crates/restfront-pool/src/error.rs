//! Error types for restfront-pool

use std::time::Duration;

use thiserror::Error;

/// Errors that may occur when borrowing from a [`Pool`](crate::Pool)
#[derive(Error, Debug)]
pub enum Error {
   /// No connection became available within the timeout
   #[error("Timed out after {0:?} waiting for a pooled connection")]
   Timeout(Duration),

   /// Pool has been closed and cannot hand out connections
   #[error("Pool has been closed")]
   PoolClosed,

   /// Pool configuration is out of bounds
   #[error("Invalid pool configuration: {0}")]
   InvalidConfig(String),

   /// Pool was created outside a Tokio runtime but needs one for eviction
   #[error("Pool eviction requires a Tokio runtime")]
   NoRuntime,

   /// Creating a connection failed
   #[error(transparent)]
   Connection(#[from] restfront_conn::Error),
}

impl Error {
   /// Get a machine-readable error code
   pub fn error_code(&self) -> String {
      match self {
         Error::Timeout(_) => "POOL_TIMEOUT".to_string(),
         Error::PoolClosed => "POOL_CLOSED".to_string(),
         Error::InvalidConfig(_) => "INVALID_POOL_CONFIG".to_string(),
         Error::NoRuntime => "NO_RUNTIME".to_string(),
         Error::Connection(e) => e.error_code(),
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
