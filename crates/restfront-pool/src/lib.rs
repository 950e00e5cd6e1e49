//! # restfront-pool
//!
//! A bounded pool of [`restfront_conn::Connection`]s that validates
//! connections before handing them out and evicts idle ones in the
//! background.
//!
//! ## Core Types
//!
//! - **[`Pool`]**: the pool itself; cheap to clone
//! - **[`PooledConnection`]**: RAII guard for a borrowed connection
//! - **[`PoolConfig`]**: bounds and timeouts
//! - **[`Error`]**: error type for pool operations
//!
//! ## Example
//!
//! ```no_run
//! use restfront_conn::ConnectionParameters;
//! use restfront_pool::{Pool, PoolConfig};
//!
//! # async fn example() -> restfront_pool::Result<()> {
//! let parameters = ConnectionParameters::from_url("/var/lib/app/main.db", "app", "secret")
//!    .expect("non-empty url");
//! let pool = Pool::new(parameters, PoolConfig::default())?;
//!
//! {
//!    let connection = pool.acquire().await?;
//!    let rows = connection.query_read("SELECT 1 AS value", vec![]).await?;
//!    assert_eq!(rows.len(), 1);
//! } // returned to the pool here
//!
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod guard;
mod pool;

pub use config::PoolConfig;
pub use error::{Error, Result};
pub use guard::PooledConnection;
pub use pool::Pool;
