//! # restfront-db
//!
//! Database layer for REST backends: connections with explicit read, write
//! and snapshot transactions, a bounded connection pool, catalog checks and
//! a migration journal with a runner.
//!
//! ## Crates
//!
//! - **`restfront-conn`**: [`Connection`], [`Transaction`],
//!   [`PreparedStatement`], [`Metadata`] and [`Migration`]
//! - **`restfront-pool`**: [`Pool`] of connections with validation and idle
//!   eviction
//!
//! This crate re-exports both and adds the factories below plus the
//! [`migrate`] runner.
//!
//! ## Example
//!
//! ```no_run
//! use restfront_db::{PoolConfig, create_pool};
//! use serde_json::json;
//!
//! # async fn example() -> restfront_db::Result<()> {
//! let pool = create_pool("/var/lib/app/main.db", "app", "secret", PoolConfig::default())?;
//!
//! let connection = pool.acquire().await?;
//! let rows = connection
//!    .query_read("SELECT name FROM users WHERE id = ?", vec![json!(1)])
//!    .await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod escape;
pub mod migrate;

pub use error::{Error, Result};
pub use escape::escape;
pub use restfront_conn::{
   Connection, ConnectionParameters, Isolation, MIGRATION_TABLE, Metadata, Migration,
   PreparedStatement, Row, ServerVersion, StatementKind, Transaction, parse_server_version,
   parse_url,
};
pub use restfront_conn::Error as ConnectionError;
pub use restfront_pool::Error as PoolError;
pub use restfront_pool::{Pool, PoolConfig, PooledConnection};

/// Create a detached connection; call [`Connection::open`] to attach it.
pub fn create_connection(url: &str, user: &str, password: &str) -> Result<Connection> {
   Ok(Connection::from_url(url, user, password)?)
}

/// Create a connection pool. Connections are opened on demand.
///
/// Fails with `PoolError::NoRuntime` outside a Tokio runtime unless idle
/// eviction is disabled.
pub fn create_pool(url: &str, user: &str, password: &str, config: PoolConfig) -> Result<Pool> {
   let parameters = ConnectionParameters::from_url(url, user, password)
      .ok_or_else(|| restfront_conn::Error::InvalidUrl(url.to_string()))?;
   Ok(Pool::new(parameters, config)?)
}
