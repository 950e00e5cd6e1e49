//! # restfront-conn
//!
//! Connection, transaction and prepared-statement management on top of SQLx
//! for SQLite, shaped for REST backends that need explicit isolation control.
//!
//! ## Core Types
//!
//! - **[`Connection`]**: one logical database link with a cached read
//!   transaction and commit-or-rollback helpers
//! - **[`Transaction`]**: a read, write or snapshot transaction
//! - **[`PreparedStatement`]**: a compiled statement executed repeatedly on
//!   one transaction
//! - **[`Metadata`]**: catalog existence checks and engine version
//! - **[`Migration`]**: journal of applied schema migrations
//! - **[`Error`]**: error type for all of the above
//!
//! ## Example
//!
//! ```no_run
//! use restfront_conn::Connection;
//! use serde_json::json;
//!
//! # async fn example() -> restfront_conn::Result<()> {
//! let connection = Connection::from_url("/var/lib/app/main.db", "app", "secret")?;
//! connection.open().await?;
//!
//! connection
//!    .on_write_transaction(|tx| async move {
//!       tx.query("INSERT INTO users (name) VALUES (?)", vec![json!("Alice")])
//!          .await?;
//!       tx.query("INSERT INTO audit (event) VALUES (?)", vec![json!("user added")])
//!          .await?;
//!       Ok::<_, restfront_conn::Error>(())
//!    })
//!    .await?;
//!
//! let rows = connection
//!    .query_read("SELECT name FROM users", vec![])
//!    .await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod decode;
mod error;
mod metadata;
mod migration;
mod statement;
mod transaction;
pub mod url;

pub use connection::Connection;
pub use decode::Row;
pub use error::{Error, Result};
pub use metadata::{Metadata, ServerVersion, parse_server_version};
pub use migration::{MIGRATION_TABLE, Migration};
pub use statement::{PreparedStatement, StatementKind};
pub use transaction::{Isolation, Transaction};
pub use url::{ConnectionParameters, parse as parse_url};
