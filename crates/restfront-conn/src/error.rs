/// Result type alias for connection-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SQLite primary result codes the callers branch on.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_READONLY: i32 = 8;

/// Error types for connection, transaction and statement operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The underlying link could not be established (missing file, bad path,
   /// unreachable host).
   #[error("failed to attach database '{database}': {source}")]
   Connectivity {
      database: String,
      #[source]
      source: sqlx::Error,
   },

   /// `create` was asked to create a database that is already present.
   #[error("database already exists: {0}")]
   DatabaseExists(String),

   /// The connection string names a host the embedded engine cannot reach.
   #[error("remote host '{0}' is not supported by the embedded engine")]
   UnsupportedHost(String),

   /// The connection string could not be parsed.
   #[error("invalid connection string: '{0}'")]
   InvalidUrl(String),

   /// Operation requires an open connection.
   #[error("database connection is not established")]
   NotConnected,

   /// Transaction has already been committed or rolled back.
   #[error("transaction has already been finalized (committed or rolled back)")]
   TransactionAlreadyFinalized,

   /// SQL, constraint or isolation failure reported by the engine.
   #[error(transparent)]
   Query(#[from] sqlx::Error),

   /// SQLite type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Connectivity { .. } => "CONNECTIVITY_ERROR".to_string(),
         Error::DatabaseExists(_) => "DATABASE_EXISTS".to_string(),
         Error::UnsupportedHost(_) => "UNSUPPORTED_HOST".to_string(),
         Error::InvalidUrl(_) => "INVALID_URL".to_string(),
         Error::NotConnected => "NOT_CONNECTED".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::Query(_) => match self.database_code() {
            Some(code) => format!("SQLITE_{}", code),
            None => "SQLX_ERROR".to_string(),
         },
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }

   /// Native engine result code (the extended SQLite code) when the engine
   /// produced this error.
   pub fn database_code(&self) -> Option<String> {
      match self {
         Error::Query(e) | Error::Connectivity { source: e, .. } => e
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned()),
         _ => None,
      }
   }

   /// Whether the operation was invoked in the wrong lifecycle state.
   pub fn is_state_error(&self) -> bool {
      matches!(
         self,
         Error::NotConnected | Error::TransactionAlreadyFinalized
      )
   }

   /// Whether the link could not be established.
   pub fn is_connectivity_error(&self) -> bool {
      matches!(
         self,
         Error::Connectivity { .. }
            | Error::DatabaseExists(_)
            | Error::UnsupportedHost(_)
            | Error::InvalidUrl(_)
      )
   }

   /// A write was attempted on a read-only transaction.
   pub fn is_read_only_violation(&self) -> bool {
      self.primary_code() == Some(SQLITE_READONLY)
   }

   /// A lock conflict surfaced immediately under no-wait locking.
   pub fn is_lock_conflict(&self) -> bool {
      matches!(self.primary_code(), Some(SQLITE_BUSY | SQLITE_LOCKED))
   }

   fn primary_code(&self) -> Option<i32> {
      self
         .database_code()
         .and_then(|code| code.parse::<i32>().ok())
         .map(|code| code & 0xff)
   }
}
