/// Result type alias for restfront-db operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the database layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the connection layer.
   #[error(transparent)]
   Connection(#[from] restfront_conn::Error),

   /// Error from the connection pool.
   #[error(transparent)]
   Pool(#[from] restfront_pool::Error),

   /// Migration descriptor is incomplete.
   #[error("invalid migration: {0}")]
   InvalidMigration(String),

   /// Migration date is not a `YYYY-MM-DD` date.
   #[error("invalid migration date '{0}', expected YYYY-MM-DD")]
   InvalidMigrationDate(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Connection(e) => e.error_code(),
         Error::Pool(e) => e.error_code(),
         Error::InvalidMigration(_) => "INVALID_MIGRATION".to_string(),
         Error::InvalidMigrationDate(_) => "INVALID_MIGRATION_DATE".to_string(),
      }
   }
}
