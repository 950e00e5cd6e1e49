//! Connection string parsing.
//!
//! A connection string has the form `[host[/port]:]database-path`. A colon at
//! index 0 or 1 never separates a host, so Windows drive letters (`d:/db.fdb`)
//! and `:memory:` are read as plain database paths.

use serde::{Deserialize, Serialize};

/// Structured connection parameters, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParameters {
   /// Host name, empty for a local database file
   pub host: String,
   /// Port, empty when not given
   pub port: String,
   /// Database path, never empty
   pub database: String,
   pub user: String,
   #[serde(skip_serializing)]
   pub password: String,
   /// Lower-case column names in result rows
   pub lowercase_keys: bool,
}

impl ConnectionParameters {
   /// Parse `url` and attach credentials. Returns `None` when `url` is empty.
   pub fn from_url(url: &str, user: impl Into<String>, password: impl Into<String>) -> Option<Self> {
      let mut parameters = parse(Some(url))?;
      parameters.user = user.into();
      parameters.password = password.into();
      Some(parameters)
   }

   /// Whether the parameters point at a database on this machine.
   pub fn is_local(&self) -> bool {
      matches!(
         self.host.as_str(),
         "" | "localhost" | "127.0.0.1" | "::1"
      )
   }
}

/// Parse a `[host[/port]:]database-path` connection string.
///
/// Never fails on non-empty input: anything that does not look like a host
/// prefix is kept as the database path.
pub fn parse(url: Option<&str>) -> Option<ConnectionParameters> {
   let url = url.filter(|u| !u.is_empty())?;

   let (host, port, database) = match url.find(':') {
      Some(index) if index > 1 => {
         let host_part = &url[..index];
         let database = &url[index + 1..];
         match host_part.split_once('/') {
            Some((host, port)) => (host, port, database),
            None => (host_part, "", database),
         }
      }
      _ => ("", "", url),
   };

   Some(ConnectionParameters {
      host: host.to_string(),
      port: port.to_string(),
      database: database.to_string(),
      user: String::new(),
      password: String::new(),
      lowercase_keys: true,
   })
}
