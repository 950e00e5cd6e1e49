//! Configuration for connection pools

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`Pool`](crate::Pool)
///
/// Deserializes from the option names used by REST configuration files,
/// with durations in milliseconds. Missing options keep their defaults.
///
/// # Examples
///
/// ```
/// use restfront_pool::PoolConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = PoolConfig::default();
///
/// // Override just a few fields
/// let config = PoolConfig {
///    max: 10,
///    idle_timeout: Duration::from_secs(60),
///    ..Default::default()
/// };
///
/// // From configuration
/// let config: PoolConfig =
///    serde_json::from_str(r#"{"max": 5, "acquireTimeoutMillis": 1000}"#).unwrap();
/// assert_eq!(config.acquire_timeout, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolConfig {
   /// Maximum number of live connections, borrowed and idle combined
   ///
   /// Default: 3
   pub max: u32,

   /// Number of live connections eviction will not shrink below, and that the
   /// pool tops back up to after each eviction run
   ///
   /// Default: 0
   pub min: u32,

   /// Validate idle connections with a round-trip query before handing them
   /// out
   ///
   /// Default: true
   pub test_on_borrow: bool,

   /// How long [`Pool::acquire`](crate::Pool::acquire) waits for a connection
   ///
   /// Default: 60 seconds
   #[serde(rename = "acquireTimeoutMillis", with = "millis")]
   pub acquire_timeout: Duration,

   /// Period of the background eviction run. Zero disables eviction.
   ///
   /// Default: 30 seconds
   #[serde(rename = "evictionRunIntervalMillis", with = "millis")]
   pub eviction_run_interval: Duration,

   /// Idle connections inactive for longer than this are destroyed by the
   /// eviction run
   ///
   /// Default: 5 minutes
   #[serde(rename = "idleTimeoutMillis", with = "millis")]
   pub idle_timeout: Duration,

   /// Upper bound for the validation query
   ///
   /// Default: 5 seconds
   #[serde(rename = "validationTimeoutMillis", with = "millis")]
   pub validation_timeout: Duration,
}

impl Default for PoolConfig {
   fn default() -> Self {
      Self {
         max: 3,
         min: 0,
         test_on_borrow: true,
         acquire_timeout: Duration::from_secs(60),
         eviction_run_interval: Duration::from_secs(30),
         idle_timeout: Duration::from_secs(300),
         validation_timeout: Duration::from_secs(5),
      }
   }
}

impl PoolConfig {
   /// Check the bounds, returning a description of the first violation.
   pub(crate) fn validate(&self) -> Result<(), String> {
      if self.max == 0 {
         return Err("max must be at least 1".to_string());
      }
      if self.min > self.max {
         return Err(format!("min ({}) exceeds max ({})", self.min, self.max));
      }
      Ok(())
   }
}

mod millis {
   use std::time::Duration;

   use serde::{Deserialize, Deserializer, Serializer};

   pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
      let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
      serializer.serialize_u64(millis)
   }

   pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
      u64::deserialize(deserializer).map(Duration::from_millis)
   }
}
