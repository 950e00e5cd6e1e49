use std::time::Duration;

use restfront_conn::{Connection, ConnectionParameters};
use restfront_pool::{Error, Pool, PoolConfig};
use serde_json::json;
use tempfile::TempDir;

fn init_tracing() {
   let _ = tracing_subscriber::fmt()
      .with_test_writer()
      .with_max_level(tracing::Level::DEBUG)
      .try_init();
}

async fn create_test_db() -> (ConnectionParameters, TempDir) {
   init_tracing();

   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db_path = temp_dir.path().join("test.db");
   let parameters = ConnectionParameters::from_url(db_path.to_str().unwrap(), "SYSDBA", "masterkey")
      .expect("Failed to parse connection string");

   let connection = Connection::new(parameters.clone());
   connection.create().await.expect("Failed to create test database");
   connection.close().await.unwrap();

   (parameters, temp_dir)
}

fn config(max: u32) -> PoolConfig {
   PoolConfig {
      max,
      acquire_timeout: Duration::from_secs(5),
      ..Default::default()
   }
}

#[tokio::test]
async fn acquire_returns_connected_connection() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(3)).unwrap();

   let connection = pool.acquire().await.unwrap();
   assert!(connection.is_connected());

   let rows = connection
      .query_read("SELECT 1 AS value", vec![])
      .await
      .unwrap();
   assert_eq!(rows[0]["value"], json!(1));
   assert_eq!(pool.size(), 1);
   assert_eq!(pool.idle_count(), 0);

   pool.release(connection);
   assert_eq!(pool.size(), 1);
   assert_eq!(pool.idle_count(), 1);

   pool.close().await;
}

#[tokio::test]
async fn released_connection_is_reused() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(3)).unwrap();

   let first = pool.acquire().await.unwrap();
   let read_tx = first.get_read_transaction().await.unwrap();
   drop(first);

   let second = pool.acquire().await.unwrap();
   let same_read_tx = second.get_read_transaction().await.unwrap();
   assert!(read_tx.same_as(&same_read_tx));
   assert_eq!(pool.size(), 1);

   pool.close().await;
}

#[tokio::test]
async fn pool_never_exceeds_max() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(2)).unwrap();

   let _a = pool.acquire().await.unwrap();
   let _b = pool.acquire().await.unwrap();
   assert_eq!(pool.size(), 2);

   let err = pool
      .acquire_timeout(Duration::from_millis(100))
      .await
      .unwrap_err();
   assert!(matches!(err, Error::Timeout(_)));
   assert_eq!(err.error_code(), "POOL_TIMEOUT");
   assert_eq!(pool.size(), 2);

   pool.close().await;
}

#[tokio::test]
async fn release_unblocks_waiting_acquirer() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(1)).unwrap();

   let held = pool.acquire().await.unwrap();

   let waiter = {
      let pool = pool.clone();
      tokio::spawn(async move {
         let connection = pool.acquire_timeout(Duration::from_secs(5)).await?;
         connection.query_read("SELECT 1 AS value", vec![]).await?;
         Ok::<_, Error>(())
      })
   };

   tokio::time::sleep(Duration::from_millis(50)).await;
   assert!(!waiter.is_finished());

   drop(held);
   waiter.await.unwrap().unwrap();
   assert_eq!(pool.size(), 1);

   pool.close().await;
}

#[tokio::test]
async fn broken_connection_is_replaced_on_borrow() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(1)).unwrap();

   let connection = pool.acquire().await.unwrap();
   connection.close().await.unwrap();
   pool.release(connection);
   assert_eq!(pool.idle_count(), 1);

   // Validation discards the closed connection and opens a new one
   let connection = pool.acquire().await.unwrap();
   assert!(connection.is_connected());
   assert_eq!(pool.size(), 1);

   pool.close().await;
}

#[tokio::test]
async fn creation_failure_is_reported_immediately() {
   init_tracing();
   let temp_dir = TempDir::new().unwrap();
   let missing = temp_dir.path().join("missing.db");
   let parameters = ConnectionParameters::from_url(missing.to_str().unwrap(), "", "").unwrap();
   let pool = Pool::new(parameters, config(2)).unwrap();

   let err = pool
      .acquire_timeout(Duration::from_secs(30))
      .await
      .unwrap_err();
   match err {
      Error::Connection(e) => assert!(e.is_connectivity_error()),
      other => panic!("expected connection error, got {other:?}"),
   }
   assert_eq!(pool.size(), 0);

   pool.close().await;
}

#[tokio::test]
async fn closed_pool_rejects_acquire() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(2)).unwrap();

   let idle = pool.acquire().await.unwrap();
   let borrowed = pool.acquire().await.unwrap();
   drop(idle);

   pool.close().await;
   assert!(pool.is_closed());
   assert_eq!(pool.idle_count(), 0);
   assert_eq!(pool.size(), 1);

   assert!(matches!(
      pool.acquire().await.unwrap_err(),
      Error::PoolClosed
   ));

   // Returning after close closes the connection instead of keeping it
   drop(borrowed);
   assert_eq!(pool.size(), 0);
   assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn close_wakes_waiting_acquirers() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(1)).unwrap();

   let held = pool.acquire().await.unwrap();
   let waiter = {
      let pool = pool.clone();
      tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(5)).await })
   };

   tokio::time::sleep(Duration::from_millis(50)).await;
   pool.close().await;

   assert!(matches!(waiter.await.unwrap(), Err(Error::PoolClosed)));
   drop(held);
}

#[tokio::test]
async fn detached_connection_frees_its_slot() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(parameters, config(1)).unwrap();

   let connection = pool.acquire().await.unwrap().detach().unwrap();
   assert_eq!(pool.size(), 0);

   // The slot is free again while the detached connection stays usable
   let pooled = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();
   assert!(pooled.is_connected());
   assert!(connection.is_connected());

   connection.close().await.unwrap();
   drop(pooled);
   pool.close().await;
}

#[tokio::test]
async fn idle_connections_are_evicted() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(
      parameters,
      PoolConfig {
         max: 3,
         eviction_run_interval: Duration::from_millis(50),
         idle_timeout: Duration::from_millis(100),
         ..Default::default()
      },
   )
   .unwrap();

   let a = pool.acquire().await.unwrap();
   let b = pool.acquire().await.unwrap();
   drop(a);
   drop(b);
   assert_eq!(pool.idle_count(), 2);

   tokio::time::sleep(Duration::from_millis(400)).await;
   assert_eq!(pool.idle_count(), 0);
   assert_eq!(pool.size(), 0);

   pool.close().await;
}

#[tokio::test]
async fn eviction_keeps_min_connections() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(
      parameters,
      PoolConfig {
         max: 3,
         min: 1,
         eviction_run_interval: Duration::from_millis(50),
         idle_timeout: Duration::from_millis(100),
         ..Default::default()
      },
   )
   .unwrap();

   let a = pool.acquire().await.unwrap();
   let b = pool.acquire().await.unwrap();
   drop(a);
   drop(b);

   tokio::time::sleep(Duration::from_millis(400)).await;
   assert_eq!(pool.size(), 1);
   assert_eq!(pool.idle_count(), 1);

   pool.close().await;
}

#[tokio::test]
async fn pool_fills_up_to_min() {
   let (parameters, _temp) = create_test_db().await;
   let pool = Pool::new(
      parameters,
      PoolConfig {
         max: 3,
         min: 2,
         eviction_run_interval: Duration::from_millis(50),
         ..Default::default()
      },
   )
   .unwrap();

   tokio::time::sleep(Duration::from_millis(200)).await;
   assert_eq!(pool.size(), 2);
   assert_eq!(pool.idle_count(), 2);

   pool.close().await;
   assert_eq!(pool.size(), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
   let (parameters, _temp) = create_test_db().await;
   let err = Pool::new(
      parameters,
      PoolConfig {
         max: 1,
         min: 2,
         ..Default::default()
      },
   )
   .unwrap_err();
   assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn pool_outside_runtime_is_rejected() {
   let parameters = ConnectionParameters::from_url("/tmp/no-runtime.db", "", "").unwrap();

   let err = Pool::new(parameters.clone(), PoolConfig::default()).unwrap_err();
   assert!(matches!(err, Error::NoRuntime));
   assert_eq!(err.error_code(), "NO_RUNTIME");

   // Without eviction there is nothing to spawn
   let pool = Pool::new(
      parameters,
      PoolConfig {
         eviction_run_interval: Duration::ZERO,
         ..Default::default()
      },
   )
   .unwrap();
   assert_eq!(pool.size(), 0);
}
