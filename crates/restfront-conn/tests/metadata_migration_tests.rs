use restfront_conn::{Connection, Error, MIGRATION_TABLE};
use serde_json::json;
use tempfile::TempDir;
use time::{Date, Month};

async fn create_test_db() -> (Connection, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db_path = temp_dir.path().join("test.db");
   let connection = Connection::from_url(db_path.to_str().unwrap(), "SYSDBA", "masterkey")
      .expect("Failed to parse connection string");
   connection
      .create()
      .await
      .expect("Failed to create test database");

   (connection, temp_dir)
}

async fn create_schema(db: &Connection) {
   db.on_write_transaction(|tx| async move {
      let statements = [
         "CREATE TABLE customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            CONSTRAINT pk_customers_unused CHECK (id > 0)
         )",
         "CREATE TABLE orders (
            id INTEGER NOT NULL,
            customer_id INTEGER,
            total REAL,
            CONSTRAINT pk_orders PRIMARY KEY (id),
            CONSTRAINT fk_orders_customer FOREIGN KEY (customer_id) REFERENCES customers(id)
         )",
         "CREATE INDEX idx_orders_customer ON orders (customer_id)",
         "CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100",
         "CREATE TRIGGER trg_orders_ai AFTER INSERT ON orders BEGIN SELECT 1; END",
      ];
      for sql in statements {
         tx.query(sql, vec![]).await?;
      }
      Ok::<_, Error>(())
   })
   .await
   .unwrap();
}

// ─── Metadata ───

#[tokio::test]
async fn object_checks_ignore_case() {
   let (db, _temp) = create_test_db().await;
   create_schema(&db).await;
   let metadata = db.metadata();

   assert!(metadata.table_exists("orders").await.unwrap());
   assert!(metadata.table_exists("ORDERS").await.unwrap());
   assert!(!metadata.table_exists("missing").await.unwrap());
   // A view is not a table
   assert!(!metadata.table_exists("big_orders").await.unwrap());

   assert!(metadata.view_exists("Big_Orders").await.unwrap());
   assert!(metadata.index_exists("IDX_ORDERS_CUSTOMER").await.unwrap());
   assert!(!metadata.index_exists("idx_missing").await.unwrap());
   assert!(metadata.trigger_exists("trg_orders_ai").await.unwrap());
   assert!(!metadata.trigger_exists("orders").await.unwrap());
}

#[tokio::test]
async fn empty_names_are_never_found() {
   let (db, _temp) = create_test_db().await;
   create_schema(&db).await;
   let metadata = db.metadata();

   assert!(!metadata.table_exists("").await.unwrap());
   assert!(!metadata.field_exists("", "id").await.unwrap());
   assert!(!metadata.field_exists("orders", "").await.unwrap());
   assert!(!metadata.index_exists("").await.unwrap());
   assert!(!metadata.generator_exists("").await.unwrap());
   assert!(!metadata.primary_key_exists("orders", "").await.unwrap());
   assert!(!metadata.foreign_key_exists("", "fk_orders_customer").await.unwrap());
}

#[tokio::test]
async fn field_checks() {
   let (db, _temp) = create_test_db().await;
   create_schema(&db).await;
   let metadata = db.metadata();

   assert!(metadata.field_exists("orders", "total").await.unwrap());
   assert!(metadata.field_exists("ORDERS", "Customer_Id").await.unwrap());
   assert!(!metadata.field_exists("orders", "name").await.unwrap());
   assert!(!metadata.field_exists("missing", "id").await.unwrap());
}

#[tokio::test]
async fn key_constraint_checks() {
   let (db, _temp) = create_test_db().await;
   create_schema(&db).await;
   let metadata = db.metadata();

   assert!(metadata.primary_key_exists("orders", "PK_ORDERS").await.unwrap());
   assert!(!metadata.primary_key_exists("customers", "pk_orders").await.unwrap());
   // A CHECK constraint is not a primary key
   assert!(
      !metadata
         .primary_key_exists("customers", "pk_customers_unused")
         .await
         .unwrap()
   );

   assert!(
      metadata
         .foreign_key_exists("orders", "fk_orders_customer")
         .await
         .unwrap()
   );
   assert!(!metadata.foreign_key_exists("orders", "pk_orders").await.unwrap());
}

#[tokio::test]
async fn generator_and_unsupported_checks() {
   let (db, _temp) = create_test_db().await;
   create_schema(&db).await;
   let metadata = db.metadata();

   assert!(metadata.generator_exists("customers").await.unwrap());
   assert!(!metadata.generator_exists("orders").await.unwrap());

   assert!(!metadata.procedure_exists("sp_anything").await.unwrap());
   assert!(!metadata.exception_exists("e_anything").await.unwrap());
   assert!(!metadata.domain_exists("d_anything").await.unwrap());
}

#[tokio::test]
async fn server_version_is_reported() {
   let (db, _temp) = create_test_db().await;

   let version = db.metadata().get_server_version().await.unwrap();
   assert_eq!(version.major, 3);
   assert!(version.minor > 0);
}

#[tokio::test]
async fn metadata_requires_connection() {
   let (db, _temp) = create_test_db().await;
   db.close().await.unwrap();

   let err = db.metadata().table_exists("orders").await.unwrap_err();
   assert!(matches!(err, Error::NotConnected));
   // Empty names still short-circuit
   assert!(!db.metadata().table_exists("").await.unwrap());
}

// ─── Migration journal ───

#[tokio::test]
async fn init_is_idempotent() {
   let (db, _temp) = create_test_db().await;
   let migration = db.migration();

   migration.init().await.unwrap();
   migration.init().await.unwrap();

   let metadata = db.metadata();
   assert!(metadata.table_exists(MIGRATION_TABLE).await.unwrap());
   assert!(metadata.field_exists(MIGRATION_TABLE, "project").await.unwrap());
   assert!(
      metadata
         .primary_key_exists(MIGRATION_TABLE, "rf_pk_migration")
         .await
         .unwrap()
   );
}

#[tokio::test]
async fn log_then_check() {
   let (db, _temp) = create_test_db().await;
   let migration = db.migration();
   migration.init().await.unwrap();

   assert!(!migration.check("crm", 1).await.unwrap());

   let tx = db.get_write_transaction().await.unwrap();
   let date = Date::from_calendar_date(2019, Month::July, 15).unwrap();
   migration
      .log(&tx, "crm", 1, "create customers", Some(date), Some("ops"))
      .await
      .unwrap();

   // Not visible before commit
   assert!(!migration.check("crm", 1).await.unwrap());
   tx.commit().await.unwrap();

   assert!(migration.check("crm", 1).await.unwrap());
   // Keyed by project and id
   assert!(!migration.check("", 1).await.unwrap());
   assert!(!migration.check("crm", 2).await.unwrap());

   let rows = db
      .query_read(
         "SELECT name, migrationdate, author FROM rf_migration WHERE project = ? AND id = ?",
         vec![json!("crm"), json!(1)],
      )
      .await
      .unwrap();
   assert_eq!(rows[0]["name"], json!("create customers"));
   assert_eq!(rows[0]["migrationdate"], json!("2019-07-15"));
   assert_eq!(rows[0]["author"], json!("ops"));
}

#[tokio::test]
async fn log_rolled_back_leaves_no_entry() {
   let (db, _temp) = create_test_db().await;
   let migration = db.migration();
   migration.init().await.unwrap();

   let tx = db.get_write_transaction().await.unwrap();
   migration
      .log(&tx, "", 7, "never applied", None, None)
      .await
      .unwrap();
   tx.rollback().await.unwrap();

   assert!(!migration.check("", 7).await.unwrap());
}

#[tokio::test]
async fn duplicate_log_is_rejected() {
   let (db, _temp) = create_test_db().await;
   let migration = db.migration();
   migration.init().await.unwrap();

   let tx = db.get_write_transaction().await.unwrap();
   migration.log(&tx, "", 1, "first", None, None).await.unwrap();
   let err = migration
      .log(&tx, "", 1, "again", None, None)
      .await
      .unwrap_err();
   assert!(matches!(err, Error::Query(_)));
   tx.rollback().await.unwrap();
}

#[tokio::test]
async fn legacy_journal_is_upgraded() {
   let (db, _temp) = create_test_db().await;

   db.on_write_transaction(|tx| async move {
      tx.query(
         "CREATE TABLE rf_migration (
            id INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL,
            migrationdate DATE,
            author VARCHAR(1024),
            executeddate TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL,
            CONSTRAINT rf_pk_migration PRIMARY KEY (id)
         )",
         vec![],
      )
      .await?;
      tx.query(
         "INSERT INTO rf_migration (id, name) VALUES (1, 'legacy')",
         vec![],
      )
      .await?;
      Ok::<_, Error>(())
   })
   .await
   .unwrap();

   let migration = db.migration();
   migration.init().await.unwrap();

   assert!(db.metadata().field_exists(MIGRATION_TABLE, "project").await.unwrap());
   // Existing entries land in the default project
   assert!(migration.check("", 1).await.unwrap());

   // The same id can now be logged for another project
   let tx = db.get_write_transaction().await.unwrap();
   migration.log(&tx, "crm", 1, "other", None, None).await.unwrap();
   tx.commit().await.unwrap();
   assert!(migration.check("crm", 1).await.unwrap());
}
