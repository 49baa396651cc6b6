//! Integration tests for Sage.

pub mod pipeline_test;
pub mod postgres_test;
pub mod store_test;

use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

/// Statements for the network-inventory fixture database.
const INVENTORY_SCHEMA: &[&str] = &[
    "CREATE TABLE vip (vip_id INTEGER NOT NULL, vip_address VARCHAR(100) NOT NULL, port INTEGER NOT NULL, PRIMARY KEY (vip_id))",
    "CREATE TABLE load_balancer (device_id INTEGER NOT NULL, device_name VARCHAR(100) NOT NULL, location VARCHAR(100) NOT NULL, vip_id INTEGER, PRIMARY KEY (device_id), FOREIGN KEY(vip_id) REFERENCES vip (vip_id))",
    "CREATE TABLE maintenance_window (window_id INTEGER PRIMARY KEY, starts_at TEXT NOT NULL, notes TEXT)",
    "INSERT INTO vip VALUES (1, '10.0.0.1', 443), (2, '10.0.0.2', 80)",
    "INSERT INTO load_balancer VALUES (1, 'lb-east-1', 'us-east', 1), (2, 'lb-west-1', 'us-west', 2), (3, 'lb-east-2', 'US-EAST', NULL)",
];

/// Creates a SQLite source database from `statements` and returns a
/// read-only URL for it.
pub async fn create_source_db(dir: &TempDir, statements: &[&str]) -> String {
    let path = dir.path().join("source.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .unwrap();

    for stmt in statements {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;

    format!("sqlite:{}", path.display())
}

/// Creates the network-inventory fixture database.
pub async fn create_inventory_db(dir: &TempDir) -> String {
    create_source_db(dir, INVENTORY_SCHEMA).await
}
