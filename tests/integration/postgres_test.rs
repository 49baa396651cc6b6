//! PostgreSQL integration tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use db_sage::db::{DatabaseClient, PostgresClient};
use db_sage::error::SageError;
use db_sage::schema::{refresh_all, KeywordIndex, SchemaStore};
use tempfile::tempdir;

/// Helper to create a test client.
async fn get_test_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    if !url.starts_with("postgres") {
        return None;
    }
    PostgresClient::connect(&url).await.ok()
}

#[tokio::test]
async fn test_refresh_from_postgres() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let dir = tempdir().unwrap();
    let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();
    let summary = refresh_all(&client, &store, &KeywordIndex::new())
        .await
        .unwrap();

    let snapshot = store.list_all().await.unwrap();
    assert_eq!(snapshot.len(), summary.refreshed.len());
    for record in snapshot.values() {
        assert!(
            !record.columns.is_empty(),
            "table {} has no columns",
            record.table_name
        );
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_postgres_rejects_writes() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = client
        .execute_query("CREATE TABLE sage_should_not_exist (id INTEGER)")
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::ExecutionFailed(_)));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_postgres_select_literal() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1 AS one, 'us-east' AS location")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["one", "location"]);
    assert_eq!(result.row_count(), 1);

    client.close().await.unwrap();
}
