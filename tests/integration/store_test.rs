//! Schema store and refresh integration tests.

use db_sage::db::{self, SqliteClient};
use db_sage::error::SageError;
use db_sage::schema::{refresh_all, refresh_table, KeywordIndex, SchemaStore};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use super::{create_inventory_db, create_source_db};

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let url = create_inventory_db(&dir).await;
    let source = SqliteClient::connect(&url).await.unwrap();
    let store_path = dir.path().join("schema.db");

    {
        let store = SchemaStore::open(&store_path).await.unwrap();
        refresh_all(&source, &store, &KeywordIndex::new()).await.unwrap();
        store.close().await;
    }

    let store = SchemaStore::open(&store_path).await.unwrap();
    let snapshot = store.list_all().await.unwrap();
    assert_eq!(
        snapshot.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["load_balancer", "maintenance_window", "vip"]
    );

    let lb = store.get("load_balancer").await.unwrap();
    let columns: Vec<&str> = lb.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["device_id", "device_name", "location", "vip_id"]);
    assert!(lb.columns[0].is_primary_key);
    assert_eq!(lb.foreign_keys[0].describe(), "vip_id -> vip.vip_id");
}

#[tokio::test]
async fn test_get_unknown_table_is_not_found() {
    let dir = tempdir().unwrap();
    let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();

    let err = store.get("ghost").await.unwrap_err();
    assert!(matches!(err, SageError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_prunes_dropped_tables() {
    let dir = tempdir().unwrap();
    let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();
    let index = KeywordIndex::new();

    let first = tempdir().unwrap();
    let url = create_inventory_db(&first).await;
    let source = db::connect(&url).await.unwrap();
    refresh_all(source.as_ref(), &store, &index).await.unwrap();

    let second = tempdir().unwrap();
    let url = create_source_db(
        &second,
        &["CREATE TABLE vip (vip_id INTEGER PRIMARY KEY, vip_address TEXT, region TEXT)"],
    )
    .await;
    let source = db::connect(&url).await.unwrap();
    let summary = refresh_all(source.as_ref(), &store, &index).await.unwrap();

    assert_eq!(summary.refreshed, vec!["vip"]);
    assert_eq!(summary.pruned, vec!["load_balancer", "maintenance_window"]);

    let vip = store.get("vip").await.unwrap();
    assert!(vip.columns.iter().any(|c| c.name == "region"));
    assert!(vip.columns.iter().all(|c| c.name != "port"));
}

#[tokio::test]
async fn test_refresh_single_table() {
    let dir = tempdir().unwrap();
    let url = create_inventory_db(&dir).await;
    let source = SqliteClient::connect(&url).await.unwrap();
    let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();

    let record = refresh_table(&source, &store, &KeywordIndex::new(), "maintenance_window")
        .await
        .unwrap();
    assert_eq!(record.table_name, "maintenance_window");
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}
