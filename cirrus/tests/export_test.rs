//! End-to-end export tests against an in-memory account.

use async_trait::async_trait;
use cirrus::{export, Error, MigrationConfig, ResourceKind};
use cirrus_storage::{
    Entity, MemoryAccount, QueueService, StorageClient, StorageError, TableService,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn entity(value: Value) -> Entity {
    value.as_object().cloned().unwrap()
}

fn config_for(root: &Path) -> MigrationConfig {
    let mut config = MigrationConfig::default();
    config.options.root = root.to_path_buf();
    config.options.workers = 4;
    config
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

async fn seed_users(account: &MemoryAccount) {
    account.create_table_if_not_exists("Users").await.unwrap();
    for row in ["1", "2", "3"] {
        account
            .insert_entity(
                "Users",
                entity(json!({
                    "PartitionKey": "p",
                    "RowKey": row,
                    "etag": format!("W/{}", row),
                    "payload": "{\"a\":1}",
                })),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_export_table_strips_and_decodes() {
    let account = Arc::new(MemoryAccount::new());
    seed_users(&account).await;
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let mut config = config_for(snap.path());
    config.ignore.columns = vec!["etag".to_string()];
    config
        .is_json
        .insert("Users".to_string(), vec!["payload".to_string()]);

    let report = export(&client, &config, &[ResourceKind::Tables])
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(
        report
            .kind(ResourceKind::Tables)
            .unwrap()
            .totals()
            .transferred,
        3
    );

    let rows = read_json(&snap.path().join("tables/Users"));
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert!(row.get("etag").is_none());
        assert_eq!(row["payload"], json!({"a": 1}));
    }

    // Rows are drained from the end of the result set
    let keys: Vec<_> = rows.iter().map(|r| r["RowKey"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["3", "2", "1"]);

    // Unrequested kinds leave no trace
    assert!(!snap.path().join("blobs").exists());
    assert!(report.kind(ResourceKind::Queues).is_none());
}

#[tokio::test]
async fn test_export_partition_filter() {
    let account = Arc::new(MemoryAccount::new());
    account.create_table_if_not_exists("Orders").await.unwrap();
    for (part, row) in [("a", "1"), ("b", "2"), ("a", "3")] {
        account
            .insert_entity("Orders", entity(json!({"PartitionKey": part, "RowKey": row})))
            .await
            .unwrap();
    }
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let mut config = config_for(snap.path());
    config.options.partition_key = Some("a".to_string());

    export(&client, &config, &[ResourceKind::Tables])
        .await
        .unwrap();

    let rows = read_json(&snap.path().join("tables/Orders"));
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_export_decode_failure_isolated_to_table() {
    let account = Arc::new(MemoryAccount::new());
    seed_users(&account).await;
    account.create_table_if_not_exists("Broken").await.unwrap();
    account
        .insert_entity(
            "Broken",
            entity(json!({"PartitionKey": "p", "RowKey": "1", "payload": "{oops"})),
        )
        .await
        .unwrap();
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let mut config = config_for(snap.path());
    for table in ["Users", "Broken"] {
        config
            .is_json
            .insert(table.to_string(), vec!["payload".to_string()]);
    }

    let report = export(&client, &config, &[ResourceKind::Tables])
        .await
        .unwrap();
    assert!(!report.is_success());

    let tables = report.kind(ResourceKind::Tables).unwrap();
    let failures = tables.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].selector.name, "Broken");
    assert!(matches!(failures[0].result, Err(Error::Decode { .. })));

    // No partial file for the failed table
    assert!(!snap.path().join("tables/Broken").exists());
    assert!(snap.path().join("tables/Users").exists());
}

#[tokio::test]
async fn test_export_container_escapes_keys() {
    let account = Arc::new(MemoryAccount::new());
    account.put_blob("media", "a/b/c", "nested");
    account.put_blob("media", "top.txt", "flat");
    account.put_blob("logs", "today", "x");
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let mut config = config_for(snap.path());
    config.ignore.containers = vec!["logs".to_string()];

    let report = export(&client, &config, &[ResourceKind::Blobs])
        .await
        .unwrap();
    assert!(report.is_success());

    let media = snap.path().join("blobs/media");
    assert_eq!(std::fs::read_to_string(media.join("a_b_c")).unwrap(), "nested");
    assert_eq!(std::fs::read_to_string(media.join("top.txt")).unwrap(), "flat");
    assert!(!snap.path().join("blobs/logs").exists());
}

#[tokio::test]
async fn test_export_empty_container_creates_no_directory() {
    let account = Arc::new(MemoryAccount::new());
    cirrus_storage::BlobService::create_container_if_not_exists(account.as_ref(), "empty")
        .await
        .unwrap();
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let report = export(&client, &config_for(snap.path()), &[ResourceKind::Blobs])
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(snap.path().join("blobs").is_dir());
    assert!(!snap.path().join("blobs/empty").exists());
}

#[tokio::test]
async fn test_export_queue_parses_bodies() {
    let account = Arc::new(MemoryAccount::new());
    account.create_queue_if_not_exists("jobs").await.unwrap();
    account.put_message("jobs", "x").await.unwrap();
    account.put_message("jobs", "{\"y\":1}").await.unwrap();
    let client = StorageClient::from_account(account.clone());

    let snap = TempDir::new().unwrap();
    let report = export(&client, &config_for(snap.path()), &[ResourceKind::Queues])
        .await
        .unwrap();
    assert!(report.is_success());

    let written = std::fs::read_to_string(snap.path().join("queues/jobs")).unwrap();
    assert_eq!(written, r#"["x",{"y":1}]"#);
    // Draining does not consume the queue
    assert_eq!(account.messages("jobs").len(), 2);
}

#[tokio::test]
async fn test_export_reuses_existing_snapshot() {
    let account = Arc::new(MemoryAccount::new());
    seed_users(&account).await;
    let client = StorageClient::from_account(account);

    let snap = TempDir::new().unwrap();
    let stale = snap.path().join("tables/Stale");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "[]").unwrap();

    export(&client, &config_for(snap.path()), &[ResourceKind::Tables])
        .await
        .unwrap();

    assert!(stale.exists());
    assert!(snap.path().join("tables/Users").exists());
}

/// Table service whose listing always fails.
struct UnlistableTables;

#[async_trait]
impl TableService for UnlistableTables {
    async fn list_tables(&self) -> cirrus_storage::Result<Vec<String>> {
        Err(StorageError::Backend("listing unavailable".to_string()))
    }

    async fn query_entities(
        &self,
        table: &str,
        _partition_key: Option<&str>,
    ) -> cirrus_storage::Result<Vec<Entity>> {
        Err(StorageError::NotFound(table.to_string()))
    }

    async fn create_table_if_not_exists(&self, _table: &str) -> cirrus_storage::Result<bool> {
        Ok(false)
    }

    async fn insert_entity(&self, table: &str, _entity: Entity) -> cirrus_storage::Result<()> {
        Err(StorageError::NotFound(table.to_string()))
    }

    async fn insert_or_replace_entity(
        &self,
        table: &str,
        _entity: Entity,
    ) -> cirrus_storage::Result<()> {
        Err(StorageError::NotFound(table.to_string()))
    }
}

#[tokio::test]
async fn test_enumeration_failure_leaves_other_kinds_alone() {
    let account = Arc::new(MemoryAccount::new());
    account.put_blob("media", "one", "1");
    account.create_queue_if_not_exists("jobs").await.unwrap();
    let client = StorageClient::new(Arc::new(UnlistableTables), account.clone(), account);

    let snap = TempDir::new().unwrap();
    let report = export(&client, &config_for(snap.path()), &ResourceKind::ALL)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.kinds.len(), 3);
    assert!(matches!(
        report.kind(ResourceKind::Tables).unwrap().result,
        Err(Error::Enumeration {
            kind: ResourceKind::Tables,
            ..
        })
    ));
    assert!(report.kind(ResourceKind::Blobs).unwrap().is_success());
    assert!(report.kind(ResourceKind::Queues).unwrap().is_success());
    assert!(snap.path().join("blobs/media/one").exists());
    assert_eq!(
        std::fs::read_to_string(snap.path().join("queues/jobs")).unwrap(),
        "[]"
    );
}
