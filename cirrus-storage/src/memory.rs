//! In-memory storage account.
//!
//! Keeps every table, container and queue in process memory. Useful for
//! tests and for embedding the engine without a real account.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::traits::{
    entity_key, validate_name, BlobItem, BlobMetadata, BlobService, Entity, QueueMessage,
    QueueService, TableService,
};

/// Default time a fetched message stays hidden.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

type EntityKey = (String, String);

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    metadata: BlobMetadata,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    visible_at: Instant,
}

/// Storage account held entirely in memory.
#[derive(Debug)]
pub struct MemoryAccount {
    tables: RwLock<BTreeMap<String, BTreeMap<EntityKey, Entity>>>,
    containers: RwLock<BTreeMap<String, BTreeMap<String, StoredBlob>>>,
    queues: Mutex<BTreeMap<String, Vec<StoredMessage>>>,
    next_message_id: AtomicU64,
    visibility_timeout: Duration,
}

impl Default for MemoryAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccount {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            containers: RwLock::new(BTreeMap::new()),
            queues: Mutex::new(BTreeMap::new()),
            next_message_id: AtomicU64::new(1),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    /// Set how long a fetched message stays hidden.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Store a blob directly, creating the container if needed.
    pub fn put_blob(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredBlob {
                    data: data.into(),
                    metadata: BlobMetadata::new(),
                },
            );
    }

    /// Read a blob body.
    pub fn blob(&self, container: &str, key: &str) -> Option<Bytes> {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(key))
            .map(|b| b.data.clone())
    }

    /// Read the metadata stored with a blob.
    pub fn blob_metadata(&self, container: &str, key: &str) -> Option<BlobMetadata> {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(key))
            .map(|b| b.metadata.clone())
    }

    /// All entities of a table in key order.
    pub fn entities(&self, table: &str) -> Vec<Entity> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All message bodies of a queue, visible or not, in arrival order.
    pub fn messages(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|msgs| msgs.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn write_entity(&self, table: &str, entity: Entity, replace: bool) -> Result<()> {
        let key = entity_key(&entity)?;
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::NotFound(table.to_string()))?;

        if !replace && rows.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}/{}",
                table, key.0, key.1
            )));
        }
        rows.insert(key, entity);
        Ok(())
    }
}

#[async_trait]
impl TableService for MemoryAccount {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().keys().cloned().collect())
    }

    async fn query_entities(
        &self,
        table: &str,
        partition_key: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::NotFound(table.to_string()))?;

        Ok(rows
            .iter()
            .filter(|((part, _), _)| partition_key.map_or(true, |p| p == part.as_str()))
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        validate_name(table)?;
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn insert_entity(&self, table: &str, entity: Entity) -> Result<()> {
        self.write_entity(table, entity, false)
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: Entity) -> Result<()> {
        self.write_entity(table, entity, true)
    }
}

#[async_trait]
impl BlobService for MemoryAccount {
    async fn list_containers(&self) -> Result<Vec<String>> {
        Ok(self.containers.read().keys().cloned().collect())
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        validate_name(container)?;
        let mut containers = self.containers.write();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobItem>> {
        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| StorageError::NotFound(container.to_string()))?;

        Ok(blobs
            .iter()
            .map(|(name, blob)| BlobItem {
                name: name.clone(),
                size: blob.data.len() as u64,
            })
            .collect())
    }

    async fn download_to_file(&self, container: &str, key: &str, path: &Path) -> Result<u64> {
        let data = self
            .blob(container, key)
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", container, key)))?;

        debug!("Downloading {}/{} to {:?}", container, key, path);
        fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn upload_from_file(
        &self,
        container: &str,
        key: &str,
        path: &Path,
        metadata: BlobMetadata,
    ) -> Result<()> {
        let data = Bytes::from(fs::read(path).await?);

        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::NotFound(container.to_string()))?;
        blobs.insert(key.to_string(), StoredBlob { data, metadata });
        Ok(())
    }
}

#[async_trait]
impl QueueService for MemoryAccount {
    async fn list_queues(&self) -> Result<Vec<String>> {
        Ok(self.queues.lock().keys().cloned().collect())
    }

    async fn get_message(&self, queue: &str) -> Result<Option<QueueMessage>> {
        let now = Instant::now();
        let mut queues = self.queues.lock();
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| StorageError::NotFound(queue.to_string()))?;

        Ok(messages
            .iter_mut()
            .find(|m| m.visible_at <= now)
            .map(|m| {
                m.visible_at = now + self.visibility_timeout;
                QueueMessage {
                    id: m.id.clone(),
                    body: m.body.clone(),
                }
            }))
    }

    async fn create_queue_if_not_exists(&self, queue: &str) -> Result<bool> {
        validate_name(queue)?;
        let mut queues = self.queues.lock();
        if queues.contains_key(queue) {
            return Ok(false);
        }
        queues.insert(queue.to_string(), Vec::new());
        Ok(true)
    }

    async fn put_message(&self, queue: &str, body: &str) -> Result<()> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut queues = self.queues.lock();
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| StorageError::NotFound(queue.to_string()))?;
        messages.push(StoredMessage {
            id: id.to_string(),
            body: body.to_string(),
            visible_at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entity(value: serde_json::Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let account = MemoryAccount::new();
        assert!(account.create_table_if_not_exists("users").await.unwrap());
        assert!(!account.create_table_if_not_exists("users").await.unwrap());

        account
            .insert_entity("users", entity(json!({"PartitionKey": "a", "RowKey": "1"})))
            .await
            .unwrap();
        account
            .insert_entity("users", entity(json!({"PartitionKey": "b", "RowKey": "1"})))
            .await
            .unwrap();

        let all = account.query_entities("users", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let only_a = account.query_entities("users", Some("a")).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0]["PartitionKey"], "a");
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let account = MemoryAccount::new();
        account.create_table_if_not_exists("users").await.unwrap();
        let row = entity(json!({"PartitionKey": "a", "RowKey": "1", "v": 1}));

        account.insert_entity("users", row.clone()).await.unwrap();
        let err = account.insert_entity("users", row).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_insert_or_replace_overwrites() {
        let account = MemoryAccount::new();
        account.create_table_if_not_exists("users").await.unwrap();

        account
            .insert_or_replace_entity("users", entity(json!({"PartitionKey": "a", "RowKey": "1", "v": 1})))
            .await
            .unwrap();
        account
            .insert_or_replace_entity("users", entity(json!({"PartitionKey": "a", "RowKey": "1", "v": 2})))
            .await
            .unwrap();

        let rows = account.entities("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["v"], 2);
    }

    #[tokio::test]
    async fn test_query_missing_table() {
        let account = MemoryAccount::new();
        let err = account.query_entities("nope", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_blob_roundtrip_through_files() {
        let temp = TempDir::new().unwrap();
        let account = MemoryAccount::new();
        account.put_blob("images", "a/b/c.png", "pixels");

        let file = temp.path().join("c.png");
        let written = account
            .download_to_file("images", "a/b/c.png", &file)
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(account.list_blobs("images").await.unwrap()[0].size, 6);

        account.create_container_if_not_exists("copy").await.unwrap();
        let mut metadata = BlobMetadata::new();
        metadata.insert("fileName".to_string(), "a/b/c.png".to_string());
        account
            .upload_from_file("copy", "a/b/c.png", &file, metadata)
            .await
            .unwrap();

        assert_eq!(account.blob("copy", "a/b/c.png").unwrap(), Bytes::from("pixels"));
        assert_eq!(
            account.blob_metadata("copy", "a/b/c.png").unwrap()["fileName"],
            "a/b/c.png"
        );
    }

    #[tokio::test]
    async fn test_get_message_hides_without_deleting() {
        let account = MemoryAccount::new();
        account.create_queue_if_not_exists("jobs").await.unwrap();
        account.put_message("jobs", "one").await.unwrap();
        account.put_message("jobs", "two").await.unwrap();

        let first = account.get_message("jobs").await.unwrap().unwrap();
        let second = account.get_message("jobs").await.unwrap().unwrap();
        assert_eq!(first.body, "one");
        assert_eq!(second.body, "two");
        assert!(account.get_message("jobs").await.unwrap().is_none());

        // Still stored
        assert_eq!(account.messages("jobs"), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_message_visible_again_after_timeout() {
        let account = MemoryAccount::new().with_visibility_timeout(Duration::from_millis(10));
        account.create_queue_if_not_exists("jobs").await.unwrap();
        account.put_message("jobs", "one").await.unwrap();

        assert!(account.get_message("jobs").await.unwrap().is_some());
        assert!(account.get_message("jobs").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let again = account.get_message("jobs").await.unwrap().unwrap();
        assert_eq!(again.body, "one");
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let account = MemoryAccount::new();
        assert!(account.create_container_if_not_exists("a/b").await.is_err());
        assert!(account.create_queue_if_not_exists("").await.is_err());
    }
}
