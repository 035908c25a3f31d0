//! Core capability trait definitions.
//!
//! A storage account exposes three independent capabilities: a tabular
//! entity store, a blob container store and a message queue store. Each is
//! its own trait so callers (and tests) can swap one without the others.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StorageError};

/// A table entity: an ordered mapping of property name to value.
pub type Entity = serde_json::Map<String, serde_json::Value>;

/// Property holding the partition half of an entity key.
pub const PARTITION_KEY: &str = "PartitionKey";

/// Property holding the row half of an entity key.
pub const ROW_KEY: &str = "RowKey";

/// Metadata attached to an uploaded blob.
pub type BlobMetadata = HashMap<String, String>;

/// Extract `(PartitionKey, RowKey)` from an entity.
pub fn entity_key(entity: &Entity) -> Result<(String, String)> {
    let part = entity.get(PARTITION_KEY).and_then(|v| v.as_str());
    let row = entity.get(ROW_KEY).and_then(|v| v.as_str());
    match (part, row) {
        (Some(p), Some(r)) => Ok((p.to_string(), r.to_string())),
        _ => Err(StorageError::InvalidEntity(format!(
            "entity must carry string {} and {}",
            PARTITION_KEY, ROW_KEY
        ))),
    }
}

/// Validate a table, container or queue name before it is used as a path
/// component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A blob listed in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// Object key, may contain `/`
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

/// A message fetched from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Account-assigned message id
    pub id: String,
    /// Raw message body
    pub body: String,
}

/// Tabular entity store.
#[async_trait]
pub trait TableService: Send + Sync {
    /// List every table in the account.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Query all entities of a table in a single call, optionally restricted
    /// to one partition.
    async fn query_entities(&self, table: &str, partition_key: Option<&str>)
        -> Result<Vec<Entity>>;

    /// Create the table unless it exists. Returns `true` if it was created.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool>;

    /// Insert an entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the key is taken.
    async fn insert_entity(&self, table: &str, entity: Entity) -> Result<()>;

    /// Insert an entity, replacing any entity with the same key.
    async fn insert_or_replace_entity(&self, table: &str, entity: Entity) -> Result<()>;
}

/// Blob container store.
#[async_trait]
pub trait BlobService: Send + Sync {
    /// List every container in the account.
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Create the container unless it exists. Returns `true` if it was created.
    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool>;

    /// List the blobs of a container.
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobItem>>;

    /// Download a blob to a local file, returning the number of bytes written.
    async fn download_to_file(&self, container: &str, key: &str, path: &Path) -> Result<u64>;

    /// Upload a local file as a blob, overwriting any blob with the same key.
    async fn upload_from_file(
        &self,
        container: &str,
        key: &str,
        path: &Path,
        metadata: BlobMetadata,
    ) -> Result<()>;
}

/// Message queue store.
#[async_trait]
pub trait QueueService: Send + Sync {
    /// List every queue in the account.
    async fn list_queues(&self) -> Result<Vec<String>>;

    /// Fetch at most one visible message.
    ///
    /// The message is not deleted: it is hidden for the account's visibility
    /// timeout and then becomes visible again. `None` means no visible
    /// message is left.
    async fn get_message(&self, queue: &str) -> Result<Option<QueueMessage>>;

    /// Create the queue unless it exists. Returns `true` if it was created.
    async fn create_queue_if_not_exists(&self, queue: &str) -> Result<bool>;

    /// Append a message to the queue.
    async fn put_message(&self, queue: &str, body: &str) -> Result<()>;
}

/// Handle bundling the three capabilities of one storage account.
///
/// Cheap to clone; every capability is shared and safe for concurrent use.
#[derive(Clone)]
pub struct StorageClient {
    tables: Arc<dyn TableService>,
    blobs: Arc<dyn BlobService>,
    queues: Arc<dyn QueueService>,
}

impl StorageClient {
    /// Build a client from separately provided capabilities.
    pub fn new(
        tables: Arc<dyn TableService>,
        blobs: Arc<dyn BlobService>,
        queues: Arc<dyn QueueService>,
    ) -> Self {
        Self {
            tables,
            blobs,
            queues,
        }
    }

    /// Build a client from a single account implementing every capability.
    pub fn from_account<A>(account: Arc<A>) -> Self
    where
        A: TableService + BlobService + QueueService + 'static,
    {
        Self {
            tables: account.clone(),
            blobs: account.clone(),
            queues: account,
        }
    }

    pub fn tables(&self) -> &dyn TableService {
        self.tables.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobService {
        self.blobs.as_ref()
    }

    pub fn queues(&self) -> &dyn QueueService {
        self.queues.as_ref()
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: serde_json::Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_entity_key() {
        let e = entity(json!({"PartitionKey": "p1", "RowKey": "r1", "name": "x"}));
        assert_eq!(entity_key(&e).unwrap(), ("p1".to_string(), "r1".to_string()));
    }

    #[test]
    fn test_entity_key_missing() {
        let e = entity(json!({"PartitionKey": "p1"}));
        assert!(matches!(
            entity_key(&e).unwrap_err(),
            StorageError::InvalidEntity(_)
        ));

        let e = entity(json!({"PartitionKey": "p1", "RowKey": 7}));
        assert!(entity_key(&e).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("users").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }
}
