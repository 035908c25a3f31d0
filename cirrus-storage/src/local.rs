//! Emulated storage account on the local filesystem.
//!
//! Lets the tool clone environments and rehearse restores without a cloud
//! account. Layout under the account root:
//!
//! ```text
//! tables/<table>.json            JSON array of entities
//! blobs/<container>/<key path>   one file per blob, `/` in keys become directories
//! blob-metadata/<container>.json key -> metadata map
//! queues/<queue>.json            JSON array of messages
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::memory::DEFAULT_VISIBILITY_TIMEOUT;
use crate::traits::{
    entity_key, validate_name, BlobItem, BlobMetadata, BlobService, Entity, QueueMessage,
    QueueService, TableService,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    id: String,
    body: String,
}

/// Storage account emulated in a local directory.
#[derive(Debug)]
pub struct LocalAccount {
    root: PathBuf,
    visibility_timeout: Duration,
    /// Serializes read-modify-write cycles on account files
    write_lock: tokio::sync::Mutex<()>,
    /// (queue, message id) -> instant the message becomes visible again
    hidden: Mutex<HashMap<(String, String), Instant>>,
}

impl LocalAccount {
    /// Create an account rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            write_lock: tokio::sync::Mutex::new(()),
            hidden: Mutex::new(HashMap::new()),
        }
    }

    /// Set how long a fetched message stays hidden.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Get the root directory of this account.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{}.json", table))
    }

    fn queue_path(&self, queue: &str) -> PathBuf {
        self.root.join("queues").join(format!("{}.json", queue))
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.root.join("blobs").join(container)
    }

    fn metadata_path(&self, container: &str) -> PathBuf {
        self.root
            .join("blob-metadata")
            .join(format!("{}.json", container))
    }

    fn blob_path(&self, container: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.container_path(container);
        for segment in key.split('/') {
            validate_name(segment)
                .map_err(|_| StorageError::InvalidName(format!("{}/{}", container, key)))?;
            path.push(segment);
        }
        Ok(path)
    }

    async fn read_json<T: DeserializeOwned + Send>(&self, path: &Path, name: &str) -> Result<T> {
        match fs::read(path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_vec_pretty(value)?).await?;
        Ok(())
    }

    /// Names of the `*.json` files directly under `dir`, sorted.
    async fn list_json_stems(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn write_entity(&self, table: &str, entity: Entity, replace: bool) -> Result<()> {
        let key = entity_key(&entity)?;
        let path = self.table_path(table);

        let _guard = self.write_lock.lock().await;
        let mut rows: Vec<Entity> = self.read_json(&path, table).await?;

        let existing = rows
            .iter()
            .position(|row| entity_key(row).is_ok_and(|k| k == key));
        match existing {
            Some(_) if !replace => {
                return Err(StorageError::AlreadyExists(format!(
                    "{}/{}/{}",
                    table, key.0, key.1
                )));
            }
            Some(idx) => rows[idx] = entity,
            None => rows.push(entity),
        }

        self.write_json(&path, &rows).await
    }

    /// Recursively list blob files under a container directory.
    #[async_recursion::async_recursion]
    async fn list_recursive(
        &self,
        dir: &Path,
        container_root: &Path,
        results: &mut Vec<BlobItem>,
    ) -> Result<()> {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                self.list_recursive(&path, container_root, results).await?;
            } else if metadata.is_file() {
                let relative = path
                    .strip_prefix(container_root)
                    .map_err(|_| StorageError::InvalidName(path.display().to_string()))?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                results.push(BlobItem {
                    name,
                    size: metadata.len(),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TableService for LocalAccount {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.list_json_stems(&self.root.join("tables")).await
    }

    #[instrument(skip(self))]
    async fn query_entities(
        &self,
        table: &str,
        partition_key: Option<&str>,
    ) -> Result<Vec<Entity>> {
        validate_name(table)?;
        let rows: Vec<Entity> = self.read_json(&self.table_path(table), table).await?;
        Ok(rows
            .into_iter()
            .filter(|row| match partition_key {
                Some(p) => entity_key(row).is_ok_and(|(part, _)| part == p),
                None => true,
            })
            .collect())
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        validate_name(table)?;
        let path = self.table_path(table);

        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        debug!("Creating table {:?}", path);
        self.write_json(&path, &Vec::<Entity>::new()).await?;
        Ok(true)
    }

    async fn insert_entity(&self, table: &str, entity: Entity) -> Result<()> {
        validate_name(table)?;
        self.write_entity(table, entity, false).await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: Entity) -> Result<()> {
        validate_name(table)?;
        self.write_entity(table, entity, true).await
    }
}

#[async_trait]
impl BlobService for LocalAccount {
    async fn list_containers(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(self.root.join("blobs")).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.metadata().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        validate_name(container)?;
        let path = self.container_path(container);
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        fs::create_dir_all(&path).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobItem>> {
        validate_name(container)?;
        let root = self.container_path(container);
        if !fs::try_exists(&root).await? {
            return Err(StorageError::NotFound(container.to_string()));
        }

        let mut results = Vec::new();
        self.list_recursive(&root, &root, &mut results).await?;
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn download_to_file(&self, container: &str, key: &str, path: &Path) -> Result<u64> {
        validate_name(container)?;
        let source = self.blob_path(container, key)?;
        match fs::copy(&source, path).await {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("{}/{}", container, key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, path, metadata), fields(path = %path.display()))]
    async fn upload_from_file(
        &self,
        container: &str,
        key: &str,
        path: &Path,
        metadata: BlobMetadata,
    ) -> Result<()> {
        validate_name(container)?;
        let container_root = self.container_path(container);
        if !fs::try_exists(&container_root).await? {
            return Err(StorageError::NotFound(container.to_string()));
        }

        let target = self.blob_path(container, key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(path, &target).await?;

        let meta_path = self.metadata_path(container);
        let _guard = self.write_lock.lock().await;
        let mut all: BTreeMap<String, BlobMetadata> =
            match self.read_json(&meta_path, container).await {
                Ok(all) => all,
                Err(e) if e.is_not_found() => BTreeMap::new(),
                Err(e) => return Err(e),
            };
        all.insert(key.to_string(), metadata);
        self.write_json(&meta_path, &all).await
    }
}

#[async_trait]
impl QueueService for LocalAccount {
    async fn list_queues(&self) -> Result<Vec<String>> {
        self.list_json_stems(&self.root.join("queues")).await
    }

    async fn get_message(&self, queue: &str) -> Result<Option<QueueMessage>> {
        validate_name(queue)?;
        let messages: Vec<StoredMessage> = self.read_json(&self.queue_path(queue), queue).await?;

        let now = Instant::now();
        let mut hidden = self.hidden.lock();
        for message in messages {
            let key = (queue.to_string(), message.id.clone());
            if hidden.get(&key).is_some_and(|until| *until > now) {
                continue;
            }
            hidden.insert(key, now + self.visibility_timeout);
            return Ok(Some(QueueMessage {
                id: message.id,
                body: message.body,
            }));
        }
        Ok(None)
    }

    async fn create_queue_if_not_exists(&self, queue: &str) -> Result<bool> {
        validate_name(queue)?;
        let path = self.queue_path(queue);

        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.write_json(&path, &Vec::<StoredMessage>::new()).await?;
        Ok(true)
    }

    async fn put_message(&self, queue: &str, body: &str) -> Result<()> {
        validate_name(queue)?;
        let path = self.queue_path(queue);

        let _guard = self.write_lock.lock().await;
        let mut messages: Vec<StoredMessage> = self.read_json(&path, queue).await?;
        messages.push(StoredMessage {
            id: (messages.len() + 1).to_string(),
            body: body.to_string(),
        });
        self.write_json(&path, &messages).await
    }
}
