//! The local snapshot tree.
//!
//! ```text
//! <root>/
//!   tables/<table>            JSON array of records
//!   blobs/<container>/<file>  one file per blob, '/' in keys escaped as '_'
//!   queues/<queue>            JSON array of message bodies
//! ```

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::resource::ResourceKind;

/// Character replacing `/` in blob keys on disk.
pub const KEY_ESCAPE: char = '_';

/// Map a blob key to its flat on-disk file name.
///
/// Keys already containing the escape character do not map back to
/// themselves.
pub fn encode_key(key: &str) -> String {
    key.replace('/', &KEY_ESCAPE.to_string())
}

/// Recover a blob key from its on-disk file name.
pub fn decode_key(file_name: &str) -> String {
    file_name.replace(KEY_ESCAPE, "/")
}

#[derive(Debug, Clone)]
pub struct SnapshotTree {
    root: PathBuf,
    housekeeping: HashSet<String>,
}

impl SnapshotTree {
    pub fn new(root: impl Into<PathBuf>, housekeeping: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            housekeeping: housekeeping.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.kind_dir(ResourceKind::Tables).join(table)
    }

    pub fn queue_path(&self, queue: &str) -> PathBuf {
        self.kind_dir(ResourceKind::Queues).join(queue)
    }

    pub fn container_dir(&self, container: &str) -> PathBuf {
        self.kind_dir(ResourceKind::Blobs).join(container)
    }

    pub fn blob_path(&self, container: &str, key: &str) -> PathBuf {
        self.container_dir(container).join(encode_key(key))
    }

    /// Create the root and the directory of `kind`, reusing existing ones.
    pub async fn ensure_kind_dir(&self, kind: ResourceKind) -> Result<PathBuf> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    pub async fn ensure_container_dir(&self, container: &str) -> Result<PathBuf> {
        let dir = self.container_dir(container);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        Ok(dir)
    }

    /// Check that the root and the directory of every requested kind exist.
    pub async fn check_importable(&self, kinds: &[ResourceKind]) -> Result<()> {
        if !is_dir(&self.root).await {
            return Err(Error::Precondition {
                path: self.root.clone(),
                reason: "snapshot root does not exist".to_string(),
            });
        }
        for kind in kinds {
            let dir = self.kind_dir(*kind);
            if !is_dir(&dir).await {
                return Err(Error::Precondition {
                    path: dir,
                    reason: format!("missing '{}' directory", kind.dir_name()),
                });
            }
        }
        Ok(())
    }

    /// Resources of `kind` present in the snapshot, sorted.
    ///
    /// Tables and queues are files, containers are directories. Housekeeping
    /// entries are skipped.
    pub async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let want_dirs = kind == ResourceKind::Blobs;
        self.list_dir(&self.kind_dir(kind), want_dirs).await
    }

    /// Blob file names stored for a container, sorted.
    pub async fn list_container_files(&self, container: &str) -> Result<Vec<String>> {
        self.list_dir(&self.container_dir(container), false).await
    }

    async fn list_dir(&self, dir: &Path, want_dirs: bool) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| Error::io(dir, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if self.housekeeping.contains(&name) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::io(entry.path(), e))?;
            if file_type.is_dir() != want_dirs {
                debug!(path = %entry.path().display(), "Skipping unexpected entry");
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Read a table or queue file.
    pub async fn read_records(&self, path: &Path) -> Result<Vec<Value>> {
        let data = fs::read(path).await.map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write a table or queue file in one piece, replacing the old one.
    pub async fn write_records(&self, path: &Path, records: &[Value]) -> Result<()> {
        let data = serde_json::to_vec(records)?;
        fs::write(path, data).await.map_err(|e| Error::io(path, e))?;
        Ok(())
    }
}

async fn is_dir(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_dir(),
        Err(_) => false,
    }
}

/// Warn when a key will not come back unchanged from its file name.
pub(crate) fn warn_if_lossy(container: &str, key: &str) {
    if key.contains(KEY_ESCAPE) {
        warn!(
            container = %container,
            key = %key,
            "Blob key contains '{}' and will be restored as '{}'",
            KEY_ESCAPE,
            decode_key(&encode_key(key))
        );
    }
}
