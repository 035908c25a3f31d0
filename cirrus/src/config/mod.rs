//! Migration profile configuration.
//!
//! A profile is a TOML file, conventionally `config/<name>.toml`:
//!
//! ```toml
//! [options]
//! root = "./snapshot"
//! workers = 10
//! partition_key = "tenant-1"
//!
//! [export]
//! tables = ["Users"]
//!
//! [import]
//! overwrite_records = false
//!
//! [ignore]
//! columns = ["etag", "Timestamp"]
//! containers = ["$logs"]
//!
//! [is_json]
//! Users = ["payload", "settings"]
//! ```

mod environment;

pub use environment::{EnvironmentConfig, Environments};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resource::{Direction, ResourceKind};

/// One migration profile.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MigrationConfig {
    #[serde(default)]
    pub options: OptionsConfig,
    /// Explicit resources to export; empty lists mean "everything remote"
    #[serde(default)]
    pub export: SelectionConfig,
    /// Explicit resources to import; empty lists mean "everything in the snapshot"
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
    /// Table name -> columns holding JSON documents
    #[serde(default)]
    pub is_json: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionsConfig {
    /// Snapshot root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Maximum operations in flight per worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Only export entities of this partition
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Delay before the single blob upload retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from("./snapshot")
}

fn default_workers() -> usize {
    10
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            workers: default_workers(),
            partition_key: None,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SelectionConfig {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub queues: Vec<String>,
}

impl SelectionConfig {
    pub fn for_kind(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Tables => &self.tables,
            ResourceKind::Blobs => &self.containers,
            ResourceKind::Queues => &self.queues,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ImportConfig {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub queues: Vec<String>,
    /// Upsert rows instead of strict insert
    #[serde(default)]
    pub overwrite_records: bool,
}

impl ImportConfig {
    pub fn for_kind(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Tables => &self.tables,
            ResourceKind::Blobs => &self.containers,
            ResourceKind::Queues => &self.queues,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub queues: Vec<String>,
    /// Columns stripped from every table record
    #[serde(default)]
    pub columns: Vec<String>,
    /// Filesystem housekeeping entries skipped in local listings
    #[serde(default = "default_ignored_directories")]
    pub directories: Vec<String>,
}

fn default_ignored_directories() -> Vec<String> {
    vec![".DS_Store".to_string(), "Thumbs.db".to_string()]
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            containers: Vec::new(),
            queues: Vec::new(),
            columns: Vec::new(),
            directories: default_ignored_directories(),
        }
    }
}

impl IgnoreConfig {
    pub fn for_kind(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Tables => &self.tables,
            ResourceKind::Blobs => &self.containers,
            ResourceKind::Queues => &self.queues,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl MigrationConfig {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: MigrationConfig = toml::from_str(&content)?;
        config.options.root = expand_tilde(&config.options.root)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the profile `<config_dir>/<name>.toml`.
    pub fn load_profile(config_dir: &Path, name: &str) -> Result<Self> {
        let path = config_dir.join(format!("{}.toml", name));
        if !path.exists() {
            return Err(Error::Config(format!(
                "Profile '{}' not found at {}",
                name,
                path.display()
            )));
        }
        Self::load(&path)
    }

    /// Save the profile to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.options.workers == 0 {
            return Err(Error::Config("options.workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Explicit include list for a kind in the given direction.
    pub fn include_list(&self, direction: Direction, kind: ResourceKind) -> &[String] {
        match direction {
            Direction::Export => self.export.for_kind(kind),
            Direction::Import => self.import.for_kind(kind),
        }
    }

    pub fn ignore_list(&self, kind: ResourceKind) -> &[String] {
        self.ignore.for_kind(kind)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.options.retry_delay_ms)
    }

    /// Columns configured as JSON for a table.
    pub fn json_fields(&self, table: &str) -> &[String] {
        self.is_json.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}
