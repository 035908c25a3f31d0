use cirrus_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

use crate::resource::ResourceKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to enumerate {kind}: {source}")]
    Enumeration {
        kind: ResourceKind,
        #[source]
        source: StorageError,
    },

    #[error("Transfer of '{item}' in '{resource}' failed: {source}")]
    Transfer {
        resource: String,
        item: String,
        #[source]
        source: StorageError,
    },

    #[error("Cannot decode field '{field}' in '{resource}': {reason}")]
    Decode {
        resource: String,
        field: String,
        reason: String,
    },

    #[error("Snapshot not usable at {}: {reason}", path.display())]
    Precondition { path: PathBuf, reason: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transfer(
        resource: impl Into<String>,
        item: impl Into<String>,
        source: StorageError,
    ) -> Self {
        Error::Transfer {
            resource: resource.into(),
            item: item.into(),
            source,
        }
    }

    /// True for the one condition that stops a run before any transfer.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition { .. })
    }
}
