//! Named environments (which storage account a run talks to).
//!
//! ```yaml
//! development:
//!   account: devstoreaccount1
//!   root: ./accounts/dev
//! production:
//!   account: prodaccount
//!   root: /srv/accounts/prod
//!   visibility_timeout_secs: 60
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::expand_tilde;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnvironmentConfig {
    /// Storage account name, used in logs
    pub account: String,
    /// Directory of the emulated account
    pub root: PathBuf,
    /// How long a drained queue message stays hidden
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

impl EnvironmentConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(transparent)]
pub struct Environments {
    environments: BTreeMap<String, EnvironmentConfig>,
}

impl Environments {
    /// Load environments from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut envs: Environments = serde_yaml::from_str(content)?;
        for env in envs.environments.values_mut() {
            env.root = expand_tilde(&env.root)?;
        }
        Ok(envs)
    }

    pub fn get(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments.get(name).ok_or_else(|| {
            Error::Config(format!(
                "Environment '{}' is not configured (known: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }
}
