//! Migrate a storage account's tables, blobs and queues to and from a local
//! snapshot tree.
//!
//! ```no_run
//! use cirrus::{export, MigrationConfig, ResourceKind};
//! use cirrus_storage::{LocalAccount, StorageClient};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> cirrus::Result<()> {
//! let config = MigrationConfig::load_profile(Path::new("./config"), "myconfig")?;
//! let client = StorageClient::from_account(Arc::new(LocalAccount::new("./accounts/dev")));
//!
//! let report = export(&client, &config, &ResourceKind::ALL).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drain;
pub mod error;
pub mod export;
pub mod import;
pub mod lister;
pub mod pool;
pub mod report;
pub mod resource;
pub mod retry;
pub mod snapshot;
pub mod transform;

pub use config::MigrationConfig;
pub use error::{Error, Result};
pub use export::export;
pub use import::import;
pub use report::{KindReport, ResourceOutcome, RunReport, TransferCounts};
pub use resource::{Direction, ResourceKind, ResourceSelector};
