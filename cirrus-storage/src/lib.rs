//! Storage account capabilities for cirrus.
//!
//! A cloud storage account is modelled as three independent capabilities,
//! each behind its own trait so the migration engine never depends on a
//! particular wire client:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  StorageClient (cheap to clone)              │
//! │  ┌──────────────┐ ┌─────────────┐ ┌────────┐ │
//! │  │ TableService │ │ BlobService │ │ Queue  │ │
//! │  └──────┬───────┘ └──────┬──────┘ └───┬────┘ │
//! │         └────────────────┼────────────┘      │
//! │                ┌─────────┴─────────┐         │
//! │                ▼                   ▼         │
//! │        ┌──────────────┐   ┌──────────────┐   │
//! │        │ MemoryAccount│   │ LocalAccount │   │
//! │        └──────────────┘   └──────────────┘   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use cirrus_storage::{LocalAccount, StorageClient, TableService};
//! use std::sync::Arc;
//!
//! # async fn example() -> cirrus_storage::Result<()> {
//! let account = Arc::new(LocalAccount::new("./accounts/dev"));
//! let client = StorageClient::from_account(account);
//!
//! for table in client.tables().list_tables().await? {
//!     let rows = client.tables().query_entities(&table, None).await?;
//!     println!("{}: {} rows", table, rows.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod local;
mod memory;
mod traits;

pub use error::{Result, StorageError};
pub use local::LocalAccount;
pub use memory::{MemoryAccount, DEFAULT_VISIBILITY_TIMEOUT};
pub use traits::{
    entity_key, validate_name, BlobItem, BlobMetadata, BlobService, Entity, QueueMessage,
    QueueService, StorageClient, TableService, PARTITION_KEY, ROW_KEY,
};

// Re-export bytes for convenience
pub use bytes::Bytes;
