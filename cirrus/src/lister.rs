//! Working-set resolution: which tables, containers and queues a run touches.

use cirrus_storage::StorageClient;
use tracing::debug;

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::resource::{Direction, ResourceKind, ResourceSelector};
use crate::snapshot::SnapshotTree;

/// `names` minus `ignored`, keeping the order of `names`.
pub fn subtract(names: Vec<String>, ignored: &[String]) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !ignored.contains(name))
        .collect()
}

/// Every resource of `kind` in the remote account.
pub async fn list_remote(client: &StorageClient, kind: ResourceKind) -> Result<Vec<String>> {
    let listed = match kind {
        ResourceKind::Tables => client.tables().list_tables().await,
        ResourceKind::Blobs => client.blobs().list_containers().await,
        ResourceKind::Queues => client.queues().list_queues().await,
    };
    listed.map_err(|source| Error::Enumeration { kind, source })
}

fn into_selectors(kind: ResourceKind, names: Vec<String>) -> Vec<ResourceSelector> {
    names
        .into_iter()
        .map(|name| ResourceSelector::new(kind, name))
        .collect()
}

/// Resolve the export working set for `kind`: the configured list, or the
/// remote listing when that is empty, minus the ignore list.
pub async fn resolve_export(
    client: &StorageClient,
    config: &MigrationConfig,
    kind: ResourceKind,
) -> Result<Vec<ResourceSelector>> {
    let explicit = config.include_list(Direction::Export, kind);
    let names = if explicit.is_empty() {
        list_remote(client, kind).await?
    } else {
        explicit.to_vec()
    };
    let names = subtract(names, config.ignore_list(kind));
    debug!(kind = %kind, count = names.len(), "Resolved export resources");
    Ok(into_selectors(kind, names))
}

/// Resolve the import working set for `kind`: the configured list, or the
/// snapshot directory listing when that is empty, minus the ignore list.
pub async fn resolve_import(
    snapshot: &SnapshotTree,
    config: &MigrationConfig,
    kind: ResourceKind,
) -> Result<Vec<ResourceSelector>> {
    let explicit = config.include_list(Direction::Import, kind);
    let names = if explicit.is_empty() {
        snapshot.list_resources(kind).await?
    } else {
        explicit.to_vec()
    };
    let names = subtract(names, config.ignore_list(kind));
    debug!(kind = %kind, count = names.len(), "Resolved import resources");
    Ok(into_selectors(kind, names))
}
