//! Remote account to local snapshot.

use cirrus_storage::StorageClient;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::drain::{self, drain_all};
use crate::error::{Error, Result};
use crate::lister;
use crate::pool::WorkerPool;
use crate::report::{branch, ResourceOutcome, RunReport, TransferCounter, TransferCounts};
use crate::resource::{Direction, ResourceKind};
use crate::snapshot::{self, SnapshotTree};
use crate::transform::RecordTransformer;

/// Export the requested kinds into the snapshot at `config.options.root`.
///
/// Kinds run concurrently and report independently. Existing snapshot
/// directories are reused and files in them overwritten.
pub async fn export(
    client: &StorageClient,
    config: &MigrationConfig,
    kinds: &[ResourceKind],
) -> Result<RunReport> {
    config.validate()?;
    let exporter = Exporter::new(client, config);
    info!(root = %exporter.snapshot.root().display(), ?kinds, "Export started");

    let (tables, blobs, queues) = tokio::join!(
        branch(
            Direction::Export,
            ResourceKind::Tables,
            kinds.contains(&ResourceKind::Tables),
            exporter.export_tables(),
        ),
        branch(
            Direction::Export,
            ResourceKind::Blobs,
            kinds.contains(&ResourceKind::Blobs),
            exporter.export_containers(),
        ),
        branch(
            Direction::Export,
            ResourceKind::Queues,
            kinds.contains(&ResourceKind::Queues),
            exporter.export_queues(),
        ),
    );

    Ok(RunReport {
        direction: Direction::Export,
        kinds: [tables, blobs, queues].into_iter().flatten().collect(),
    })
}

struct Exporter<'a> {
    client: &'a StorageClient,
    config: &'a MigrationConfig,
    snapshot: SnapshotTree,
    pool: WorkerPool,
}

impl<'a> Exporter<'a> {
    fn new(client: &'a StorageClient, config: &'a MigrationConfig) -> Self {
        Self {
            client,
            config,
            snapshot: SnapshotTree::new(
                config.options.root.clone(),
                config.ignore.directories.iter().cloned(),
            ),
            pool: WorkerPool::new(config.options.workers),
        }
    }

    async fn export_tables(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_export(self.client, self.config, ResourceKind::Tables).await?;
        self.snapshot.ensure_kind_dir(ResourceKind::Tables).await?;

        let mut outcomes = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let result = self.export_table(&selector.name).await;
            outcomes.push(ResourceOutcome::new(Direction::Export, selector, result));
        }
        Ok(outcomes)
    }

    /// Drain a table completely, then write it as one file.
    async fn export_table(&self, table: &str) -> Result<TransferCounts> {
        info!(table = %table, "Exporting table");
        let transformer = RecordTransformer::for_table(self.config, table);
        let partition_key = self.config.options.partition_key.as_deref();

        let entities = drain_all(drain::table_entities(self.client, table, partition_key)).await?;
        let records = entities
            .into_iter()
            .map(|entity| transformer.to_snapshot(entity).map(Value::Object))
            .collect::<Result<Vec<_>>>()?;

        self.snapshot
            .write_records(&self.snapshot.table_path(table), &records)
            .await?;

        Ok(TransferCounts {
            transferred: records.len() as u64,
            skipped: 0,
        })
    }

    async fn export_containers(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_export(self.client, self.config, ResourceKind::Blobs).await?;
        self.snapshot.ensure_kind_dir(ResourceKind::Blobs).await?;

        let mut outcomes = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let result = self.export_container(&selector.name).await;
            outcomes.push(ResourceOutcome::new(Direction::Export, selector, result));
        }
        Ok(outcomes)
    }

    /// Download every blob of a container through the worker pool. The
    /// container directory is created with the first blob.
    async fn export_container(&self, container: &str) -> Result<TransferCounts> {
        info!(container = %container, "Exporting container");
        let blobs = self
            .client
            .blobs()
            .list_blobs(container)
            .await
            .map_err(|e| Error::transfer(container, "blob listing", e))?;

        let counter = TransferCounter::default();
        let dir = OnceCell::new();
        let (counter_ref, dir_ref) = (&counter, &dir);

        self.pool
            .try_run(blobs, |blob| async move {
                dir_ref
                    .get_or_try_init(|| self.snapshot.ensure_container_dir(container))
                    .await?;

                snapshot::warn_if_lossy(container, &blob.name);
                let path = self.snapshot.blob_path(container, &blob.name);
                let bytes = self
                    .client
                    .blobs()
                    .download_to_file(container, &blob.name, &path)
                    .await
                    .map_err(|e| Error::transfer(container, blob.name.as_str(), e))?;

                debug!(
                    container = %container,
                    key = %blob.name,
                    listed = blob.size,
                    bytes,
                    "Blob downloaded"
                );
                counter_ref.inc_transferred();
                Ok::<_, Error>(())
            })
            .await?;

        Ok(counter.counts())
    }

    async fn export_queues(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_export(self.client, self.config, ResourceKind::Queues).await?;
        self.snapshot.ensure_kind_dir(ResourceKind::Queues).await?;

        let mut outcomes = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let result = self.export_queue(&selector.name).await;
            outcomes.push(ResourceOutcome::new(Direction::Export, selector, result));
        }
        Ok(outcomes)
    }

    /// Drain a queue without deleting anything, then write it as one file.
    async fn export_queue(&self, queue: &str) -> Result<TransferCounts> {
        info!(queue = %queue, "Exporting queue");
        let bodies = drain_all(drain::queue_messages(self.client, queue)).await?;

        self.snapshot
            .write_records(&self.snapshot.queue_path(queue), &bodies)
            .await?;

        Ok(TransferCounts {
            transferred: bodies.len() as u64,
            skipped: 0,
        })
    }
}
