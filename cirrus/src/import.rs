//! Local snapshot to remote account.

use cirrus_storage::{entity_key, BlobMetadata, StorageClient};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::lister;
use crate::pool::WorkerPool;
use crate::report::{branch, ResourceOutcome, RunReport, TransferCounter, TransferCounts};
use crate::resource::{Direction, ResourceKind, ResourceSelector};
use crate::retry::RetryPolicy;
use crate::snapshot::{decode_key, SnapshotTree};
use crate::transform::RecordTransformer;

/// Metadata key recording the original blob key on upload.
pub const FILE_NAME_METADATA: &str = "fileName";

/// Import the requested kinds from the snapshot at `config.options.root`.
///
/// Fails with [`Error::Precondition`] before anything is transferred when
/// the snapshot root or the directory of a requested kind is missing.
/// Otherwise every kind reports its own outcome in the returned report.
pub async fn import(
    client: &StorageClient,
    config: &MigrationConfig,
    kinds: &[ResourceKind],
) -> Result<RunReport> {
    config.validate()?;
    let importer = Importer::new(client, config);
    importer.snapshot.check_importable(kinds).await?;
    info!(
        root = %importer.snapshot.root().display(),
        ?kinds,
        overwrite = config.import.overwrite_records,
        "Import started"
    );

    let (tables, blobs, queues) = tokio::join!(
        branch(
            Direction::Import,
            ResourceKind::Tables,
            kinds.contains(&ResourceKind::Tables),
            importer.import_tables(),
        ),
        branch(
            Direction::Import,
            ResourceKind::Blobs,
            kinds.contains(&ResourceKind::Blobs),
            importer.import_containers(),
        ),
        branch(
            Direction::Import,
            ResourceKind::Queues,
            kinds.contains(&ResourceKind::Queues),
            importer.import_queues(),
        ),
    );

    Ok(RunReport {
        direction: Direction::Import,
        kinds: [tables, blobs, queues].into_iter().flatten().collect(),
    })
}

struct Importer<'a> {
    client: &'a StorageClient,
    config: &'a MigrationConfig,
    snapshot: SnapshotTree,
    pool: WorkerPool,
    retry: RetryPolicy,
}

impl<'a> Importer<'a> {
    fn new(client: &'a StorageClient, config: &'a MigrationConfig) -> Self {
        Self {
            client,
            config,
            snapshot: SnapshotTree::new(
                config.options.root.clone(),
                config.ignore.directories.iter().cloned(),
            ),
            pool: WorkerPool::new(config.options.workers),
            retry: RetryPolicy::new(config.retry_delay()),
        }
    }

    async fn import_tables(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_import(&self.snapshot, self.config, ResourceKind::Tables).await?;
        Ok(self
            .pool
            .collect(selectors, |selector: ResourceSelector| async move {
                let result = self.import_table(&selector.name).await;
                ResourceOutcome::new(Direction::Import, selector, result)
            })
            .await)
    }

    /// Read the table file, create the table if needed, then write every
    /// row through the pool.
    ///
    /// In strict mode a row whose key already exists is skipped with a
    /// warning; any other failure stops the table.
    async fn import_table(&self, table: &str) -> Result<TransferCounts> {
        info!(table = %table, "Importing table");
        let records = self
            .snapshot
            .read_records(&self.snapshot.table_path(table))
            .await?;
        self.client
            .tables()
            .create_table_if_not_exists(table)
            .await
            .map_err(|e| Error::transfer(table, "table creation", e))?;

        let transformer = RecordTransformer::for_table(self.config, table);
        let overwrite = self.config.import.overwrite_records;
        let counter = TransferCounter::default();
        let (transformer, counter_ref) = (&transformer, &counter);

        self.pool
            .try_run(records, |record| async move {
                let entity = match record {
                    Value::Object(entity) => transformer.to_remote(entity)?,
                    other => {
                        return Err(Error::Decode {
                            resource: table.to_string(),
                            field: "<record>".to_string(),
                            reason: format!("expected an object, found {}", other),
                        })
                    }
                };
                let item = entity_key(&entity)
                    .map(|(part, row)| format!("{}/{}", part, row))
                    .unwrap_or_else(|_| "<unkeyed>".to_string());

                let written = if overwrite {
                    self.client
                        .tables()
                        .insert_or_replace_entity(table, entity)
                        .await
                } else {
                    self.client.tables().insert_entity(table, entity).await
                };

                match written {
                    Ok(()) => {
                        debug!(table = %table, row = %item, "Row written");
                        counter_ref.inc_transferred();
                        Ok(())
                    }
                    Err(e) if !overwrite && e.is_already_exists() => {
                        warn!(table = %table, row = %item, "Row already exists, skipping");
                        counter_ref.inc_skipped();
                        Ok(())
                    }
                    Err(e) => Err(Error::transfer(table, item, e)),
                }
            })
            .await?;

        Ok(counter.counts())
    }

    async fn import_containers(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_import(&self.snapshot, self.config, ResourceKind::Blobs).await?;
        Ok(self
            .pool
            .collect(selectors, |selector: ResourceSelector| async move {
                let result = self.import_container(&selector.name).await;
                ResourceOutcome::new(Direction::Import, selector, result)
            })
            .await)
    }

    /// Create the container if needed, then upload its files one at a
    /// time, each with a single delayed retry.
    async fn import_container(&self, container: &str) -> Result<TransferCounts> {
        info!(container = %container, "Importing container");
        self.client
            .blobs()
            .create_container_if_not_exists(container)
            .await
            .map_err(|e| Error::transfer(container, "container creation", e))?;

        let files = self.snapshot.list_container_files(container).await?;
        let dir = self.snapshot.container_dir(container);
        let counter = TransferCounter::default();

        for file in files {
            let key = decode_key(&file);
            let path = dir.join(&file);
            let metadata = BlobMetadata::from([(FILE_NAME_METADATA.to_string(), key.clone())]);

            self.retry
                .run(&key, || {
                    self.client
                        .blobs()
                        .upload_from_file(container, &key, &path, metadata.clone())
                })
                .await
                .map_err(|e| Error::transfer(container, key.as_str(), e))?;

            debug!(container = %container, key = %key, "Blob uploaded");
            counter.inc_transferred();
        }

        Ok(counter.counts())
    }

    async fn import_queues(&self) -> Result<Vec<ResourceOutcome>> {
        let selectors = lister::resolve_import(&self.snapshot, self.config, ResourceKind::Queues).await?;

        let mut outcomes = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let result = self.import_queue(&selector.name).await;
            outcomes.push(ResourceOutcome::new(Direction::Import, selector, result));
        }
        Ok(outcomes)
    }

    /// Read the queue file, create the queue if needed and put every stored
    /// message in file order. Structured bodies are sent as compact JSON.
    async fn import_queue(&self, queue: &str) -> Result<TransferCounts> {
        info!(queue = %queue, "Importing queue");
        let bodies = self
            .snapshot
            .read_records(&self.snapshot.queue_path(queue))
            .await?;
        self.client
            .queues()
            .create_queue_if_not_exists(queue)
            .await
            .map_err(|e| Error::transfer(queue, "queue creation", e))?;

        let counter = TransferCounter::default();

        for (index, body) in bodies.into_iter().enumerate() {
            let body = match body {
                Value::String(raw) => raw,
                other => serde_json::to_string(&other)?,
            };
            self.client
                .queues()
                .put_message(queue, &body)
                .await
                .map_err(|e| Error::transfer(queue, format!("message {}", index), e))?;
            counter.inc_transferred();
        }

        Ok(counter.counts())
    }
}
