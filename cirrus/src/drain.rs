//! Pull-based sources drained to exhaustion.
//!
//! Both sources are lazy, finite and not restartable: consuming them again
//! means building a new stream, which re-issues the remote calls.

use cirrus_storage::{Entity, StorageClient};
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use std::pin::Pin;

use crate::error::{Error, Result};

pub type DrainStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Entities of a table, optionally restricted to one partition.
///
/// The query returns the whole result set, which is then consumed from its
/// end: rows come out in reverse arrival order.
pub fn table_entities<'a>(
    client: &'a StorageClient,
    table: &'a str,
    partition_key: Option<&'a str>,
) -> DrainStream<'a, Entity> {
    Box::pin(async_stream::try_stream! {
        let mut entities = client
            .tables()
            .query_entities(table, partition_key)
            .await
            .map_err(|e| Error::transfer(table, "entity query", e))?;

        while let Some(entity) = entities.pop() {
            yield entity;
        }
    })
}

/// Messages of a queue, one fetch per message, until none is visible.
///
/// Messages are not deleted. Bodies are parsed as JSON when possible and
/// kept as raw strings otherwise.
pub fn queue_messages<'a>(client: &'a StorageClient, queue: &'a str) -> DrainStream<'a, Value> {
    Box::pin(async_stream::try_stream! {
        loop {
            let message = client
                .queues()
                .get_message(queue)
                .await
                .map_err(|e| Error::transfer(queue, "message fetch", e))?;

            let Some(message) = message else {
                break;
            };
            yield parse_body(message.body);
        }
    })
}

/// Parse a message body as JSON, falling back to the raw string.
pub fn parse_body(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// Collect a whole drain; any error discards what was gathered.
pub async fn drain_all<T>(stream: DrainStream<'_, T>) -> Result<Vec<T>> {
    stream.try_collect().await
}
