//! Record shaping between the remote table and the snapshot file.
//!
//! Ignored columns are stripped in both directions. Columns configured as
//! JSON-typed hold parsed documents on disk and encoded strings remotely.

use cirrus_storage::Entity;
use serde_json::Value;
use std::collections::HashSet;

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::resource::Direction;

/// Per-table transformer, built once per table and reused for every row.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    table: String,
    ignored: HashSet<String>,
    json_fields: HashSet<String>,
}

impl RecordTransformer {
    pub fn new(
        table: impl Into<String>,
        ignored: impl IntoIterator<Item = String>,
        json_fields: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            table: table.into(),
            ignored: ignored.into_iter().collect(),
            json_fields: json_fields.into_iter().collect(),
        }
    }

    pub fn for_table(config: &MigrationConfig, table: &str) -> Self {
        Self::new(
            table,
            config.ignore.columns.iter().cloned(),
            config.json_fields(table).iter().cloned(),
        )
    }

    /// Apply the transform for `direction`.
    pub fn apply(&self, record: Entity, direction: Direction) -> Result<Entity> {
        match direction {
            Direction::Export => self.to_snapshot(record),
            Direction::Import => self.to_remote(record),
        }
    }

    /// Remote shape to snapshot shape: decode JSON-typed string columns.
    pub fn to_snapshot(&self, record: Entity) -> Result<Entity> {
        let mut out = Entity::new();
        for (field, value) in record {
            if self.ignored.contains(&field) {
                continue;
            }
            let value = match value {
                Value::String(raw) if self.json_fields.contains(&field) => {
                    serde_json::from_str(&raw).map_err(|e| Error::Decode {
                        resource: self.table.clone(),
                        field: field.clone(),
                        reason: e.to_string(),
                    })?
                }
                other => other,
            };
            out.insert(field, value);
        }
        Ok(out)
    }

    /// Snapshot shape to remote shape: encode every JSON-typed column.
    ///
    /// Strings are encoded too, so a document that is a bare string comes
    /// back as the same string on the next export. Re-applying this to a
    /// record already in remote shape encodes its columns a second time.
    pub fn to_remote(&self, record: Entity) -> Result<Entity> {
        let mut out = Entity::new();
        for (field, value) in record {
            if self.ignored.contains(&field) {
                continue;
            }
            let value = if self.json_fields.contains(&field) {
                Value::String(serde_json::to_string(&value)?)
            } else {
                value
            };
            out.insert(field, value);
        }
        Ok(out)
    }
}
