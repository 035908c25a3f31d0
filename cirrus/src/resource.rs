//! Resource kinds, selectors and transfer direction.

use serde::{Deserialize, Serialize};

/// The three kinds of storage resource a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Tables,
    Blobs,
    Queues,
}

impl ResourceKind {
    /// Every kind, in the order pipelines report them.
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Tables,
        ResourceKind::Blobs,
        ResourceKind::Queues,
    ];

    /// Name of this kind's subdirectory in the snapshot tree.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ResourceKind::Tables => "tables",
            ResourceKind::Blobs => "blobs",
            ResourceKind::Queues => "queues",
        }
    }

    /// Singular noun for a resource of this kind.
    pub fn resource_noun(&self) -> &'static str {
        match self {
            ResourceKind::Tables => "table",
            ResourceKind::Blobs => "container",
            ResourceKind::Queues => "queue",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tables" | "table" => Ok(ResourceKind::Tables),
            "blobs" | "blob" | "containers" => Ok(ResourceKind::Blobs),
            "queues" | "queue" => Ok(ResourceKind::Queues),
            _ => Err(format!(
                "Invalid resource kind '{}'. Use 'tables', 'blobs' or 'queues'",
                s
            )),
        }
    }
}

/// A named storage resource: a table, a container or a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceSelector {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceSelector {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind.resource_noun(), self.name)
    }
}

/// Which way data moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Remote account to local snapshot
    Export,
    /// Local snapshot to remote account
    Import,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Export => write!(f, "export"),
            Direction::Import => write!(f, "import"),
        }
    }
}
