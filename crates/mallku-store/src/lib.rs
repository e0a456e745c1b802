//! The Secured Collection Store external interface (§6).
//!
//! The core treats persistence as a key/collection store with named
//! obfuscation policies; it never talks to a concrete database. Two
//! implementations are provided here: a pure in-memory store (used when
//! `MALLKU_SKIP_DATABASE=true` or for tests) and a file-backed JSON store
//! that persists each collection to its own file on disk, grounded on the
//! same "load on construct, save on mutate" cadence the teacher's
//! `RunManifest`/`.ctx` persistence uses.

pub mod memory;
pub mod file;
pub mod registry;

use async_trait::async_trait;
use mallku_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Policy a collection is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionPolicy {
    pub requires_security: bool,
    #[serde(default)]
    pub schema: std::collections::HashMap<String, Value>,
    #[serde(default)]
    pub allowed_model_types: Vec<String>,
}

impl CollectionPolicy {
    pub fn open() -> Self {
        Self { requires_security: false, schema: Default::default(), allowed_model_types: Vec::new() }
    }

    pub fn secured() -> Self {
        Self { requires_security: true, schema: Default::default(), allowed_model_types: Vec::new() }
    }
}

/// Document contract: every document carries its own `_key`.
pub trait Keyed {
    fn key(&self) -> String;
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn create_collection(&self, name: &str, policy: CollectionPolicy) -> Result<()>;
    async fn insert_secured(&self, collection: &str, doc: Value) -> Result<String>;
    async fn upsert(&self, collection: &str, doc: Value, key_field: &str) -> Result<String>;
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;
    /// `query` takes an AQL-like filter name plus bind parameters; the two
    /// provided implementations support only the filters the core actually
    /// needs (`by_field`, `all`) rather than a general query language.
    async fn query(&self, collection: &str, filter: &str, binds: Value) -> Result<Vec<Value>>;
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Collection names used by the core, per §6.
pub mod collections {
    pub const MEMORY_ANCHORS: &str = "memory_anchors";
    pub const RECIPROCITY_ACTIVITIES_SECURED: &str = "reciprocity_activities_secured";
    pub const RECIPROCITY_PATTERNS_SECURED: &str = "reciprocity_patterns_secured";
    pub const RECIPROCITY_ALERTS_SECURED: &str = "reciprocity_alerts_secured";
    pub const SYSTEM_HEALTH_SECURED: &str = "system_health_secured";
    pub const FIRE_CIRCLE_REPORTS_SECURED: &str = "fire_circle_reports_secured";
    pub const DIALOGUE_PATTERNS: &str = "dialogue_patterns";
    pub const WISDOM_PATTERNS: &str = "wisdom_patterns";
    pub const WISDOM_LINEAGES: &str = "wisdom_lineages";
    pub const CONSCIOUSNESS_BRIDGE_METADATA: &str = "consciousness_bridge_metadata";
}

/// Construct the appropriate store for the given config: in-memory when
/// `skip_database` is set, file-backed otherwise.
pub fn build_store(
    skip_database: bool,
    data_dir: &std::path::Path,
) -> std::sync::Arc<dyn CollectionStore> {
    if skip_database {
        std::sync::Arc::new(memory::InMemoryStore::new())
    } else {
        std::sync::Arc::new(file::FileBackedStore::new(data_dir))
    }
}
