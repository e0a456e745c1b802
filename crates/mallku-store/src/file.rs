//! File-backed `CollectionStore`: one JSON file per collection under a data
//! directory, loaded lazily on first access and rewritten wholesale on
//! every mutation — the same "load on construct, save on every update"
//! cadence the Adaptive Thresholds persistence file uses (§4.D, §6).
//!
//! If the backing directory becomes unwritable mid-run, operations surface
//! `Error::PersistenceUnavailable` rather than panicking; callers (the
//! Correlation Engine) are responsible for degrading to in-memory mode per
//! §7 item 6. This implementation does not attempt that degradation itself
//! — it is a thin, honest collaborator, same as §1 scopes it.

use crate::{CollectionPolicy, CollectionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use mallku_core::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

struct Collection {
    path: PathBuf,
    docs: std::collections::HashMap<String, Value>,
}

impl Collection {
    fn load(path: PathBuf) -> Self {
        let docs = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, docs }
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::PersistenceUnavailable { detail: e.to_string() })?;
        }
        let text = serde_json::to_string_pretty(&self.docs)?;
        std::fs::write(&self.path, text)
            .map_err(|e| Error::PersistenceUnavailable { detail: e.to_string() })
    }
}

pub struct FileBackedStore {
    data_dir: PathBuf,
    policies: DashMap<String, CollectionPolicy>,
    collections: DashMap<String, Mutex<Collection>>,
}

impl FileBackedStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            policies: DashMap::new(),
            collections: DashMap::new(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    fn ensure(&self, name: &str) {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Mutex::new(Collection::load(self.path_for(name))));
    }

    fn key_of(doc: &Value, key_field: &str) -> String {
        doc.get(key_field)
            .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| Some(v.to_string())))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl CollectionStore for FileBackedStore {
    async fn create_collection(&self, name: &str, policy: CollectionPolicy) -> Result<()> {
        self.ensure(name);
        self.policies.insert(name.to_string(), policy);
        Ok(())
    }

    async fn insert_secured(&self, collection: &str, doc: Value) -> Result<String> {
        self.ensure(collection);
        let guard = self.collections.get(collection).unwrap();
        let mut coll = guard.lock().await;
        let key = Self::key_of(&doc, "_key");
        coll.docs.insert(key.clone(), doc);
        coll.persist()?;
        Ok(key)
    }

    async fn upsert(&self, collection: &str, doc: Value, key_field: &str) -> Result<String> {
        self.ensure(collection);
        let guard = self.collections.get(collection).unwrap();
        let mut coll = guard.lock().await;
        let key = Self::key_of(&doc, key_field);
        coll.docs.insert(key.clone(), doc);
        coll.persist()?;
        Ok(key)
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure(collection);
        let guard = self.collections.get(collection).unwrap();
        let coll = guard.lock().await;
        Ok(coll.docs.get(key).cloned())
    }

    async fn query(&self, collection: &str, filter: &str, binds: Value) -> Result<Vec<Value>> {
        self.ensure(collection);
        let guard = self.collections.get(collection).unwrap();
        let coll = guard.lock().await;
        match filter {
            "all" => Ok(coll.docs.values().cloned().collect()),
            "by_field" => {
                let field = binds.get("field").and_then(|v| v.as_str()).unwrap_or_default();
                let value = binds.get("value").cloned().unwrap_or(Value::Null);
                Ok(coll.docs.values().filter(|d| d.get(field) == Some(&value)).cloned().collect())
            }
            other => Err(Error::Validation(format!("unsupported filter: {other}"))),
        }
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.ensure(collection);
        let guard = self.collections.get(collection).unwrap();
        Ok(guard.lock().await.docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileBackedStore::new(dir.path());
            store.upsert("wisdom_patterns", json!({"_key": "p1", "score": 0.8}), "_key").await.unwrap();
        }
        let store2 = FileBackedStore::new(dir.path());
        let got = store2.get("wisdom_patterns", "p1").await.unwrap().unwrap();
        assert_eq!(got["score"], 0.8);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedStore::new(dir.path());
        assert_eq!(store.count("anything").await.unwrap(), 0);
    }
}
