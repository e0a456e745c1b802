//! Pure in-memory `CollectionStore`, used under `MALLKU_SKIP_DATABASE=true`
//! and for tests.

use crate::{CollectionPolicy, CollectionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use mallku_core::Result;
use serde_json::Value;

pub struct InMemoryStore {
    collections: DashMap<String, DashMap<String, Value>>,
    policies: DashMap<String, CollectionPolicy>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { collections: DashMap::new(), policies: DashMap::new() }
    }

    fn ensure(&self, name: &str) {
        self.collections.entry(name.to_string()).or_insert_with(DashMap::new);
    }

    fn key_of(doc: &Value, key_field: &str) -> String {
        doc.get(key_field)
            .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| Some(v.to_string())))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn create_collection(&self, name: &str, policy: CollectionPolicy) -> Result<()> {
        self.ensure(name);
        self.policies.insert(name.to_string(), policy);
        Ok(())
    }

    async fn insert_secured(&self, collection: &str, doc: Value) -> Result<String> {
        self.ensure(collection);
        let key = Self::key_of(&doc, "_key");
        self.collections.get(collection).unwrap().insert(key.clone(), doc);
        Ok(key)
    }

    async fn upsert(&self, collection: &str, doc: Value, key_field: &str) -> Result<String> {
        self.ensure(collection);
        let key = Self::key_of(&doc, key_field);
        self.collections.get(collection).unwrap().insert(key.clone(), doc);
        Ok(key)
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure(collection);
        Ok(self.collections.get(collection).unwrap().get(key).map(|v| v.clone()))
    }

    async fn query(&self, collection: &str, filter: &str, binds: Value) -> Result<Vec<Value>> {
        self.ensure(collection);
        let coll = self.collections.get(collection).unwrap();
        match filter {
            "all" => Ok(coll.iter().map(|e| e.value().clone()).collect()),
            "by_field" => {
                let field = binds.get("field").and_then(|v| v.as_str()).unwrap_or_default();
                let value = binds.get("value").cloned().unwrap_or(Value::Null);
                Ok(coll
                    .iter()
                    .filter(|e| e.value().get(field) == Some(&value))
                    .map(|e| e.value().clone())
                    .collect())
            }
            other => Err(mallku_core::Error::Validation(format!("unsupported filter: {other}"))),
        }
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.ensure(collection);
        Ok(self.collections.get(collection).unwrap().len())
    }
}
