use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::error::StoreError;

/// Document store holding assembly documents keyed by their `id` field.
#[async_trait]
pub trait AssemblyStore: Send + Sync {
    async fn collection_exists(&self) -> Result<bool, StoreError>;

    /// Idempotent; provisioning an existing collection is a no-op.
    async fn ensure_collection_exists(&self) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Value>, StoreError>;

    async fn list(&self) -> Result<Vec<Value>, StoreError>;

    async fn upsert(&self, doc: Value) -> Result<Value, StoreError>;

    async fn delete(&self, id: &str) -> Result<Option<Value>, StoreError>;
}

pub struct InMemoryAssemblyStore {
    docs: DashMap<String, Value>,
    provisioned: AtomicBool,
}

impl InMemoryAssemblyStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            provisioned: AtomicBool::new(false),
        }
    }

    /// Reads a YAML (or JSON) list of assembly documents and inserts them.
    pub fn load_seed(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read assembly seed file {}", path.display()))?;
        let docs: Vec<Value> = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse assembly seed file {}", path.display()))?;

        self.provisioned.store(true, Ordering::SeqCst);
        let count = docs.len();
        for doc in docs {
            let id = document_id(&doc)
                .with_context(|| format!("Seed document without id in {}", path.display()))?;
            self.docs.insert(id, doc);
        }

        info!("Seeded {} assemblies from {}", count, path.display());
        Ok(count)
    }

    fn require_collection(&self) -> Result<(), StoreError> {
        if self.provisioned.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::CollectionMissing)
        }
    }
}

impl Default for InMemoryAssemblyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document_id(doc: &Value) -> Result<String, StoreError> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(StoreError::MissingId)
}

#[async_trait]
impl AssemblyStore for InMemoryAssemblyStore {
    async fn collection_exists(&self) -> Result<bool, StoreError> {
        Ok(self.provisioned.load(Ordering::SeqCst))
    }

    async fn ensure_collection_exists(&self) -> Result<(), StoreError> {
        if !self.provisioned.swap(true, Ordering::SeqCst) {
            info!("Provisioned assembly collection");
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.require_collection()?;
        Ok(self.docs.get(id).map(|d| d.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        self.ensure_collection_exists().await?;
        let mut docs: Vec<Value> = self.docs.iter().map(|d| d.value().clone()).collect();
        docs.sort_by(|a, b| {
            let a = a.get("id").and_then(Value::as_str).unwrap_or_default();
            let b = b.get("id").and_then(Value::as_str).unwrap_or_default();
            a.cmp(b)
        });
        Ok(docs)
    }

    async fn upsert(&self, doc: Value) -> Result<Value, StoreError> {
        self.ensure_collection_exists().await?;
        let id = document_id(&doc)?;
        self.docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn delete(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.require_collection()?;
        Ok(self.docs.remove(id).map(|(_, d)| d))
    }
}
