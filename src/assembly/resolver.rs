use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::store::AssemblyStore;
use super::types::Assembly;
use crate::error::StoreError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("assembly {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AssemblyResolver {
    store: Arc<dyn AssemblyStore>,
}

impl AssemblyResolver {
    pub fn new(store: Arc<dyn AssemblyStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, assembly_id: &str) -> Result<Assembly, ResolveError> {
        if !self.store.collection_exists().await? {
            // Nothing can match yet, but provision so later lookups see a collection.
            if let Err(e) = self.store.ensure_collection_exists().await {
                warn!(assembly_id = %assembly_id, error = %e, "Failed to provision assembly collection");
            }
            return Err(ResolveError::NotFound(assembly_id.to_string()));
        }

        let doc = match self.store.get_by_id(assembly_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) | Err(StoreError::CollectionMissing) => {
                return Err(ResolveError::NotFound(assembly_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let assembly = Assembly::from_document(doc).map_err(|e| StoreError::Malformed {
            id: assembly_id.to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            assembly_id = %assembly.id,
            agents = assembly.agents.len(),
            topic = %assembly.topic_name,
            "Resolved assembly"
        );
        Ok(assembly)
    }
}
