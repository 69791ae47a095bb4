pub mod openai;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::agent::{Conversation, RenderedInstructions};
use crate::error::ModelError;

pub use openai::OpenAiClient;

/// Response fragments in arrival order. Finite, consumed once.
pub type TextStream = BoxStream<'static, Result<String, ModelError>>;

#[async_trait]
pub trait ModelService: Send + Sync {
    async fn invoke(
        &self,
        route: &ModelRoute,
        instructions: &RenderedInstructions,
        conversation: &Conversation,
    ) -> Result<TextStream, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub id: String,
    pub deployment: String,
}

/// Route identifiers an evaluator may name, mapped to model deployments.
#[derive(Debug, Clone, Default)]
pub struct ModelRoutes {
    routes: HashMap<String, ModelRoute>,
}

impl ModelRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, id: impl Into<String>, deployment: impl Into<String>) -> Self {
        let id = id.into();
        self.routes.insert(
            id.clone(),
            ModelRoute {
                id,
                deployment: deployment.into(),
            },
        );
        self
    }

    /// Parses `route=deployment` pairs separated by commas. Entries without
    /// `=` map the route to a deployment of the same name.
    pub fn parse(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .fold(Self::new(), |routes, entry| match entry.split_once('=') {
                Some((id, deployment)) => routes.with_route(id.trim(), deployment.trim()),
                None => routes.with_route(entry, entry),
            })
    }

    pub fn get(&self, id: &str) -> Option<&ModelRoute> {
        self.routes.get(id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
